use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::checks::catalog::{self, CheckSpec, Scope};
use crate::checks::{coverage, matcher, Finding, Invocation, RunContext, Tester};
use crate::collector::{self, Collector, Fetched};
use crate::error::CheckError;
use crate::model::{Direction, Resource, Rule};
use crate::normalize::{normalize_rules, validate_resource};

/// Evaluates the catalog's port exposure checks for one scope.
///
/// Security group rules are fetched once per group. For instance scope they
/// are attributed to every instance the group is attached to. A group with
/// malformed rules, or one the provider reports as not configured, flags
/// every resource it is attributed to. So does a resource record missing
/// the fields its kind depends on.
pub struct PortExposureTester {
    collector: Arc<dyn Collector>,
    scope: Scope,
    checks: Vec<&'static CheckSpec>,
}

/// Rules of one run, already attributed to resources of the scope.
#[derive(Debug, Default)]
struct RuleIndex {
    rules: Vec<Rule>,
    forced: HashMap<Direction, BTreeSet<String>>,
}

impl RuleIndex {
    fn forced(&self, direction: Direction) -> impl Iterator<Item = &String> {
        self.forced.get(&direction).into_iter().flatten()
    }

    fn force(&mut self, direction: Direction, id: &str) {
        self.forced
            .entry(direction)
            .or_default()
            .insert(id.to_string());
    }
}

#[derive(Debug, Default)]
struct GroupRules {
    rules: Vec<Rule>,
    tainted: bool,
}

impl PortExposureTester {
    pub fn new(collector: Arc<dyn Collector>, scope: Scope) -> Self {
        Self {
            collector,
            scope,
            checks: catalog::for_scope(scope),
        }
    }

    /// Restrict the tester to `checks`; entries of another scope are dropped.
    pub fn with_checks(
        collector: Arc<dyn Collector>,
        scope: Scope,
        checks: Vec<&'static CheckSpec>,
    ) -> Self {
        Self {
            collector,
            scope,
            checks: checks.into_iter().filter(|c| c.scope == scope).collect(),
        }
    }

    fn directions(&self) -> Vec<Direction> {
        let mut directions = Vec::new();
        for check in &self.checks {
            if !directions.contains(&check.predicate.direction) {
                directions.push(check.predicate.direction);
            }
        }
        directions
    }

    fn fetch_group(
        &self,
        group: &str,
        direction: Direction,
        ctx: &RunContext,
    ) -> Result<GroupRules, CheckError> {
        let fetched = collector::rules_of(
            self.collector.as_ref(),
            group,
            direction,
            &ctx.retry,
            &ctx.deadline,
        )?;
        Ok(match fetched {
            Fetched::Found(raw) => {
                let normalized = normalize_rules(group, direction, &raw);
                GroupRules {
                    tainted: !normalized.malformed.is_empty(),
                    rules: normalized.rules,
                }
            }
            Fetched::NotConfigured(detail) => {
                tracing::info!(group, %direction, %detail, "rules not configured, failing closed");
                GroupRules {
                    rules: Vec::new(),
                    tainted: true,
                }
            }
        })
    }

    fn gather(&self, resources: &[Resource], ctx: &RunContext) -> Result<RuleIndex, CheckError> {
        let groups: BTreeSet<&str> = match self.scope {
            Scope::SecurityGroup => resources.iter().map(|r| r.id.as_str()).collect(),
            Scope::Instance => resources
                .iter()
                .flat_map(|r| r.attached_groups().iter().map(String::as_str))
                .collect(),
        };

        let mut fetched: HashMap<(&str, Direction), GroupRules> = HashMap::new();
        for &group in &groups {
            for direction in self.directions() {
                ctx.checkpoint()?;
                fetched.insert((group, direction), self.fetch_group(group, direction, ctx)?);
            }
        }

        let mut index = RuleIndex::default();
        match self.scope {
            Scope::SecurityGroup => {
                for ((group, direction), rules) in fetched {
                    if rules.tainted {
                        index.force(direction, group);
                    }
                    index.rules.extend(rules.rules);
                }
            }
            Scope::Instance => {
                for resource in resources {
                    for group in resource.attached_groups() {
                        for direction in self.directions() {
                            let Some(rules) = fetched.get(&(group.as_str(), direction)) else {
                                continue;
                            };
                            if rules.tainted {
                                index.force(direction, &resource.id);
                            }
                            index.rules.extend(rules.rules.iter().map(|rule| Rule {
                                owner_id: resource.id.clone(),
                                ..rule.clone()
                            }));
                        }
                    }
                }
            }
        }

        for resource in resources {
            if let Err(err) = validate_resource(resource) {
                tracing::warn!(error = %err, "malformed resource, failing closed");
                for direction in self.directions() {
                    index.force(direction, &resource.id);
                }
            }
        }
        Ok(index)
    }
}

impl Tester for PortExposureTester {
    fn name(&self) -> String {
        format!("{}/{}", self.provider_name(), self.scope.item_type())
    }

    fn service_name(&self) -> &str {
        "ec2"
    }

    fn provider_name(&self) -> &str {
        self.collector.provider()
    }

    fn check_names(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.name.clone()).collect()
    }

    fn run(&self, ctx: &RunContext) -> Result<Vec<Finding>, CheckError> {
        let collector = self.collector.as_ref();
        let actor = collector::caller_identity(collector, &ctx.retry, &ctx.deadline)?;
        let invocation = Invocation::new(actor, ctx.started_at);

        let resources =
            collector::list_all(collector, self.scope.kind(), &ctx.retry, &ctx.deadline)?;
        let index = self.gather(&resources, ctx)?;

        let mut findings = Vec::with_capacity(self.checks.len() * resources.len().max(1));
        for check in &self.checks {
            ctx.checkpoint()?;
            let mut matched = matcher::matching_owners(&check.predicate, &index.rules);
            matched.extend(index.forced(check.predicate.direction).cloned());

            tracing::debug!(
                check = %check.name,
                universe = resources.len(),
                flagged = matched.len(),
                "check evaluated"
            );
            let verdicts = coverage::complete(resources.iter().map(|r| r.id.clone()), &matched);
            findings.extend(verdicts.into_findings(&invocation, &check.name, check.item_type()));
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::TestResult;
    use crate::collector::{Deadline, InMemoryCollector, Inventory, RetryPolicy};
    use crate::model::ResourceKind;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn group(id: &str) -> Resource {
        let mut r = Resource::new(id, ResourceKind::SecurityGroup);
        r.vpc_id = Some("vpc-1".into());
        r
    }

    fn instance(id: &str, groups: &[&str]) -> Resource {
        let mut r = Resource::new(id, ResourceKind::Instance);
        r.security_groups = Some(groups.iter().map(|g| g.to_string()).collect());
        r
    }

    fn inventory(resources: Vec<Resource>, rules: serde_json::Value) -> Inventory {
        Inventory {
            resources,
            rules: serde_json::from_value(rules).unwrap(),
            ..Default::default()
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(Deadline::none(), RetryPolicy::no_retry(), Utc::now())
    }

    fn verdicts(findings: &[Finding], check: &str) -> Vec<(Option<String>, TestResult)> {
        findings
            .iter()
            .filter(|f| f.test_name == check)
            .map(|f| (f.item.clone(), f.test_result))
            .collect()
    }

    fn only(check: &str) -> Vec<&'static CheckSpec> {
        vec![catalog::find(check).unwrap()]
    }

    #[test]
    fn flags_matching_group_and_clears_the_rest() {
        let inv = inventory(
            vec![group("sg-1"), group("sg-2"), group("sg-3")],
            json!({"sg-1": {"inbound": [
                {"IpProtocol": "tcp", "FromPort": 22, "ToPort": 22, "IpRanges": [{"CidrIp": "0.0.0.0/0"}]}
            ]}}),
        );
        let check = "ec2_security_group_ssh_ingress_from_anywhere";
        let tester = PortExposureTester::with_checks(
            Arc::new(InMemoryCollector::new(inv)),
            Scope::SecurityGroup,
            only(check),
        );

        let findings = tester.run(&ctx()).unwrap();
        assert_eq!(
            verdicts(&findings, check),
            vec![
                (Some("sg-1".to_string()), TestResult::IssueFound),
                (Some("sg-2".to_string()), TestResult::NoIssueFound),
                (Some("sg-3".to_string()), TestResult::NoIssueFound),
            ]
        );
    }

    #[test]
    fn private_cidr_is_not_open_to_anywhere() {
        let inv = inventory(
            vec![group("sg-1")],
            json!({"sg-1": {"inbound": [
                {"IpProtocol": "tcp", "FromPort": 22, "ToPort": 22, "IpRanges": [{"CidrIp": "10.0.0.0/8"}]}
            ]}}),
        );
        let check = "ec2_security_group_ssh_ingress_from_anywhere";
        let tester = PortExposureTester::with_checks(
            Arc::new(InMemoryCollector::new(inv)),
            Scope::SecurityGroup,
            only(check),
        );
        let findings = tester.run(&ctx()).unwrap();
        assert_eq!(
            verdicts(&findings, check),
            vec![(Some("sg-1".to_string()), TestResult::NoIssueFound)]
        );
    }

    #[test]
    fn group_rules_are_attributed_to_instances() {
        let inv = inventory(
            vec![
                group("sg-web"),
                group("sg-db"),
                instance("i-1", &["sg-web"]),
                instance("i-2", &["sg-db", "sg-web"]),
                instance("i-3", &["sg-db"]),
                instance("i-4", &[]),
            ],
            json!({
                "sg-web": {"inbound": [{"IpProtocol": "tcp", "FromPort": 80, "ToPort": 443}]},
                "sg-db": {"inbound": [{"IpProtocol": "tcp", "FromPort": 5432, "ToPort": 5432}]}
            }),
        );
        let tester = PortExposureTester::new(Arc::new(InMemoryCollector::new(inv)), Scope::Instance);
        let findings = tester.run(&ctx()).unwrap();

        let https = verdicts(&findings, "ec2_inbound_https_access_restricted");
        assert_eq!(
            https,
            vec![
                (Some("i-1".to_string()), TestResult::IssueFound),
                (Some("i-2".to_string()), TestResult::IssueFound),
                (Some("i-3".to_string()), TestResult::NoIssueFound),
                (Some("i-4".to_string()), TestResult::NoIssueFound),
            ]
        );
        let postgres = verdicts(&findings, "ec2_inbound_postgresql_access_restricted");
        assert_eq!(
            postgres,
            vec![
                (Some("i-2".to_string()), TestResult::IssueFound),
                (Some("i-3".to_string()), TestResult::IssueFound),
                (Some("i-1".to_string()), TestResult::NoIssueFound),
                (Some("i-4".to_string()), TestResult::NoIssueFound),
            ]
        );

        // every check covers all four instances
        assert_eq!(findings.len(), tester.check_names().len() * 4);
    }

    #[test]
    fn empty_universe_yields_one_sentinel_per_check() {
        let tester = PortExposureTester::new(
            Arc::new(InMemoryCollector::new(Inventory::default())),
            Scope::Instance,
        );
        let findings = tester.run(&ctx()).unwrap();
        assert_eq!(findings.len(), tester.check_names().len());
        assert!(findings
            .iter()
            .all(|f| f.item.is_none() && f.test_result == TestResult::NoIssueFound));
    }

    #[test]
    fn malformed_rule_fails_the_group_closed() {
        let inv = inventory(
            vec![group("sg-1"), group("sg-2")],
            json!({"sg-1": {"outbound": [{"IpRanges": [{"CidrIp": "0.0.0.0/0"}]}]}}),
        );
        let check = "ec2_outbound_access_to_all_ports_restricted";
        let tester = PortExposureTester::with_checks(
            Arc::new(InMemoryCollector::new(inv)),
            Scope::SecurityGroup,
            only(check),
        );
        let findings = tester.run(&ctx()).unwrap();
        assert_eq!(
            verdicts(&findings, check),
            vec![
                (Some("sg-1".to_string()), TestResult::IssueFound),
                (Some("sg-2".to_string()), TestResult::NoIssueFound),
            ]
        );
    }

    #[test]
    fn not_configured_flags_the_resource() {
        let mut inv = inventory(vec![group("sg-1"), instance("i-1", &["sg-1"])], json!({}));
        inv.not_configured.insert("sg-1".into());
        let check = "ec2_inbound_ssh_access_restricted";
        let tester = PortExposureTester::with_checks(
            Arc::new(InMemoryCollector::new(inv)),
            Scope::Instance,
            only(check),
        );
        let findings = tester.run(&ctx()).unwrap();
        assert_eq!(
            verdicts(&findings, check),
            vec![(Some("i-1".to_string()), TestResult::IssueFound)]
        );
    }

    #[test]
    fn instance_without_group_field_is_flagged_everywhere() {
        let inv = inventory(
            vec![
                group("sg-1"),
                Resource::new("i-bare", ResourceKind::Instance),
                instance("i-ok", &["sg-1"]),
            ],
            json!({}),
        );
        let tester = PortExposureTester::new(Arc::new(InMemoryCollector::new(inv)), Scope::Instance);
        let findings = tester.run(&ctx()).unwrap();

        for check in tester.check_names() {
            assert_eq!(
                verdicts(&findings, &check),
                vec![
                    (Some("i-bare".to_string()), TestResult::IssueFound),
                    (Some("i-ok".to_string()), TestResult::NoIssueFound),
                ],
                "{check}"
            );
        }
    }

    #[test]
    fn group_without_vpc_is_flagged() {
        let inv = inventory(
            vec![group("sg-1"), Resource::new("sg-orphan", ResourceKind::SecurityGroup)],
            json!({}),
        );
        let check = "ec2_security_group_rdp_ingress_from_anywhere";
        let tester = PortExposureTester::with_checks(
            Arc::new(InMemoryCollector::new(inv)),
            Scope::SecurityGroup,
            only(check),
        );
        let findings = tester.run(&ctx()).unwrap();
        assert_eq!(
            verdicts(&findings, check),
            vec![
                (Some("sg-orphan".to_string()), TestResult::IssueFound),
                (Some("sg-1".to_string()), TestResult::NoIssueFound),
            ]
        );
    }

    #[test]
    fn exhausted_retries_fail_the_run() {
        let inv = inventory(vec![group("sg-1")], json!({}));
        let collector = InMemoryCollector::new(inv).with_transient_faults("sg-1", u32::MAX);
        let tester = PortExposureTester::new(Arc::new(collector), Scope::SecurityGroup);
        let err = tester.run(&ctx()).unwrap_err();
        assert!(matches!(err, CheckError::RetriesExhausted { .. }));
    }

    #[test]
    fn names_include_scope() {
        let collector: Arc<dyn Collector> = Arc::new(InMemoryCollector::new(Inventory::default()));
        let tester = PortExposureTester::new(collector, Scope::SecurityGroup);
        assert_eq!(tester.name(), "aws/ec2_security_group");
        assert_eq!(tester.service_name(), "ec2");
    }
}
