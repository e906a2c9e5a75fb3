use std::collections::BTreeSet;
use std::sync::Arc;

use crate::checks::{coverage, Finding, Invocation, RunContext, Tester};
use crate::collector::{self, Collector, Fetched};
use crate::error::CheckError;
use crate::model::{Direction, ResourceKind};
use crate::normalize::normalize_rules;

pub const TEST_NAME: &str = "vpc_default_security_group_restrict_all_traffic";
pub const ITEM_TYPE: &str = "aws_vpc";

/// Flags every VPC whose `default` security group allows any traffic at
/// all, inbound or outbound. A `default` group that names no VPC flags
/// every VPC whose own default group was not seen.
pub struct DefaultSecurityGroupTester {
    collector: Arc<dyn Collector>,
}

impl DefaultSecurityGroupTester {
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        Self { collector }
    }

    /// Whether a default group carries rules, or cannot be shown not to.
    fn permits_traffic(&self, group: &str, ctx: &RunContext) -> Result<bool, CheckError> {
        for direction in [Direction::Inbound, Direction::Outbound] {
            ctx.checkpoint()?;
            let fetched = collector::rules_of(
                self.collector.as_ref(),
                group,
                direction,
                &ctx.retry,
                &ctx.deadline,
            )?;
            let raw = match fetched {
                Fetched::Found(raw) => raw,
                Fetched::NotConfigured(_) => return Ok(true),
            };
            let normalized = normalize_rules(group, direction, &raw);
            if !normalized.rules.is_empty() || !normalized.malformed.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Tester for DefaultSecurityGroupTester {
    fn service_name(&self) -> &str {
        "vpc"
    }

    fn provider_name(&self) -> &str {
        self.collector.provider()
    }

    fn check_names(&self) -> Vec<String> {
        vec![TEST_NAME.to_string()]
    }

    fn run(&self, ctx: &RunContext) -> Result<Vec<Finding>, CheckError> {
        let collector = self.collector.as_ref();
        let actor = collector::caller_identity(collector, &ctx.retry, &ctx.deadline)?;
        let invocation = Invocation::new(actor, ctx.started_at);

        let vpcs = collector::list_all(collector, ResourceKind::Vpc, &ctx.retry, &ctx.deadline)?;
        let groups = collector::list_all(
            collector,
            ResourceKind::SecurityGroup,
            &ctx.retry,
            &ctx.deadline,
        )?;

        let mut flagged = BTreeSet::new();
        let mut attributed = BTreeSet::new();
        let mut orphans = 0usize;
        for group in groups.iter().filter(|g| g.is_default_group()) {
            let Some(vpc_id) = &group.vpc_id else {
                tracing::warn!(
                    group = %group.id,
                    "default security group without a VPC, failing closed"
                );
                orphans += 1;
                continue;
            };
            attributed.insert(vpc_id.as_str());
            if self.permits_traffic(&group.id, ctx)? {
                flagged.insert(vpc_id.clone());
            }
        }
        // An orphan could belong to any VPC whose default group is unaccounted for.
        if orphans > 0 {
            flagged.extend(
                vpcs.iter()
                    .filter(|v| !attributed.contains(v.id.as_str()))
                    .map(|v| v.id.clone()),
            );
        }

        let verdicts = coverage::complete(vpcs.into_iter().map(|v| v.id), &flagged);
        Ok(verdicts.into_findings(&invocation, TEST_NAME, ITEM_TYPE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::TestResult;
    use crate::collector::{Deadline, InMemoryCollector, Inventory, RetryPolicy};
    use crate::model::Resource;
    use chrono::Utc;
    use serde_json::json;

    fn default_group(id: &str, vpc: &str) -> Resource {
        let mut r = Resource::new(id, ResourceKind::SecurityGroup);
        r.name = Some("default".into());
        r.vpc_id = Some(vpc.into());
        r
    }

    fn run(inv: Inventory) -> Vec<(Option<String>, TestResult)> {
        let tester = DefaultSecurityGroupTester::new(Arc::new(InMemoryCollector::new(inv)));
        let ctx = RunContext::new(Deadline::none(), RetryPolicy::no_retry(), Utc::now());
        tester
            .run(&ctx)
            .unwrap()
            .into_iter()
            .map(|f| (f.item, f.test_result))
            .collect()
    }

    #[test]
    fn flags_vpcs_whose_default_group_allows_traffic() {
        let mut web = Resource::new("sg-web", ResourceKind::SecurityGroup);
        web.vpc_id = Some("vpc-b".into());
        let inv = Inventory {
            resources: vec![
                Resource::new("vpc-a", ResourceKind::Vpc),
                Resource::new("vpc-b", ResourceKind::Vpc),
                default_group("sg-da", "vpc-a"),
                default_group("sg-db", "vpc-b"),
                web,
            ],
            rules: serde_json::from_value(json!({
                "sg-da": {
                    "inbound": [{"IpProtocol": "-1", "UserIdGroupPairs": [{"GroupId": "sg-da"}]}],
                    "outbound": [{"IpProtocol": "-1", "IpRanges": [{"CidrIp": "0.0.0.0/0"}]}]
                },
                "sg-web": {"inbound": [{"IpProtocol": "tcp", "FromPort": 443, "ToPort": 443}]}
            }))
            .unwrap(),
            ..Default::default()
        };

        assert_eq!(
            run(inv),
            vec![
                (Some("vpc-a".to_string()), TestResult::IssueFound),
                (Some("vpc-b".to_string()), TestResult::NoIssueFound),
            ]
        );
    }

    #[test]
    fn default_group_without_vpc_fails_closed() {
        let mut orphan = Resource::new("sg-d", ResourceKind::SecurityGroup);
        orphan.name = Some("default".into());
        let inv = Inventory {
            resources: vec![
                Resource::new("vpc-1", ResourceKind::Vpc),
                Resource::new("vpc-2", ResourceKind::Vpc),
                orphan,
                default_group("sg-d2", "vpc-2"),
            ],
            rules: serde_json::from_value(json!({
                "sg-d": {"inbound": [{"IpProtocol": "-1", "IpRanges": [{"CidrIp": "0.0.0.0/0"}]}]}
            }))
            .unwrap(),
            ..Default::default()
        };

        assert_eq!(
            run(inv),
            vec![
                (Some("vpc-1".to_string()), TestResult::IssueFound),
                (Some("vpc-2".to_string()), TestResult::NoIssueFound),
            ]
        );
    }

    #[test]
    fn no_vpcs_yields_sentinel() {
        assert_eq!(run(Inventory::default()), vec![(None, TestResult::NoIssueFound)]);
    }
}
