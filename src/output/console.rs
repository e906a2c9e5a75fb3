use std::collections::BTreeMap;

use crate::checks::policy::PolicyVerdict;
use crate::checks::{Finding, RunReport, TesterStatus};

/// Render a run report as plain console output, issues grouped by check.
pub fn render(report: &RunReport, verdict: &PolicyVerdict) -> String {
    let mut output = String::new();

    let mut by_check: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
    for finding in report.issues() {
        by_check.entry(&finding.test_name).or_default().push(finding);
    }

    if by_check.is_empty() {
        output.push_str("\n  No exposed resources detected.\n\n");
    } else {
        output.push_str(&format!("\n  {} issue(s) detected:\n\n", verdict.issues));
        for (check, findings) in &by_check {
            output.push_str(&format!("  [ISSUE] {} ({})\n", check, findings[0].item_type));
            for finding in findings {
                let item = finding.item.as_deref().unwrap_or("-");
                output.push_str(&format!("           {}\n", item));
            }
            output.push('\n');
        }
    }

    if !report.failures.is_empty() {
        output.push_str(&format!("  {} tester(s) failed:\n\n", report.failures.len()));
        for failure in &report.failures {
            output.push_str(&format!(
                "  [FAILED] {} [{}]\n           {}\n\n",
                failure.tester, failure.kind, failure.error
            ));
        }
    }

    let completed = report
        .outcomes
        .iter()
        .filter(|o| o.status == TesterStatus::Completed)
        .count();
    let status = if verdict.pass { "PASS" } else { "FAIL" };
    output.push_str(&format!(
        "  Result: {} ({} finding(s), {} issue(s), {}/{} tester(s) completed)\n\n",
        status,
        verdict.effective_findings,
        verdict.issues,
        completed,
        report.outcomes.len(),
    ));

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::policy::Policy;
    use crate::checks::{Actor, Invocation, TestResult, TesterFailure, TesterSummary};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn lists_issues_and_failures() {
        let inv = Invocation::new(Actor::default(), Utc::now());
        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            findings: vec![
                inv.finding("ec2_inbound_rdp_access_restricted", "ec2_instance", Some("i-9"), TestResult::IssueFound),
                inv.finding("ec2_inbound_rdp_access_restricted", "ec2_instance", Some("i-1"), TestResult::NoIssueFound),
            ],
            failures: vec![TesterFailure {
                tester: "aws/vpc".into(),
                provider: "aws".into(),
                service: "vpc".into(),
                kind: "contract_violation".into(),
                error: "contract violation: unexpected page".into(),
            }],
            outcomes: vec![
                TesterSummary {
                    tester: "aws/ec2_instance".into(),
                    status: TesterStatus::Completed,
                    findings: 2,
                    elapsed_ms: 3,
                },
                TesterSummary {
                    tester: "aws/vpc".into(),
                    status: TesterStatus::Failed,
                    findings: 0,
                    elapsed_ms: 1,
                },
            ],
        };
        let verdict = Policy::default().evaluate(&report.findings, &report.failures);
        let text = render(&report, &verdict);

        assert!(text.contains("[ISSUE] ec2_inbound_rdp_access_restricted"));
        assert!(text.contains("i-9"));
        assert!(!text.contains("i-1\n"));
        assert!(text.contains("[FAILED] aws/vpc [contract_violation]"));
        assert!(text.contains("Result: FAIL"));
        assert!(text.contains("1/2 tester(s) completed"));
    }

    #[test]
    fn clean_run_passes() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            findings: vec![],
            failures: vec![],
            outcomes: vec![],
        };
        let verdict = Policy::default().evaluate(&[], &[]);
        let text = render(&report, &verdict);
        assert!(text.contains("No exposed resources detected."));
        assert!(text.contains("Result: PASS"));
    }
}
