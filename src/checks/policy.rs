use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{Finding, TesterFailure};

/// Policy verdict: the final pass/fail decision after applying the ignore
/// list to raw findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub pass: bool,
    pub total_findings: usize,
    pub effective_findings: usize,
    pub issues: usize,
    pub failed_testers: usize,
}

/// Policy configuration loaded from `.posture.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Check names to ignore entirely.
    #[serde(default)]
    pub ignore_checks: HashSet<String>,
    /// Fail the run when any effective finding is an issue.
    #[serde(default = "default_fail_on_issue")]
    pub fail_on_issue: bool,
}

fn default_fail_on_issue() -> bool {
    true
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            ignore_checks: HashSet::new(),
            fail_on_issue: true,
        }
    }
}

impl Policy {
    /// Evaluate findings and tester failures against this policy.
    ///
    /// A failed tester always fails the run: its resources have no verdict.
    pub fn evaluate(&self, findings: &[Finding], failures: &[TesterFailure]) -> PolicyVerdict {
        let effective: Vec<&Finding> = findings
            .iter()
            .filter(|f| !self.ignore_checks.contains(&f.test_name))
            .collect();
        let issues = effective.iter().filter(|f| f.test_result.is_issue()).count();
        let failed = (self.fail_on_issue && issues > 0) || !failures.is_empty();

        PolicyVerdict {
            pass: !failed,
            total_findings: findings.len(),
            effective_findings: effective.len(),
            issues,
            failed_testers: failures.len(),
        }
    }

    /// Filter findings: remove ignored checks.
    pub fn apply(&self, findings: &[Finding]) -> Vec<Finding> {
        findings
            .iter()
            .filter(|f| !self.ignore_checks.contains(&f.test_name))
            .cloned()
            .collect()
    }
}
