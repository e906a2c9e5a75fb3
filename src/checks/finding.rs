use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One verdict for one resource under one check.
///
/// Serialized flat: `timestamp` in unix seconds, actor fields omitted when
/// the provider has no notion of them, `item` null for the sentinel emitted
/// when a check had nothing in scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub actor: Actor,
    pub item: Option<String>,
    pub item_type: String,
    pub test_name: String,
    pub test_result: TestResult,
}

/// Principal the checks ran as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_arn: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    IssueFound,
    NoIssueFound,
}

impl TestResult {
    pub fn is_issue(self) -> bool {
        self == Self::IssueFound
    }
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IssueFound => write!(f, "issue_found"),
            Self::NoIssueFound => write!(f, "no_issue_found"),
        }
    }
}

/// Who ran the checks, and when. Shared by every finding of a tester run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
}

impl Invocation {
    pub fn new(actor: Actor, timestamp: DateTime<Utc>) -> Self {
        Self { actor, timestamp }
    }

    /// Build the finding for `item` under the check `test_name`.
    pub fn finding(
        &self,
        test_name: &str,
        item_type: &str,
        item: Option<&str>,
        test_result: TestResult,
    ) -> Finding {
        Finding {
            timestamp: self.timestamp,
            actor: self.actor.clone(),
            item: item.map(str::to_string),
            item_type: item_type.to_string(),
            test_name: test_name.to_string(),
            test_result,
        }
    }

    /// The single finding emitted for a check with an empty universe.
    pub fn sentinel(&self, test_name: &str, item_type: &str) -> Finding {
        self.finding(test_name, item_type, None, TestResult::NoIssueFound)
    }
}
