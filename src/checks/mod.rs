pub mod builtin;
pub mod catalog;
pub mod coverage;
pub mod finding;
pub mod matcher;
pub mod orchestrator;
pub mod policy;

use chrono::{DateTime, Utc};

use crate::collector::{Deadline, RetryPolicy};
use crate::error::CheckError;

pub use catalog::{CheckSpec, Scope};
pub use finding::{Actor, Finding, Invocation, TestResult};
pub use orchestrator::{
    Orchestrator, OrchestratorSettings, RunReport, TesterFailure, TesterState, TesterStatus,
    TesterSummary,
};

/// Per-run inputs handed to a tester by the orchestrator.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub deadline: Deadline,
    pub retry: RetryPolicy,
    /// Timestamp stamped on every finding of the run.
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(deadline: Deadline, retry: RetryPolicy, started_at: DateTime<Utc>) -> Self {
        Self {
            deadline,
            retry,
            started_at,
        }
    }

    /// Cancellation point between units of work.
    pub fn checkpoint(&self) -> Result<(), CheckError> {
        self.deadline.check()
    }
}

/// A tester fetches one service's resources and produces a verdict for
/// every resource of every check it owns.
///
/// `run` either returns the complete finding set or fails; it never returns
/// a partial set.
pub trait Tester: Send + Sync {
    /// Unique name used in reports and logs.
    fn name(&self) -> String {
        format!("{}/{}", self.provider_name(), self.service_name())
    }

    fn service_name(&self) -> &str;

    fn provider_name(&self) -> &str;

    /// Names of the checks this tester evaluates.
    fn check_names(&self) -> Vec<String>;

    fn run(&self, ctx: &RunContext) -> Result<Vec<Finding>, CheckError>;
}
