//! Runs every registered tester and aggregates their findings.
//!
//! Failure isolation lives here and only here: a tester that fails is
//! recorded with its error and the remaining testers still run and report.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Finding, RunContext, Tester};
use crate::collector::{Deadline, RetryPolicy};
use crate::error::CheckError;

/// `[orchestrator]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Run testers concurrently.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Per-tester time budget; `0` disables it.
    #[serde(default = "default_tester_timeout_secs")]
    pub tester_timeout_secs: u64,
}

fn default_parallel() -> bool {
    true
}

fn default_tester_timeout_secs() -> u64 {
    300
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            tester_timeout_secs: default_tester_timeout_secs(),
        }
    }
}

impl OrchestratorSettings {
    pub fn tester_timeout(&self) -> Option<Duration> {
        (self.tester_timeout_secs > 0).then(|| Duration::from_secs(self.tester_timeout_secs))
    }
}

/// Lifecycle of one tester invocation. Both outcomes are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TesterState {
    Pending,
    Completed(Vec<Finding>),
    Failed(CheckError),
}

impl TesterState {
    /// Move out of `Pending`. A terminal state ignores further results.
    pub fn settle(self, result: Result<Vec<Finding>, CheckError>) -> Self {
        match self {
            Self::Pending => match result {
                Ok(findings) => Self::Completed(findings),
                Err(err) => Self::Failed(err),
            },
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Outcome of one tester in a run.
#[derive(Debug, Clone)]
pub struct TesterOutcome {
    pub tester: String,
    pub provider: String,
    pub service: String,
    pub elapsed: Duration,
    pub state: TesterState,
}

/// A tester that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesterFailure {
    pub tester: String,
    pub provider: String,
    pub service: String,
    pub kind: String,
    pub error: String,
}

/// Per-tester line of a run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesterSummary {
    pub tester: String,
    pub status: TesterStatus,
    pub findings: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TesterStatus {
    Completed,
    Failed,
}

/// Aggregated result of one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub findings: Vec<Finding>,
    pub failures: Vec<TesterFailure>,
    pub outcomes: Vec<TesterSummary>,
}

impl RunReport {
    pub fn issues(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.test_result.is_issue())
    }
}

pub struct Orchestrator {
    testers: Vec<Box<dyn Tester>>,
    settings: OrchestratorSettings,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(settings: OrchestratorSettings, retry: RetryPolicy) -> Self {
        Self {
            testers: Vec::new(),
            settings,
            retry,
        }
    }

    pub fn with_testers(mut self, testers: Vec<Box<dyn Tester>>) -> Self {
        self.testers.extend(testers);
        self
    }

    pub fn register(&mut self, tester: Box<dyn Tester>) {
        self.testers.push(tester);
    }

    pub fn testers(&self) -> impl Iterator<Item = &dyn Tester> {
        self.testers.iter().map(|t| t.as_ref())
    }

    /// Run every tester and collect outcomes, in registration order.
    pub fn run_all(&self, started_at: DateTime<Utc>) -> Vec<TesterOutcome> {
        if self.settings.parallel {
            self.testers
                .par_iter()
                .map(|t| self.run_one(t.as_ref(), started_at))
                .collect()
        } else {
            self.testers
                .iter()
                .map(|t| self.run_one(t.as_ref(), started_at))
                .collect()
        }
    }

    /// Run every tester and aggregate findings and failures.
    pub fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%run_id, testers = self.testers.len(), "starting posture run");

        let mut findings = Vec::new();
        let mut failures = Vec::new();
        let mut outcomes = Vec::new();
        for outcome in self.run_all(started_at) {
            let elapsed_ms = outcome.elapsed.as_millis() as u64;
            match outcome.state {
                TesterState::Completed(found) => {
                    outcomes.push(TesterSummary {
                        tester: outcome.tester,
                        status: TesterStatus::Completed,
                        findings: found.len(),
                        elapsed_ms,
                    });
                    findings.extend(found);
                }
                TesterState::Failed(err) => {
                    outcomes.push(TesterSummary {
                        tester: outcome.tester.clone(),
                        status: TesterStatus::Failed,
                        findings: 0,
                        elapsed_ms,
                    });
                    failures.push(TesterFailure {
                        tester: outcome.tester,
                        provider: outcome.provider,
                        service: outcome.service,
                        kind: err.kind().to_string(),
                        error: err.to_string(),
                    });
                }
                // run_one always settles
                TesterState::Pending => {}
            }
        }

        tracing::info!(
            %run_id,
            findings = findings.len(),
            failures = failures.len(),
            "posture run finished"
        );
        RunReport {
            run_id,
            started_at,
            findings,
            failures,
            outcomes,
        }
    }

    fn run_one(&self, tester: &dyn Tester, started_at: DateTime<Utc>) -> TesterOutcome {
        let name = tester.name();
        let span = tracing::info_span!("tester", tester = %name);
        let _guard = span.enter();

        let deadline = match self.settings.tester_timeout() {
            Some(budget) => Deadline::after(budget),
            None => Deadline::none(),
        };
        let ctx = RunContext::new(deadline, self.retry.clone(), started_at);
        let clock = Instant::now();

        // A result produced after the deadline is discarded whole.
        let result = tester.run(&ctx).and_then(|findings| {
            ctx.checkpoint()?;
            Ok(findings)
        });
        let state = TesterState::Pending.settle(result);
        let elapsed = clock.elapsed();

        match &state {
            TesterState::Completed(findings) => {
                tracing::info!(
                    findings = findings.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "tester completed"
                );
            }
            TesterState::Failed(err @ CheckError::Contract(_)) => {
                tracing::error!(error = %err, "tester hit a contract violation");
            }
            TesterState::Failed(err) => {
                tracing::warn!(error = %err, kind = err.kind(), "tester failed");
            }
            TesterState::Pending => {}
        }

        TesterOutcome {
            tester: name,
            provider: tester.provider_name().to_string(),
            service: tester.service_name().to_string(),
            elapsed,
            state,
        }
    }
}
