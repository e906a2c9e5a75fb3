//! posture: cloud posture evaluator for network rule reachability.
//!
//! Fetches security groups, instances and VPCs through a `Collector`,
//! normalizes their firewall rules, and emits exactly one verdict per
//! resource for every built-in check. Testers run isolated from each other:
//! one failing tester is reported without hiding the others' findings.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use posture::{run, RunOptions};
//!
//! let options = RunOptions::default();
//! let report = run(Path::new("inventory.json"), &options).unwrap();
//! println!("Pass: {}, Findings: {}", report.verdict.pass, report.run.findings.len());
//! ```

pub mod checks;
pub mod collector;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use checks::policy::PolicyVerdict;
use checks::{Orchestrator, RunReport};
use collector::{Collector, InMemoryCollector};
use config::Config;
use error::Result;
use output::OutputFormat;

/// Options for a run invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Path to config file (defaults to `.posture.toml` next to the inventory).
    pub config_path: Option<PathBuf>,
    /// Output format.
    pub format: OutputFormat,
    /// CLI override for concurrent tester execution.
    pub parallel_override: Option<bool>,
    /// CLI override for the per-tester time budget, in seconds.
    pub timeout_override: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            format: OutputFormat::Console,
            parallel_override: None,
            timeout_override: None,
        }
    }
}

/// Complete run report with the policy applied.
#[derive(Debug)]
pub struct PostureReport {
    pub run: RunReport,
    pub verdict: PolicyVerdict,
}

/// Run every built-in check against an inventory snapshot.
pub fn run(inventory: &Path, options: &RunOptions) -> Result<PostureReport> {
    let config_path = options.config_path.clone().unwrap_or_else(|| {
        inventory
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(".posture.toml")
    });
    let mut config = Config::load(&config_path)?;

    if let Some(parallel) = options.parallel_override {
        config.orchestrator.parallel = parallel;
    }
    if let Some(secs) = options.timeout_override {
        config.orchestrator.tester_timeout_secs = secs;
    }

    let collector = InMemoryCollector::load(inventory)?;
    Ok(evaluate(Arc::new(collector), &config))
}

/// Run every built-in check through `collector` and apply the policy.
pub fn evaluate(collector: Arc<dyn Collector>, config: &Config) -> PostureReport {
    let orchestrator = Orchestrator::new(config.orchestrator.clone(), config.retry.clone())
        .with_testers(checks::builtin::all_testers(collector));
    let mut run = orchestrator.run();

    let verdict = config.policy.evaluate(&run.findings, &run.failures);
    run.findings = config.policy.apply(&run.findings);

    PostureReport { run, verdict }
}

/// Render a report in the specified format.
pub fn render_report(report: &PostureReport, format: OutputFormat) -> Result<String> {
    output::render(&report.run, &report.verdict, format)
}
