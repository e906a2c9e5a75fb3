use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::checks::policy::Policy;
use crate::checks::OrchestratorSettings;
use crate::collector::RetryPolicy;
use crate::error::Result;

/// Top-level configuration from `.posture.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# posture configuration

[policy]
# Fail the run when any check reports an issue.
fail_on_issue = true

# Check names to ignore entirely.
# ignore_checks = ["ec2_inbound_http_access_restricted"]

[orchestrator]
# Run testers concurrently.
parallel = true
# Per-tester time budget in seconds (0 disables it).
tester_timeout_secs = 300

[retry]
# Attempts per provider call, including the first.
max_attempts = 4
initial_backoff_ms = 200
max_backoff_ms = 5000
# Timeout handed to each provider call.
call_timeout_secs = 30
"#
    }
}
