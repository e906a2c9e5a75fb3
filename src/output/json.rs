use crate::checks::policy::PolicyVerdict;
use crate::checks::RunReport;
use crate::error::Result;

use serde::Serialize;

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a RunReport,
    verdict: &'a PolicyVerdict,
}

/// Render a run report as JSON.
pub fn render(report: &RunReport, verdict: &PolicyVerdict) -> Result<String> {
    let json = serde_json::to_string_pretty(&JsonReport { report, verdict })?;
    Ok(json)
}
