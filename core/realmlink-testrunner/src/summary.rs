//! Running many suites and summarizing the result.

use crate::discover::SuiteSpec;
use crate::error::OrchestratorResult;
use crate::realm::SandboxRealm;
use crate::suite::{SuiteConfig, SuiteReport, TestSuite};
use std::fmt::Write;
use tracing::info;

/// Result of [`run_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub reports: Vec<SuiteReport>,
    /// Failing tests as `suite/filename`, in run order.
    pub failures: Vec<String>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line verdict.
    pub fn message(&self) -> String {
        match self.failures.len() {
            0 => "All tests passed.".to_string(),
            1 => "One test failed!".to_string(),
            n => format!("{n} tests failed!"),
        }
    }

    /// The failing tests, one per indented line. Empty when all passed.
    pub fn report(&self) -> String {
        if self.failures.is_empty() {
            return String::new();
        }
        let mut out = format!("Failing ({}):", self.failures.len());
        for name in &self.failures {
            let _ = write!(out, "\n  {name}");
        }
        out
    }
}

/// Runs `suites` in order, each in a realm built by `make_realm`.
pub async fn run_all<R, F>(
    suites: &[SuiteSpec],
    config: &SuiteConfig,
    mut make_realm: F,
) -> OrchestratorResult<RunSummary>
where
    R: SandboxRealm,
    F: FnMut(&SuiteSpec) -> R,
{
    let mut summary = RunSummary::default();
    let total = suites.len();

    for (done, spec) in suites.iter().enumerate() {
        let mut suite = TestSuite::new(
            spec.path.clone(),
            spec.names(),
            make_realm(spec),
            config.clone(),
        );
        let report = suite.run().await?;
        summary.failures.extend(
            report
                .failures()
                .into_iter()
                .map(|name| format!("{}/{name}", report.path)),
        );
        summary.reports.push(report);

        let percent = (done + 1) * 100 / total;
        info!(suite = %spec.path, "{percent}% done");
    }

    info!(failures = summary.failures.len(), "{}", summary.message());
    Ok(summary)
}
