//! Sandboxed test orchestration.
//!
//! A [`TestSuite`] drives a [`SandboxRealm`] through a list of tests, one
//! `run` RPC per test, reloading the sandbox whenever a test fails or asks
//! for a fresh realm. The sandbox side answers with a [`SandboxHarness`].

mod discover;
mod error;
mod harness;
mod local;
mod realm;
mod status;
mod suite;
mod summary;

pub use discover::{SuiteSpec, TestSpec, discover_suites};
pub use error::{OrchestratorError, OrchestratorResult};
pub use harness::SandboxHarness;
pub use local::{HarnessFactory, LocalSandbox};
pub use realm::SandboxRealm;
pub use status::{TestProgress, TestStatus};
pub use suite::{SuiteConfig, SuiteReport, TestSuite};
pub use summary::{RunSummary, run_all};
