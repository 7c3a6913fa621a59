//! Sequential execution of one test suite.

use crate::error::OrchestratorResult;
use crate::realm::SandboxRealm;
use crate::status::{TestProgress, TestStatus};
use realmlink_messenger::{Channel, Messenger, MessengerConfig};
use realmlink_types::protocol::{Run, RunRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Configuration for a [`TestSuite`].
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Messenger configuration used for every sandbox instance.
    pub messenger: MessengerConfig,
    /// Upper bound on a single test. A test that overruns fails and forces
    /// a reload.
    pub test_timeout: Duration,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            messenger: MessengerConfig::default(),
            test_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of a finished suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    pub path: String,
    /// `(name, status)` in run order.
    pub results: Vec<(String, TestStatus)>,
    pub status: TestStatus,
}

impl SuiteReport {
    /// Whether every item passed.
    pub fn success(&self) -> bool {
        self.status == TestStatus::Success || self.results.is_empty()
    }

    /// Names of items that did not pass.
    pub fn failures(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, status)| *status != TestStatus::Success)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// A named list of tests run one after another in a reusable sandbox.
pub struct TestSuite<R: SandboxRealm> {
    path: String,
    names: Vec<String>,
    realm: R,
    config: SuiteConfig,
    progress: watch::Sender<TestProgress>,
}

impl<R: SandboxRealm> std::fmt::Debug for TestSuite<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSuite")
            .field("path", &self.path)
            .field("names", &self.names)
            .field("progress", &*self.progress.borrow())
            .finish()
    }
}

impl<R: SandboxRealm> TestSuite<R> {
    pub fn new(
        path: impl Into<String>,
        names: Vec<String>,
        realm: R,
        config: SuiteConfig,
    ) -> Self {
        let (progress, _) = watch::channel(TestProgress::pending(names.len()));
        Self {
            path: path.into(),
            names,
            realm,
            config,
            progress,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn realm(&self) -> &R {
        &self.realm
    }

    /// Live view of the item statuses.
    pub fn progress(&self) -> watch::Receiver<TestProgress> {
        self.progress.subscribe()
    }

    fn set_status(&self, index: usize, status: TestStatus) {
        self.progress.send_modify(|progress| {
            progress.statuses[index] = status;
            progress.aggregate = TestStatus::aggregate(&progress.statuses);
        });
    }

    async fn fresh_channel(&mut self, loaded: bool) -> OrchestratorResult<Arc<dyn Channel>> {
        if loaded {
            self.realm.reload().await
        } else {
            self.realm.load().await
        }
    }

    /// Runs every item in order.
    ///
    /// The sandbox is (re)loaded before the first item and after any item
    /// that failed or asked for a refresh. A failing item never aborts the
    /// run. The sandbox is torn down at the end.
    pub async fn run(&mut self) -> OrchestratorResult<SuiteReport> {
        let host = self.realm.host_context();
        let mut messenger: Option<Messenger> = None;
        let mut loaded = false;

        info!(suite = %self.path, tests = self.names.len(), "running suite");

        for index in 0..self.names.len() {
            let name = self.names[index].clone();
            self.set_status(index, TestStatus::Running);

            if messenger.is_none() {
                match self.fresh_channel(loaded).await {
                    Ok(channel) => {
                        loaded = true;
                        messenger = Some(Messenger::new(
                            host.clone(),
                            channel,
                            self.config.messenger.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(suite = %self.path, test = %name, error = %e, "sandbox failed to load");
                        self.set_status(index, TestStatus::Failed);
                        continue;
                    }
                }
            }
            let Some(current) = messenger.as_ref() else {
                continue;
            };

            let request = current.send::<Run>(RunRequest { name: name.clone() });
            let (ok, refresh) = match tokio::time::timeout(self.config.test_timeout, request).await {
                Ok(Ok(outcome)) => (outcome.ok, outcome.refresh),
                Ok(Err(e)) => {
                    warn!(suite = %self.path, test = %name, error = %e, "run request failed");
                    (false, true)
                }
                Err(_) => {
                    warn!(suite = %self.path, test = %name, "test timed out");
                    (false, true)
                }
            };

            let status = if ok {
                TestStatus::Success
            } else {
                TestStatus::Failed
            };
            self.set_status(index, status);
            debug!(suite = %self.path, test = %name, %status, refresh, "test finished");

            if refresh || !ok {
                if let Some(old) = messenger.take() {
                    old.close();
                }
            }
        }

        if let Some(old) = messenger.take() {
            old.close();
        }
        if loaded {
            if let Err(e) = self.realm.teardown().await {
                warn!(suite = %self.path, error = %e, "teardown failed");
            }
        }

        let progress = self.progress.borrow().clone();
        let report = SuiteReport {
            path: self.path.clone(),
            results: self
                .names
                .iter()
                .cloned()
                .zip(progress.statuses)
                .collect(),
            status: progress.aggregate,
        };
        info!(suite = %self.path, status = %report.status, "suite finished");
        Ok(report)
    }
}
