//! Sandbox-side test registry.
//!
//! The sandbox registers its cases by name and answers the host's `run`
//! requests with each case's outcome.

use futures::FutureExt;
use futures::future::BoxFuture;
use realmlink_messenger::{Messenger, Registration};
use realmlink_types::protocol::{Run, RunOutcome, RunRequest};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type CaseFn = Arc<dyn Fn() -> BoxFuture<'static, RunOutcome> + Send + Sync>;

/// Named test cases run on request.
#[derive(Clone, Default)]
pub struct SandboxHarness {
    cases: HashMap<String, CaseFn>,
}

impl std::fmt::Debug for SandboxHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.cases.keys().collect();
        names.sort();
        f.debug_struct("SandboxHarness").field("cases", &names).finish()
    }
}

impl SandboxHarness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a case returning a full outcome. A later case with the same
    /// name replaces the earlier one.
    pub fn case<F, Fut>(mut self, name: impl Into<String>, case: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RunOutcome> + Send + 'static,
    {
        self.cases
            .insert(name.into(), Arc::new(move || case().boxed()));
        self
    }

    /// Registers a synchronous pass/fail check.
    pub fn check<F>(self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let check = Arc::new(check);
        self.case(name, move || {
            let check = Arc::clone(&check);
            async move {
                if check() {
                    RunOutcome::pass()
                } else {
                    RunOutcome::fail()
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Runs one case by name.
    ///
    /// Unknown names fail without a refresh. A panicking case fails and asks
    /// for a refresh, since the sandbox state is no longer trustworthy.
    pub async fn run(&self, name: &str) -> RunOutcome {
        let Some(case) = self.cases.get(name).cloned() else {
            warn!(test = %name, "no such test case");
            return RunOutcome::fail();
        };
        let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| case())) {
            Ok(fut) => fut,
            Err(_) => {
                warn!(test = %name, "test case panicked");
                return RunOutcome::fail().with_refresh();
            }
        };
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(outcome) => {
                debug!(test = %name, ok = outcome.ok, refresh = outcome.refresh, "test case finished");
                outcome
            }
            Err(_) => {
                warn!(test = %name, "test case panicked");
                RunOutcome::fail().with_refresh()
            }
        }
    }

    /// Answers `run` requests on `messenger` until `token` fires or the
    /// registration is dropped.
    pub fn serve(self, messenger: &Messenger, token: &CancellationToken) -> Registration {
        let harness = Arc::new(self);
        messenger.respond_to::<Run, _, _, Infallible>(
            move |request: RunRequest| {
                let harness = Arc::clone(&harness);
                async move { Ok(harness.run(&request.name).await) }
            },
            token,
        )
    }
}
