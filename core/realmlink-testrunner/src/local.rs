//! In-process sandbox realm.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::harness::SandboxHarness;
use crate::realm::SandboxRealm;
use async_trait::async_trait;
use realmlink_messenger::{Channel, Messenger, MessengerConfig, PairedEndpoint, Registration};
use realmlink_types::{RealmContext, RealmRole};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Builds the harness for each fresh sandbox instance.
pub type HarnessFactory = Arc<dyn Fn() -> SandboxHarness + Send + Sync>;

struct Instance {
    endpoint: PairedEndpoint,
    messenger: Messenger,
    token: CancellationToken,
    _serving: Registration,
}

impl Instance {
    fn shutdown(self) {
        self.token.cancel();
        self.messenger.close();
        self.endpoint.close();
    }
}

/// A sandbox realm living in the same process, connected by a paired
/// channel. Every load starts from a fresh harness, so state left behind by
/// one test never survives a reload.
pub struct LocalSandbox {
    host: RealmContext,
    factory: HarnessFactory,
    config: MessengerConfig,
    instance: Option<Instance>,
    loads: usize,
}

impl std::fmt::Debug for LocalSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSandbox")
            .field("host", &self.host.id)
            .field("loaded", &self.instance.is_some())
            .field("loads", &self.loads)
            .finish()
    }
}

impl LocalSandbox {
    pub fn new<F>(host: RealmContext, factory: F) -> Self
    where
        F: Fn() -> SandboxHarness + Send + Sync + 'static,
    {
        Self {
            host,
            factory: Arc::new(factory),
            config: MessengerConfig::default(),
            instance: None,
            loads: 0,
        }
    }

    /// Messenger configuration for the sandbox side.
    pub fn with_config(mut self, config: MessengerConfig) -> Self {
        self.config = config;
        self
    }

    /// How many times a sandbox instance has been created.
    pub fn load_count(&self) -> usize {
        self.loads
    }

    pub fn is_loaded(&self) -> bool {
        self.instance.is_some()
    }

    fn spawn_instance(&mut self) -> Arc<dyn Channel> {
        let sandbox = RealmContext::new(RealmRole::Nested, self.host.origin.clone());
        let (host_end, sandbox_end) = PairedEndpoint::pair(self.host.id, sandbox.id);

        let messenger = Messenger::new(sandbox.clone(), Arc::new(sandbox_end), self.config.clone());
        let token = CancellationToken::new();
        let serving = (self.factory)().serve(&messenger, &token);

        self.loads += 1;
        debug!(sandbox = %sandbox.id, loads = self.loads, "sandbox instance created");
        self.instance = Some(Instance {
            endpoint: host_end.clone(),
            messenger,
            token,
            _serving: serving,
        });
        Arc::new(host_end)
    }
}

#[async_trait]
impl SandboxRealm for LocalSandbox {
    fn host_context(&self) -> RealmContext {
        self.host.clone()
    }

    async fn load(&mut self) -> OrchestratorResult<Arc<dyn Channel>> {
        if self.instance.is_some() {
            return Err(OrchestratorError::Realm(
                "sandbox already loaded".to_string(),
            ));
        }
        Ok(self.spawn_instance())
    }

    async fn reload(&mut self) -> OrchestratorResult<Arc<dyn Channel>> {
        if let Some(old) = self.instance.take() {
            old.shutdown();
        }
        Ok(self.spawn_instance())
    }

    async fn teardown(&mut self) -> OrchestratorResult<()> {
        if let Some(old) = self.instance.take() {
            old.shutdown();
            debug!(host = %self.host.id, "sandbox torn down");
        }
        Ok(())
    }
}

impl Drop for LocalSandbox {
    fn drop(&mut self) {
        if let Some(old) = self.instance.take() {
            old.shutdown();
        }
    }
}
