//! Sandbox realm abstraction.
//!
//! A sandbox realm is a reusable, isolated execution context (an embedded
//! document, a worker, a child process). The orchestrator only needs to load
//! it, reset it, and get rid of it; each (re)load hands back a fresh
//! host-side channel to the new realm instance.

use crate::error::OrchestratorResult;
use async_trait::async_trait;
use realmlink_messenger::Channel;
use realmlink_types::RealmContext;
use std::sync::Arc;

/// A sandbox the orchestrator can drive.
#[async_trait]
pub trait SandboxRealm: Send {
    /// The host realm talking to this sandbox.
    fn host_context(&self) -> RealmContext;

    /// First navigation. Returns the host-side channel.
    async fn load(&mut self) -> OrchestratorResult<Arc<dyn Channel>>;

    /// Full reset of an already loaded realm. Returns the new host-side
    /// channel; the previous one is dead afterwards.
    async fn reload(&mut self) -> OrchestratorResult<Arc<dyn Channel>>;

    /// Unloads the realm.
    async fn teardown(&mut self) -> OrchestratorResult<()>;
}
