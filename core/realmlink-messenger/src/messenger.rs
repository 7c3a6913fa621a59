//! Request/response messenger bound to one channel.
//!
//! Every envelope is `{kind, correlationId, payload}`. Requests carry a kind;
//! responses carry `kind: null` and the correlation id of the request they
//! answer. The messenger runs a receive pump that resolves pending requests
//! and dispatches incoming requests to registered responders.

use crate::channel::{Channel, ChannelKind, Delivery, Inbox};
use crate::error::{MessengerError, MessengerResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use realmlink_types::protocol::Handshake;
use realmlink_types::{
    CorrelationId, Envelope, MessageKind, Notification, RealmContext, RealmId, Rpc, error_marker,
    error_payload,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{OnceCell, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Configuration for a [`Messenger`].
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// Upper bound on a paired-channel handshake.
    pub handshake_timeout: Duration,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Handshake progress of a messenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Connected,
}

/// A type-erased handler. `None` means no reply is posted.
type ErasedHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Option<Value>> + Send + Sync>;

struct ResponderEntry {
    id: u64,
    token: CancellationToken,
    handler: ErasedHandler,
}

struct Shared {
    context: RealmContext,
    channel: Arc<dyn Channel>,
    config: MessengerConfig,
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<Value>>>,
    responders: Mutex<HashMap<MessageKind, Vec<ResponderEntry>>>,
    next_registration: AtomicU64,
    state: Mutex<ConnectionState>,
    connected: OnceCell<()>,
    probe_seen: Arc<watch::Sender<bool>>,
    shutdown: CancellationToken,
}

/// Cancels the pump once the last [`Messenger`] clone is dropped.
struct Handle {
    shared: Arc<Shared>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

/// Request/response messaging over one [`Channel`].
///
/// Cloning is cheap; clones share the pending table, responders and
/// connection state. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct Messenger {
    handle: Arc<Handle>,
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = &self.handle.shared;
        f.debug_struct("Messenger")
            .field("realm", &shared.context.id)
            .field("channel", &shared.channel.kind())
            .field("state", &self.state())
            .finish()
    }
}

impl Messenger {
    /// Binds a messenger to `channel` and starts its receive pump.
    pub fn new(context: RealmContext, channel: Arc<dyn Channel>, config: MessengerConfig) -> Self {
        let rx = channel.subscribe();
        let (probe_tx, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            context,
            channel,
            config,
            pending: Mutex::new(HashMap::new()),
            responders: Mutex::new(HashMap::new()),
            next_registration: AtomicU64::new(1),
            state: Mutex::new(ConnectionState::Unconnected),
            connected: OnceCell::new(),
            probe_seen: Arc::new(probe_tx),
            shutdown: CancellationToken::new(),
        });

        if shared.channel.kind() == ChannelKind::Paired {
            // Probes are answered for the whole lifetime, so a peer that
            // (re)starts late can always complete its handshake.
            let probe_seen = Arc::clone(&shared.probe_seen);
            let handler: ErasedHandler = Arc::new(move |_payload: Value| {
                probe_seen.send_replace(true);
                async { Some(Value::Null) }.boxed()
            });
            shared.insert_responder(
                MessageKind::Handshake,
                shared.shutdown.child_token(),
                handler,
            );
        }

        tokio::spawn(pump(Arc::clone(&shared), rx));

        debug!(
            realm = %shared.context.id,
            channel = ?shared.channel.kind(),
            "messenger bound"
        );

        Self {
            handle: Arc::new(Handle { shared }),
        }
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.handle.shared
    }

    /// The realm this messenger speaks for.
    pub fn context(&self) -> &RealmContext {
        &self.shared().context
    }

    /// The bound channel.
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.shared().channel
    }

    /// Current handshake state.
    pub fn state(&self) -> ConnectionState {
        *self
            .shared()
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared()
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of live responders and subscribers for `kind`.
    pub fn responder_count(&self, kind: MessageKind) -> usize {
        let mut responders = self
            .shared()
            .responders
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match responders.get_mut(&kind) {
            Some(entries) => {
                entries.retain(|e| !e.token.is_cancelled());
                entries.len()
            }
            None => 0,
        }
    }

    /// Whether the messenger has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared().shutdown.is_cancelled()
    }

    /// Establishes the connection.
    ///
    /// Group channels connect immediately. Paired channels race "a probe from
    /// the peer arrives" against "our probe is answered"; whichever settles
    /// first decides. Concurrent callers share one attempt, and a failed
    /// attempt can be retried.
    pub async fn connect(&self) -> MessengerResult<()> {
        let shared = self.shared();
        if shared.shutdown.is_cancelled() {
            return Err(MessengerError::ChannelClosed);
        }
        if shared.channel.kind() == ChannelKind::Group {
            shared.set_state(ConnectionState::Connected);
            return Ok(());
        }
        shared
            .connected
            .get_or_try_init(|| self.handshake())
            .await
            .map(|_| ())
    }

    async fn handshake(&self) -> MessengerResult<()> {
        let shared = self.shared();
        shared.set_state(ConnectionState::Connecting);

        let timeout = shared.config.handshake_timeout;
        let mut probe_rx = shared.probe_seen.subscribe();
        let probe_received = async move {
            probe_rx
                .wait_for(|seen| *seen)
                .await
                .map(|_| ())
                .map_err(|_| MessengerError::ChannelClosed)
        };
        let probe_answered = async {
            let payload = serde_json::to_value(())?;
            self.request_raw(Handshake::KIND, payload).await.map(|_| ())
        };

        let outcome = tokio::time::timeout(timeout, async {
            tokio::select! {
                r = probe_received => r,
                r = probe_answered => r,
            }
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                shared.set_state(ConnectionState::Connected);
                debug!(realm = %shared.context.id, "handshake complete");
                Ok(())
            }
            Ok(Err(e)) => {
                shared.set_state(ConnectionState::Unconnected);
                Err(e)
            }
            Err(_) => {
                shared.set_state(ConnectionState::Unconnected);
                warn!(realm = %shared.context.id, ?timeout, "handshake timed out");
                Err(MessengerError::HandshakeTimeout(timeout))
            }
        }
    }

    /// Sends a request and waits for its response.
    pub async fn send<R: Rpc>(&self, request: R::Request) -> MessengerResult<R::Response> {
        if R::KIND != MessageKind::Handshake {
            self.connect().await?;
        }
        let payload = serde_json::to_value(request)?;
        let reply = self.request_raw(R::KIND, payload).await?;
        if let Some(message) = error_marker(&reply) {
            return Err(MessengerError::Remote(message));
        }
        Ok(serde_json::from_value(reply)?)
    }

    async fn request_raw(&self, kind: MessageKind, payload: Value) -> MessengerResult<Value> {
        let shared = self.shared();
        let id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();
        let _guard = PendingGuard::register(shared, id, tx);

        shared.channel.post(Envelope::request(kind, id, payload))?;
        trace!(%kind, correlation_id = %id, "request posted");

        tokio::select! {
            reply = rx => reply.map_err(|_| MessengerError::ChannelClosed),
            _ = shared.shutdown.cancelled() => Err(MessengerError::ChannelClosed),
        }
    }

    /// Posts a notification. No reply is expected.
    pub async fn notify<N: Notification>(&self, payload: N::Payload) -> MessengerResult<()> {
        self.connect().await?;
        let payload = serde_json::to_value(payload)?;
        self.shared()
            .channel
            .post(Envelope::request(N::KIND, CorrelationId::new(), payload))
    }

    /// Registers a responder for incoming `R` requests.
    ///
    /// The handler's result is posted back as the response. An error, a
    /// panic or an undecodable request produces an error-marker response.
    /// The responder is removed when `token` fires or the returned
    /// [`Registration`] is dropped.
    pub fn respond_to<R, F, Fut, E>(&self, handler: F, token: &CancellationToken) -> Registration
    where
        R: Rpc,
        F: Fn(R::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Response, E>> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |payload: Value| {
            let handler = Arc::clone(&handler);
            async move {
                let request: R::Request = match serde_json::from_value(payload) {
                    Ok(request) => request,
                    Err(e) => {
                        return Some(error_payload(format!("invalid {} payload: {e}", R::KIND)));
                    }
                };
                let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(request))) {
                    Ok(fut) => fut,
                    Err(_) => return Some(error_payload(format!("{} handler panicked", R::KIND))),
                };
                let reply = match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(Ok(response)) => serde_json::to_value(response)
                        .unwrap_or_else(|e| error_payload(format!("unserializable reply: {e}"))),
                    Ok(Err(e)) => error_payload(e.to_string()),
                    Err(_) => error_payload(format!("{} handler panicked", R::KIND)),
                };
                Some(reply)
            }
            .boxed()
        });
        self.register(R::KIND, erased, token)
    }

    /// Registers a subscriber for incoming `N` notifications.
    pub fn subscribe<N, F, Fut>(&self, handler: F, token: &CancellationToken) -> Registration
    where
        N: Notification,
        F: Fn(N::Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |payload: Value| {
            let handler = Arc::clone(&handler);
            async move {
                match serde_json::from_value::<N::Payload>(payload) {
                    Ok(payload) => {
                        if AssertUnwindSafe(handler(payload)).catch_unwind().await.is_err() {
                            warn!(kind = %N::KIND, "notification handler panicked");
                        }
                    }
                    Err(e) => debug!(kind = %N::KIND, error = %e, "undecodable notification"),
                }
                None
            }
            .boxed()
        });
        self.register(N::KIND, erased, token)
    }

    fn register(
        &self,
        kind: MessageKind,
        handler: ErasedHandler,
        token: &CancellationToken,
    ) -> Registration {
        let shared = self.shared();
        let token = token.child_token();
        let id = shared.insert_responder(kind, token.clone(), handler);
        Registration {
            kind,
            id,
            token,
            shared: Arc::downgrade(shared),
        }
    }

    /// Stops the receive pump. Pending and future sends fail with
    /// [`MessengerError::ChannelClosed`].
    pub fn close(&self) {
        self.shared().shutdown.cancel();
    }
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn insert_responder(
        &self,
        kind: MessageKind,
        token: CancellationToken,
        handler: ErasedHandler,
    ) -> u64 {
        let id = self.next_registration.fetch_add(1, Ordering::Relaxed);
        self.responders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(ResponderEntry { id, token, handler });
        id
    }

    fn remove_responder(&self, kind: MessageKind, id: u64) {
        let mut responders = self.responders.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = responders.get_mut(&kind) {
            entries.retain(|e| e.id != id);
        }
    }

    fn source_allowed(&self, source: Option<RealmId>) -> bool {
        match source {
            None => true,
            Some(_) if self.channel.kind() == ChannelKind::Group => true,
            Some(source) => self.channel.peer_id() == Some(source),
        }
    }

    fn dispatch(&self, delivery: Delivery) {
        let Delivery { source, envelope } = delivery;

        // Groups deliver a member's own posts back to it.
        if source.is_some() && source == Some(self.channel.local_id()) {
            return;
        }
        if !self.source_allowed(source) {
            debug!(
                realm = %self.context.id,
                source = ?source,
                "dropping message from unexpected source"
            );
            return;
        }

        match envelope.kind {
            None => {
                let resolver = self
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&envelope.correlation_id);
                match resolver {
                    Some(tx) => {
                        let _ = tx.send(envelope.payload);
                    }
                    None => trace!(correlation_id = %envelope.correlation_id, "unmatched response"),
                }
            }
            Some(MessageKind::Unknown) => {
                trace!(correlation_id = %envelope.correlation_id, "unknown message kind");
            }
            Some(kind) => {
                let handlers: Vec<ErasedHandler> = {
                    let mut responders =
                        self.responders.lock().unwrap_or_else(PoisonError::into_inner);
                    match responders.get_mut(&kind) {
                        Some(entries) => {
                            entries.retain(|e| !e.token.is_cancelled());
                            entries.iter().map(|e| Arc::clone(&e.handler)).collect()
                        }
                        None => Vec::new(),
                    }
                };
                if handlers.is_empty() {
                    trace!(%kind, "no responder registered");
                    return;
                }
                for handler in handlers {
                    let channel = Arc::clone(&self.channel);
                    let correlation_id = envelope.correlation_id;
                    let payload = envelope.payload.clone();
                    tokio::spawn(async move {
                        if let Some(reply) = handler(payload).await {
                            if let Err(e) = channel.post(Envelope::response(correlation_id, reply)) {
                                debug!(%kind, error = %e, "failed to post response");
                            }
                        }
                    });
                }
            }
        }
    }
}

async fn pump(shared: Arc<Shared>, mut rx: Inbox) {
    loop {
        let delivery = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            received = rx.recv() => match received {
                Some(delivery) => delivery,
                None => break,
            },
        };
        shared.dispatch(delivery);
    }

    shared.shutdown.cancel();
    shared.set_state(ConnectionState::Unconnected);
    shared
        .pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
    debug!(realm = %shared.context.id, "receive pump stopped");
}

/// Removes a pending entry when the waiting caller finishes or is dropped.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: CorrelationId,
}

impl<'a> PendingGuard<'a> {
    fn register(shared: &'a Shared, id: CorrelationId, tx: oneshot::Sender<Value>) -> Self {
        shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        Self { shared, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Keeps a responder or subscriber alive. Dropping it unregisters.
#[derive(Debug)]
#[must_use = "dropping a Registration unregisters its handler"]
pub struct Registration {
    kind: MessageKind,
    id: u64,
    token: CancellationToken,
    shared: Weak<Shared>,
}

impl Registration {
    /// The kind this registration listens for.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Whether the handler is still live.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.shared.strong_count() > 0
    }

    /// Unregisters now.
    pub fn cancel(self) {}
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_responder(self.kind, self.id);
        }
    }
}
