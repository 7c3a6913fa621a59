//! Sandbox-side network interception.
//!
//! Same-origin requests under the reserved prefix are answered from the
//! privileged realm's file server instead of the network. Each lookup is one
//! `fileRequest` raced against a fixed timeout; outcomes are plain response
//! values, never errors.

use crate::content_type::ContentType;
use realmlink_messenger::{Channel, Messenger, MessengerConfig, Registration};
use realmlink_types::RealmContext;
use realmlink_types::protocol::{FileRequest, FileRequestPayload, Listen, ListenState};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Interceptor configuration.
#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// Reserved path prefix; only paths under it are intercepted.
    pub prefix: String,
    /// How long to wait for the file server before answering 504.
    pub timeout: Duration,
    /// Configuration of the underlying messenger.
    pub messenger: MessengerConfig,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            prefix: "/file/".to_string(),
            timeout: Duration::from_millis(5000),
            messenger: MessengerConfig::default(),
        }
    }
}

/// An outgoing request as seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    /// `scheme://host[:port]`.
    pub origin: String,
    /// Path without query or fragment.
    pub path: String,
}

impl ResourceRequest {
    pub fn new(origin: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            path: path.into(),
        }
    }

    /// Splits an absolute URL into origin and path. Returns `None` for
    /// anything that is not `scheme://host...`.
    pub fn from_url(url: &str) -> Option<Self> {
        let (scheme, rest) = url.split_once("://")?;
        if scheme.is_empty() {
            return None;
        }
        let host_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (host, tail) = rest.split_at(host_end);
        if host.is_empty() {
            return None;
        }
        let path_end = tail.find(['?', '#']).unwrap_or(tail.len());
        let path = match &tail[..path_end] {
            "" => "/",
            p => p,
        };
        Some(Self::new(format!("{scheme}://{host}"), path))
    }
}

/// A locally produced response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticResponse {
    pub status: u16,
    pub content_type: Option<ContentType>,
    pub body: Option<Vec<u8>>,
}

impl SyntheticResponse {
    pub fn ok(content_type: ContentType, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type),
            body: Some(body),
        }
    }

    pub fn not_found() -> Self {
        Self::status_only(404)
    }

    pub fn gateway_timeout() -> Self {
        Self::status_only(504)
    }

    pub fn bad_gateway() -> Self {
        Self::status_only(502)
    }

    fn status_only(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: None,
        }
    }
}

/// What the interceptor last heard about the file server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAvailability {
    /// No announcement seen yet.
    Unknown,
    Listening,
    /// The server announced it stopped.
    Gone,
}

impl ServerAvailability {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ServerAvailability::Listening,
            2 => ServerAvailability::Gone,
            _ => ServerAvailability::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ServerAvailability::Unknown => 0,
            ServerAvailability::Listening => 1,
            ServerAvailability::Gone => 2,
        }
    }
}

/// Answers intercepted requests through the file server.
#[derive(Debug)]
pub struct NetworkInterceptor {
    context: RealmContext,
    messenger: Messenger,
    config: InterceptorConfig,
    availability: Arc<AtomicU8>,
    token: CancellationToken,
    _announcements: Registration,
}

impl NetworkInterceptor {
    /// Installs the interceptor for one sandboxed realm on the file-server
    /// group channel.
    pub fn install(context: RealmContext, channel: Arc<dyn Channel>, config: InterceptorConfig) -> Self {
        let messenger = Messenger::new(context.clone(), channel, config.messenger.clone());
        let availability = Arc::new(AtomicU8::new(ServerAvailability::Unknown.as_u8()));
        let token = CancellationToken::new();

        let seen = Arc::clone(&availability);
        let announcements = messenger.subscribe::<Listen, _, _>(
            move |state: ListenState| {
                let seen = Arc::clone(&seen);
                async move {
                    let next = if state.listening {
                        ServerAvailability::Listening
                    } else {
                        ServerAvailability::Gone
                    };
                    seen.store(next.as_u8(), Ordering::SeqCst);
                    debug!(?next, "file server availability changed");
                }
            },
            &token,
        );

        debug!(realm = %context.id, prefix = %config.prefix, "network interceptor installed");
        Self {
            context,
            messenger,
            config,
            availability,
            token,
            _announcements: announcements,
        }
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    /// Last announced file server state.
    pub fn availability(&self) -> ServerAvailability {
        ServerAvailability::from_u8(self.availability.load(Ordering::SeqCst))
    }

    /// The resource path a request maps to, or `None` when the request is
    /// not intercepted. Directory targets map to their `index.html`.
    pub fn resolve(&self, request: &ResourceRequest) -> Option<String> {
        if request.origin != self.context.origin || !request.path.starts_with(&self.config.prefix)
        {
            return None;
        }
        if request.path.ends_with('/') {
            Some(format!("{}index.html", request.path))
        } else {
            Some(request.path.clone())
        }
    }

    /// Answers `request` locally, or returns `None` to let it pass through.
    pub async fn intercept(&self, request: &ResourceRequest) -> Option<SyntheticResponse> {
        let path = self.resolve(request)?;
        Some(self.fetch(path).await)
    }

    async fn fetch(&self, path: String) -> SyntheticResponse {
        if self.availability() == ServerAvailability::Gone {
            debug!(%path, "file server gone, answering 504");
            return SyntheticResponse::gateway_timeout();
        }

        let content_type = ContentType::from_path(&path);
        let lookup = self
            .messenger
            .send::<FileRequest>(FileRequestPayload { path: path.clone() });

        tokio::select! {
            reply = lookup => match reply {
                Ok(reply) => match reply.body {
                    Some(body) => SyntheticResponse::ok(content_type, body),
                    None => SyntheticResponse::not_found(),
                },
                Err(e) => {
                    warn!(%path, error = %e, "file request failed");
                    SyntheticResponse::bad_gateway()
                }
            },
            _ = tokio::time::sleep(self.config.timeout) => {
                debug!(%path, timeout = ?self.config.timeout, "file request timed out");
                SyntheticResponse::gateway_timeout()
            }
        }
    }
}

impl Drop for NetworkInterceptor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
