//! The privileged-side file server.
//!
//! At most one server per group answers `fileRequest`s. A server starts
//! answering on [`FileServer::listen`], which also announces it to the group;
//! any other listening server that hears the announcement steps down.

use crate::content_type::extension;
use crate::error::StoreResult;
use crate::formatter::{ContentFormatter, NoopFormatter};
use crate::inject::{BodyTransform, HtmlInjection};
use crate::store::VirtualResourceStore;
use realmlink_messenger::{Channel, Messenger, MessengerConfig, MessengerResult, Registration};
use realmlink_types::RealmContext;
use realmlink_types::protocol::{FileReply, FileRequest, FileRequestPayload, Listen, ListenState};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How [`FileServer::publish`] prepares entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// Path prefix replaced by the published set.
    pub scope: String,
    /// Fragment injected into the head of HTML resources.
    pub inject: Option<String>,
    /// Whether UTF-8 bodies go through the content formatter.
    pub format: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            scope: "/file/".to_string(),
            inject: None,
            format: false,
        }
    }
}

/// Registration slot for the `fileRequest` responder. Empty while the
/// server is not listening.
type ResponderSlot = Arc<Mutex<Option<Registration>>>;

/// Serves a [`VirtualResourceStore`] to sandboxed realms.
pub struct FileServer {
    store: Arc<VirtualResourceStore>,
    messenger: Messenger,
    formatter: Arc<dyn ContentFormatter>,
    responder: ResponderSlot,
    token: CancellationToken,
    _announcements: Registration,
}

impl std::fmt::Debug for FileServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileServer")
            .field("listening", &self.is_listening())
            .field("store", &self.store)
            .finish()
    }
}

impl FileServer {
    /// Creates a server on the file-server group channel. It does not answer
    /// requests until [`listen`](Self::listen) is called.
    pub fn new(
        context: RealmContext,
        channel: Arc<dyn Channel>,
        store: Arc<VirtualResourceStore>,
        config: MessengerConfig,
    ) -> Self {
        let messenger = Messenger::new(context, channel, config);
        let token = CancellationToken::new();
        let responder: ResponderSlot = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&responder);
        let announcements = messenger.subscribe::<Listen, _, _>(
            move |state: ListenState| {
                let slot = Arc::clone(&slot);
                async move {
                    if state.listening
                        && slot.lock().unwrap_or_else(PoisonError::into_inner).take().is_some()
                    {
                        info!("another file server is listening, stepping down");
                    }
                }
            },
            &token,
        );

        Self {
            store,
            messenger,
            formatter: Arc::new(NoopFormatter),
            responder,
            token,
            _announcements: announcements,
        }
    }

    /// Replaces the content formatter used by [`publish`](Self::publish).
    pub fn with_formatter(mut self, formatter: Arc<dyn ContentFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn store(&self) -> &Arc<VirtualResourceStore> {
        &self.store
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Whether this server currently answers requests.
    pub fn is_listening(&self) -> bool {
        self.responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Starts answering `fileRequest`s and announces it to the group.
    pub async fn listen(&self) -> MessengerResult<()> {
        {
            let mut slot = self.responder.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                let store = Arc::clone(&self.store);
                *slot = Some(self.messenger.respond_to::<FileRequest, _, _, Infallible>(
                    move |req: FileRequestPayload| {
                        let store = Arc::clone(&store);
                        async move {
                            let reply = match store.get(&req.path) {
                                Some(resource) => FileReply::found(resource.body),
                                None => {
                                    debug!(path = %req.path, "resource not found");
                                    FileReply::not_found()
                                }
                            };
                            Ok(reply)
                        }
                    },
                    &self.token,
                ));
            }
        }
        info!(resources = self.store.len(), "file server listening");
        self.messenger
            .notify::<Listen>(ListenState { listening: true })
            .await
    }

    /// Stops answering and tells the group the server is gone.
    pub async fn unlisten(&self) -> MessengerResult<()> {
        let registration = self
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(registration);
        info!("file server stopped listening");
        self.messenger
            .notify::<Listen>(ListenState { listening: false })
            .await
    }

    /// Replaces `options.scope` with `entries`, formatting bodies and
    /// injecting the fragment into HTML resources first.
    pub fn publish(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        options: &PublishOptions,
    ) -> StoreResult<usize> {
        let entries = if options.format {
            entries
                .into_iter()
                .map(|(path, body)| {
                    let body = match String::from_utf8(body) {
                        Ok(text) => self.formatter.format(&text, extension(&path)).into_bytes(),
                        Err(e) => e.into_bytes(),
                    };
                    (path, body)
                })
                .collect()
        } else {
            entries
        };
        let injection = options.inject.as_deref().map(HtmlInjection::new);
        self.store.replace_scope(
            &options.scope,
            entries,
            injection.as_ref().map(|t| t as &dyn BodyTransform),
        )
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
