//! Channel abstraction.
//!
//! A channel moves [`Envelope`]s between realms with no ordering or delivery
//! guarantee. Two shapes exist:
//! - **paired**: exactly two fixed endpoints; a handshake is needed before
//!   the first request because either side may start listening late
//! - **group**: a named broadcast group; joining is the handshake
//!
//! Both in-memory implementations fan each delivery out to one unbounded
//! queue per subscriber, so posting never blocks and never drops under load.
//! A message posted while no one is subscribed is lost, exactly like a
//! `postMessage` to a document that has not loaded yet.

use crate::error::{MessengerError, MessengerResult};
use realmlink_types::{Envelope, RealmId};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

/// Receiving side of a channel subscription. `recv` yields `None` once the
/// channel is closed.
pub type Inbox = mpsc::UnboundedReceiver<Delivery>;

/// Channel shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Paired,
    Group,
}

/// An envelope together with the realm that posted it.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Posting realm; `None` for same-realm dispatch.
    pub source: Option<RealmId>,
    pub envelope: Envelope,
}

/// A message-passing primitive connecting realms.
pub trait Channel: Send + Sync {
    /// Paired or group.
    fn kind(&self) -> ChannelKind;

    /// The realm this endpoint belongs to.
    fn local_id(&self) -> RealmId;

    /// The fixed peer of a paired channel; `None` for groups.
    fn peer_id(&self) -> Option<RealmId>;

    /// Posts an envelope to the other side(s).
    fn post(&self, envelope: Envelope) -> MessengerResult<()>;

    /// Subscribes to deliveries arriving at this endpoint.
    fn subscribe(&self) -> Inbox;

    /// Whether the channel has been closed.
    fn is_closed(&self) -> bool;
}

/// Subscriber queues of one inbox. `None` once closed; dropping the senders
/// ends every subscription.
#[derive(Debug)]
struct Mailbox {
    subscribers: Mutex<Option<Vec<mpsc::UnboundedSender<Delivery>>>>,
}

impl Mailbox {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(Some(Vec::new())),
        })
    }

    fn deliver(&self, delivery: Delivery) -> MessengerResult<()> {
        let mut guard = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let subscribers = guard.as_mut().ok_or(MessengerError::ChannelClosed)?;
        subscribers.retain(|tx| tx.send(delivery.clone()).is_ok());
        if subscribers.is_empty() {
            trace!("no subscriber on mailbox, message dropped");
        }
        Ok(())
    }

    fn subscribe(&self) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = guard.as_mut() {
            subscribers.push(tx);
        }
        rx
    }

    fn close(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_closed(&self) -> bool {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// One endpoint of a paired channel.
#[derive(Debug, Clone)]
pub struct PairedEndpoint {
    local: RealmId,
    peer: RealmId,
    inbox: Arc<Mailbox>,
    outbox: Arc<Mailbox>,
}

impl PairedEndpoint {
    /// Creates two connected endpoints. The first belongs to realm `a`, the
    /// second to realm `b`.
    pub fn pair(a: RealmId, b: RealmId) -> (Self, Self) {
        let a_inbox = Mailbox::new();
        let b_inbox = Mailbox::new();

        let end_a = Self {
            local: a,
            peer: b,
            inbox: Arc::clone(&a_inbox),
            outbox: Arc::clone(&b_inbox),
        };
        let end_b = Self {
            local: b,
            peer: a,
            inbox: b_inbox,
            outbox: a_inbox,
        };
        (end_a, end_b)
    }

    /// Dispatches an envelope into this endpoint's own inbox without a source,
    /// as a realm does when it messages itself.
    pub fn dispatch_local(&self, envelope: Envelope) -> MessengerResult<()> {
        self.inbox.deliver(Delivery {
            source: None,
            envelope,
        })
    }

    /// Injects an envelope into this endpoint's inbox as if posted by `source`.
    pub fn inject(&self, source: RealmId, envelope: Envelope) -> MessengerResult<()> {
        self.inbox.deliver(Delivery {
            source: Some(source),
            envelope,
        })
    }

    /// Closes both directions. Subscribers observe the close and pending
    /// requests on either side fail.
    pub fn close(&self) {
        self.inbox.close();
        self.outbox.close();
    }
}

impl Channel for PairedEndpoint {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Paired
    }

    fn local_id(&self) -> RealmId {
        self.local
    }

    fn peer_id(&self) -> Option<RealmId> {
        Some(self.peer)
    }

    fn post(&self, envelope: Envelope) -> MessengerResult<()> {
        if self.inbox.is_closed() {
            return Err(MessengerError::ChannelClosed);
        }
        self.outbox.deliver(Delivery {
            source: Some(self.local),
            envelope,
        })
    }

    fn subscribe(&self) -> Inbox {
        self.inbox.subscribe()
    }

    fn is_closed(&self) -> bool {
        self.inbox.is_closed() || self.outbox.is_closed()
    }
}

/// A named broadcast group.
#[derive(Debug, Clone)]
pub struct GroupChannel {
    name: String,
    hub: Arc<Mailbox>,
}

impl GroupChannel {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hub: Mailbox::new(),
        }
    }

    /// The group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Joins the group as a new member realm.
    pub fn join(&self) -> GroupMember {
        self.join_as(RealmId::new())
    }

    /// Joins the group as an existing realm.
    pub fn join_as(&self, id: RealmId) -> GroupMember {
        GroupMember {
            id,
            hub: Arc::clone(&self.hub),
        }
    }

    /// Closes the group for every member.
    pub fn close(&self) {
        self.hub.close();
    }
}

/// One member's view of a [`GroupChannel`].
#[derive(Debug, Clone)]
pub struct GroupMember {
    id: RealmId,
    hub: Arc<Mailbox>,
}

impl Channel for GroupMember {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Group
    }

    fn local_id(&self) -> RealmId {
        self.id
    }

    fn peer_id(&self) -> Option<RealmId> {
        None
    }

    fn post(&self, envelope: Envelope) -> MessengerResult<()> {
        self.hub.deliver(Delivery {
            source: Some(self.id),
            envelope,
        })
    }

    fn subscribe(&self) -> Inbox {
        self.hub.subscribe()
    }

    fn is_closed(&self) -> bool {
        self.hub.is_closed()
    }
}
