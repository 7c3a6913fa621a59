//! Request/response messaging between realms.
//!
//! A [`Messenger`] turns a raw, unordered [`Channel`] into correlated
//! request/response exchanges:
//!
//! ```text
//! sandbox                               host
//!   | -- {kind: "fileRequest", id} -->   |
//!   |                                    | respond_to::<FileRequest>
//!   | <-- {kind: null, id, payload} --   |
//! ```
//!
//! Paired channels perform a handshake before the first request; group
//! channels are usable immediately.

pub mod channel;
pub mod console;
mod error;
mod messenger;

pub use channel::{
    Channel, ChannelKind, Delivery, GroupChannel, GroupMember, Inbox, PairedEndpoint,
};
pub use console::{ConsoleCollector, ConsoleEntry, ConsoleReporter};
pub use error::{MessengerError, MessengerResult};
pub use messenger::{ConnectionState, Messenger, MessengerConfig, Registration};
