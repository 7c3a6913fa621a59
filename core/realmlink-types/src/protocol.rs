//! Protocol surfaces and their payload shapes.
//!
//! Each message kind is described by a zero-sized marker type implementing
//! [`Rpc`] (request with a reply) or [`Notification`] (no reply). The
//! messenger uses these to encode outgoing payloads and decode incoming
//! ones, so a kind can never be paired with the wrong payload shape.

use crate::MessageKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A request/response surface.
pub trait Rpc: Send + Sync + 'static {
    /// Wire kind of the request.
    const KIND: MessageKind;
    /// Request payload.
    type Request: Serialize + DeserializeOwned + Send + 'static;
    /// Response payload.
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// A fire-and-forget surface.
pub trait Notification: Send + Sync + 'static {
    /// Wire kind of the notification.
    const KIND: MessageKind;
    /// Notification payload.
    type Payload: Serialize + DeserializeOwned + Send + 'static;
}

/// Handshake probe exchanged on paired channels. Payloads are `null`.
#[derive(Debug, Clone, Copy)]
pub struct Handshake;

impl Rpc for Handshake {
    const KIND: MessageKind = MessageKind::Handshake;
    type Request = ();
    type Response = ();
}

/// Virtual resource lookup.
#[derive(Debug, Clone, Copy)]
pub struct FileRequest;

impl Rpc for FileRequest {
    const KIND: MessageKind = MessageKind::FileRequest;
    type Request = FileRequestPayload;
    type Response = FileReply;
}

/// Body of a `fileRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequestPayload {
    /// Absolute resource path, e.g. `/file/index.html`.
    pub path: String,
}

/// Reply to a `fileRequest`. A `None` body is the not-found marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReply {
    pub body: Option<Vec<u8>>,
}

impl FileReply {
    /// A reply carrying the resource body.
    pub fn found(body: Vec<u8>) -> Self {
        Self { body: Some(body) }
    }

    /// The not-found marker.
    pub fn not_found() -> Self {
        Self { body: None }
    }
}

/// Run one named test inside a sandbox.
#[derive(Debug, Clone, Copy)]
pub struct Run;

impl Rpc for Run {
    const KIND: MessageKind = MessageKind::Run;
    type Request = RunRequest;
    type Response = RunOutcome;
}

/// Body of a `run` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Test name (a file name inside the suite).
    pub name: String,
}

/// Result of one test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Whether the test passed.
    pub ok: bool,
    /// Whether the sandbox must be reloaded before the next test.
    #[serde(default)]
    pub refresh: bool,
}

impl RunOutcome {
    /// A passing outcome that leaves the sandbox reusable.
    pub fn pass() -> Self {
        Self {
            ok: true,
            refresh: false,
        }
    }

    /// A failing outcome.
    pub fn fail() -> Self {
        Self {
            ok: false,
            refresh: false,
        }
    }

    /// Requests a sandbox reload before the next test.
    pub fn with_refresh(mut self) -> Self {
        self.refresh = true;
        self
    }
}

/// Console line forwarded from a sandbox.
#[derive(Debug, Clone, Copy)]
pub struct Log;

impl Rpc for Log {
    const KIND: MessageKind = MessageKind::Log;
    type Request = LogRecord;
    type Response = ();
}

/// Body of a `log` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub message: String,
}

/// Uncaught error forwarded from a sandbox.
#[derive(Debug, Clone, Copy)]
pub struct ReportError;

impl Rpc for ReportError {
    const KIND: MessageKind = MessageKind::Error;
    type Request = ErrorReport;
    type Response = ();
}

/// Body of an `error` message. Location fields are absent for rejected
/// promises and other errors without a source position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
}

impl ErrorReport {
    /// An error without a source location.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            src: None,
            line: None,
            column: None,
            message: message.into(),
        }
    }

    /// An error at a source location.
    pub fn at(src: impl Into<String>, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            line: Some(line),
            column: Some(column),
            message: message.into(),
        }
    }
}

/// File server availability broadcast.
#[derive(Debug, Clone, Copy)]
pub struct Listen;

impl Notification for Listen {
    const KIND: MessageKind = MessageKind::Listen;
    type Payload = ListenState;
}

/// Body of a `listen` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenState {
    pub listening: bool,
}
