//! The wire envelope shared by every protocol surface.
//!
//! On the wire a message is `{kind, correlationId, payload}`. A `null` kind
//! marks a response to an earlier request with the same correlation id.

use crate::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Closed set of message kinds understood by realmlink.
///
/// Kinds not listed here decode to [`MessageKind::Unknown`] so newer peers
/// can add kinds without breaking older ones; unknown kinds are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    /// Connection probe on paired channels.
    Handshake,
    /// Sandbox asks the privileged realm for a virtual resource.
    FileRequest,
    /// Orchestrator asks a sandbox to run one named test.
    Run,
    /// Sandbox forwards a console line.
    Log,
    /// Sandbox forwards an uncaught error.
    Error,
    /// File server availability broadcast.
    Listen,
    /// Any kind this build does not know.
    #[serde(other)]
    Unknown,
}

impl MessageKind {
    /// The wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Handshake => "handshake",
            MessageKind::FileRequest => "fileRequest",
            MessageKind::Run => "run",
            MessageKind::Log => "log",
            MessageKind::Error => "error",
            MessageKind::Listen => "listen",
            MessageKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Request or notification kind; `None` for responses.
    pub kind: Option<MessageKind>,
    /// Correlation id pairing requests and responses.
    pub correlation_id: CorrelationId,
    /// Kind-specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Creates a request or notification envelope.
    pub fn request(kind: MessageKind, correlation_id: CorrelationId, payload: Value) -> Self {
        Self {
            kind: Some(kind),
            correlation_id,
            payload,
        }
    }

    /// Creates a response envelope for the given correlation id.
    pub fn response(correlation_id: CorrelationId, payload: Value) -> Self {
        Self {
            kind: None,
            correlation_id,
            payload,
        }
    }

    /// Whether this envelope answers an earlier request.
    pub fn is_response(&self) -> bool {
        self.kind.is_none()
    }

    /// Encodes the envelope as JSON text.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes an envelope from JSON text.
    pub fn from_json(s: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

const ERROR_KEY: &str = "$error";

#[derive(Serialize, Deserialize)]
struct ErrorMarker {
    message: String,
}

/// Builds a response payload flagging that the remote handler failed.
pub fn error_payload(message: impl Into<String>) -> Value {
    let marker = ErrorMarker {
        message: message.into(),
    };
    let mut map = serde_json::Map::new();
    map.insert(
        ERROR_KEY.to_string(),
        serde_json::to_value(marker).unwrap_or(Value::Null),
    );
    Value::Object(map)
}

/// Returns the failure message when `payload` is an error marker.
pub fn error_marker(payload: &Value) -> Option<String> {
    let map = payload.as_object()?;
    if map.len() != 1 {
        return None;
    }
    let marker: ErrorMarker = serde_json::from_value(map.get(ERROR_KEY)?.clone()).ok()?;
    Some(marker.message)
}
