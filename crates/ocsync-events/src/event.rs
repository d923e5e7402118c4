//! Typed events decoded from the server's event stream.
//!
//! Each wire record is `{"type": <name>, "properties": {...}}`. The name
//! selects the payload shape; names outside the known set decode to
//! [`Event::Unknown`], which carries the raw record for diagnostics and never
//! mutates state.

use std::fmt;

use ocsync_core::{DecodeError, Message, Part, Session, SessionError, SessionStatus};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;

/// Wire names of the known events.
pub mod names {
    pub const SERVER_CONNECTED: &str = "server.connected";
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_UPDATED: &str = "session.updated";
    pub const MESSAGE_CREATED: &str = "message.created";
    pub const MESSAGE_UPDATED: &str = "message.updated";
    pub const MESSAGE_PART_UPDATED: &str = "message.part.updated";
    pub const MESSAGE_PART_REMOVED: &str = "message.part.removed";
    pub const SESSION_STATUS: &str = "session.status";
    pub const SESSION_IDLE: &str = "session.idle";
    pub const SESSION_ERROR: &str = "session.error";
}

/// One record as yielded by the transport: an event name and its JSON bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub name: String,
    pub data: Vec<u8>,
    /// Transport-assigned record id, when the transport provides one
    pub id: Option<String>,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The record id read as a sequence number, when it is numeric.
    pub fn sequence(&self) -> Option<u64> {
        self.id.as_deref().and_then(|id| id.trim().parse().ok())
    }

    /// Decode into a typed event, attaching the sequence number to part updates.
    pub fn decode(&self) -> Result<Event, DecodeError> {
        let mut event = decode_event(&self.name, &self.data)?;
        if let Event::PartUpdated(update) = &mut event {
            update.sequence = self.sequence();
        }
        Ok(event)
    }
}

/// Discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ServerConnected,
    SessionCreated,
    SessionUpdated,
    MessageCreated,
    MessageUpdated,
    MessagePartUpdated,
    MessagePartRemoved,
    SessionStatus,
    SessionIdle,
    SessionError,
    Unknown,
}

impl EventKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            names::SERVER_CONNECTED => EventKind::ServerConnected,
            names::SESSION_CREATED => EventKind::SessionCreated,
            names::SESSION_UPDATED => EventKind::SessionUpdated,
            names::MESSAGE_CREATED => EventKind::MessageCreated,
            names::MESSAGE_UPDATED => EventKind::MessageUpdated,
            names::MESSAGE_PART_UPDATED => EventKind::MessagePartUpdated,
            names::MESSAGE_PART_REMOVED => EventKind::MessagePartRemoved,
            names::SESSION_STATUS => EventKind::SessionStatus,
            names::SESSION_IDLE => EventKind::SessionIdle,
            names::SESSION_ERROR => EventKind::SessionError,
            _ => EventKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ServerConnected => names::SERVER_CONNECTED,
            EventKind::SessionCreated => names::SESSION_CREATED,
            EventKind::SessionUpdated => names::SESSION_UPDATED,
            EventKind::MessageCreated => names::MESSAGE_CREATED,
            EventKind::MessageUpdated => names::MESSAGE_UPDATED,
            EventKind::MessagePartUpdated => names::MESSAGE_PART_UPDATED,
            EventKind::MessagePartRemoved => names::MESSAGE_PART_REMOVED,
            EventKind::SessionStatus => names::SESSION_STATUS,
            EventKind::SessionIdle => names::SESSION_IDLE,
            EventKind::SessionError => names::SESSION_ERROR,
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `properties` of session events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionInfo {
    pub info: Session,
}

/// `properties` of message events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageInfo {
    pub info: Message,
}

/// `properties` of `message.part.updated`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartUpdated {
    /// The part with its text at the latest known value
    pub part: Part,
    /// Incremental text fragment to append, when streaming
    #[serde(default)]
    pub delta: Option<String>,
    /// Sequence number from the transport record, if any
    #[serde(skip)]
    pub sequence: Option<u64>,
}

/// `properties` of `message.part.removed`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PartRemoved {
    #[serde(rename = "sessionID", default)]
    pub session_id: Option<String>,
    #[serde(rename = "messageID", default)]
    pub message_id: Option<String>,
    #[serde(rename = "partID")]
    pub part_id: String,
}

/// `properties` of `session.status`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusChanged {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub status: SessionStatus,
}

/// `properties` of `session.idle`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionIdle {
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

/// `properties` of `session.error`. The session may be absent for
/// server-wide errors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorReported {
    #[serde(rename = "sessionID", default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<SessionError>,
}

/// An event name outside the known set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEvent {
    pub name: String,
    pub payload: Vec<u8>,
}

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ServerConnected,
    SessionCreated(SessionInfo),
    SessionUpdated(SessionInfo),
    MessageCreated(MessageInfo),
    MessageUpdated(MessageInfo),
    PartUpdated(PartUpdated),
    PartRemoved(PartRemoved),
    SessionStatus(StatusChanged),
    SessionIdle(SessionIdle),
    SessionError(ErrorReported),
    Unknown(UnknownEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ServerConnected => EventKind::ServerConnected,
            Event::SessionCreated(_) => EventKind::SessionCreated,
            Event::SessionUpdated(_) => EventKind::SessionUpdated,
            Event::MessageCreated(_) => EventKind::MessageCreated,
            Event::MessageUpdated(_) => EventKind::MessageUpdated,
            Event::PartUpdated(_) => EventKind::MessagePartUpdated,
            Event::PartRemoved(_) => EventKind::MessagePartRemoved,
            Event::SessionStatus(_) => EventKind::SessionStatus,
            Event::SessionIdle(_) => EventKind::SessionIdle,
            Event::SessionError(_) => EventKind::SessionError,
            Event::Unknown(_) => EventKind::Unknown,
        }
    }

    /// Wire name of the event; unknown events report the name they arrived with.
    pub fn name(&self) -> &str {
        match self {
            Event::Unknown(unknown) => &unknown.name,
            other => other.kind().as_str(),
        }
    }

    /// The session the event concerns, when it names one.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Event::SessionCreated(p) | Event::SessionUpdated(p) => Some(&p.info.id),
            Event::MessageCreated(p) | Event::MessageUpdated(p) => Some(&p.info.session_id),
            Event::PartUpdated(p) => p.part.session_id.as_deref(),
            Event::PartRemoved(p) => p.session_id.as_deref(),
            Event::SessionStatus(p) => Some(&p.session_id),
            Event::SessionIdle(p) => Some(&p.session_id),
            Event::SessionError(p) => p.session_id.as_deref(),
            Event::ServerConnected | Event::Unknown(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct Envelope<P> {
    properties: P,
}

#[derive(Deserialize)]
struct EnvelopeType {
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn properties<P: DeserializeOwned>(payload: &[u8]) -> Result<P, DecodeError> {
    let envelope: Envelope<P> = serde_json::from_slice(payload)?;
    Ok(envelope.properties)
}

/// Decode a stream record given its event name and JSON payload.
///
/// Malformed payloads for known names are structural errors. Unknown names
/// never fail: they decode to [`Event::Unknown`] with the raw bytes.
pub fn decode_event(name: &str, payload: &[u8]) -> Result<Event, DecodeError> {
    let event = match EventKind::from_name(name) {
        EventKind::ServerConnected => {
            if !payload.is_empty() {
                serde_json::from_slice::<IgnoredAny>(payload)?;
            }
            Event::ServerConnected
        }
        EventKind::SessionCreated => Event::SessionCreated(properties(payload)?),
        EventKind::SessionUpdated => Event::SessionUpdated(properties(payload)?),
        EventKind::MessageCreated => Event::MessageCreated(properties(payload)?),
        EventKind::MessageUpdated => Event::MessageUpdated(properties(payload)?),
        EventKind::MessagePartUpdated => Event::PartUpdated(properties(payload)?),
        EventKind::MessagePartRemoved => Event::PartRemoved(properties(payload)?),
        EventKind::SessionStatus => Event::SessionStatus(properties(payload)?),
        EventKind::SessionIdle => Event::SessionIdle(properties(payload)?),
        EventKind::SessionError => Event::SessionError(properties(payload)?),
        EventKind::Unknown => Event::Unknown(UnknownEvent {
            name: name.to_owned(),
            payload: payload.to_vec(),
        }),
    };
    Ok(event)
}

/// Decode a self-describing record, reading the event name from its `type` field.
pub fn decode_envelope(payload: &[u8]) -> Result<Event, DecodeError> {
    let envelope: EnvelopeType = serde_json::from_slice(payload)?;
    let name = envelope.kind.ok_or(DecodeError::MissingField("type"))?;
    decode_event(&name, payload)
}
