//! Session, message and status records as the server sends them.
//!
//! Field names follow the server's camelCase convention. Timestamps are
//! milliseconds since the Unix epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::part::Part;

/// Convert a millisecond timestamp into a UTC datetime.
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// A conversation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "projectID", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<SessionTime>,
    /// Owning session when this is a sub-session
    #[serde(
        rename = "parentID",
        alias = "parent_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ShareInfo>,
}

impl Session {
    /// Create a bare session record, as a local create call would.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            version: None,
            project_id: None,
            directory: None,
            time: None,
            parent_id: None,
            share: None,
        }
    }

    /// Last-updated timestamp in milliseconds, if known.
    pub fn updated_millis(&self) -> Option<i64> {
        self.time.as_ref().map(|t| t.updated)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.time.as_ref().and_then(|t| millis_to_datetime(t.created))
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.time.as_ref().and_then(|t| millis_to_datetime(t.updated))
    }

    pub fn share_url(&self) -> Option<&str> {
        self.share.as_ref().and_then(|s| s.url.as_deref())
    }

    pub fn is_subsession(&self) -> bool {
        self.parent_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTime {
    pub created: i64,
    pub updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A message in a session. Its parts are tracked separately by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<MessageTime>,
    #[serde(rename = "parentID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(rename = "modelID", default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<MessagePath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Tokens>,
    /// Finish reason reported by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<String>,
}

impl Message {
    /// Create a message with only the required fields set.
    pub fn new(id: impl Into<String>, session_id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            role,
            time: None,
            parent_id: None,
            model_id: None,
            provider_id: None,
            mode: None,
            agent: None,
            path: None,
            cost: None,
            tokens: None,
            finish: None,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.time.as_ref().and_then(|t| millis_to_datetime(t.created))
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.time
            .as_ref()
            .and_then(|t| t.completed)
            .and_then(millis_to_datetime)
    }

    pub fn is_completed(&self) -> bool {
        self.time.as_ref().is_some_and(|t| t.completed.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTime {
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePath {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

/// Token accounting shared by messages and step parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheTokens>,
}

impl Tokens {
    /// Input plus output plus reasoning, treating absent counts as zero.
    pub fn total(&self) -> u64 {
        self.input.unwrap_or(0) + self.output.unwrap_or(0) + self.reasoning.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<u64>,
}

/// A message together with its parts, as returned by the REST layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageWithParts {
    pub info: Message,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Coarse activity state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatusKind {
    Idle,
    Busy,
    Retry,
}

/// Transient per-session status, delivered only through status events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    #[serde(rename = "type")]
    pub kind: SessionStatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the next retry fires, in milliseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<i64>,
}

impl SessionStatus {
    pub fn idle() -> Self {
        Self {
            kind: SessionStatusKind::Idle,
            attempt: None,
            message: None,
            next: None,
        }
    }

    pub fn busy() -> Self {
        Self {
            kind: SessionStatusKind::Busy,
            ..Self::idle()
        }
    }

    pub fn retry(attempt: u32, message: impl Into<String>) -> Self {
        Self {
            kind: SessionStatusKind::Retry,
            attempt: Some(attempt),
            message: Some(message.into()),
            next: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.kind == SessionStatusKind::Idle
    }

    /// Whether moving from `self` to `next` goes backwards.
    ///
    /// Only a retry whose attempt counter drops counts as a regression.
    pub fn regresses_to(&self, next: &SessionStatus) -> bool {
        match (self.kind, next.kind) {
            (SessionStatusKind::Retry, SessionStatusKind::Retry) => {
                matches!((self.attempt, next.attempt), (Some(current), Some(incoming)) if incoming < current)
            }
            _ => false,
        }
    }
}

/// Structured error reported for a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SessionErrorData>,
}

impl SessionError {
    pub fn message(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.message.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
