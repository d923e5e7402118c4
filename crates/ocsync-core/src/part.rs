//! Message parts: the tagged union the server emits for message content.
//!
//! Every part record carries a `type` discriminant. Decoding dispatches once on
//! that string; a discriminant this crate does not know becomes
//! [`PartKind::Unknown`], keeping only the identity fields so the part can
//! still be tracked. Encoding writes the discriminant first, then the identity
//! fields, then the kind-specific payload.

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::Value;

use crate::error::DecodeError;
use crate::model::Tokens;
use crate::value::{DynamicValue, ValueMap};

/// Wire discriminants for the known part kinds.
pub mod discriminant {
    pub const TEXT: &str = "text";
    pub const TOOL: &str = "tool";
    pub const REASONING: &str = "reasoning";
    pub const FILE: &str = "file";
    pub const STEP_START: &str = "step-start";
    pub const STEP_FINISH: &str = "step-finish";
    pub const SNAPSHOT: &str = "snapshot";
    pub const PATCH: &str = "patch";
    pub const AGENT: &str = "agent";
    pub const SUBTASK: &str = "subtask";
    pub const RETRY: &str = "retry";
    pub const COMPACTION: &str = "compaction";
}

/// The smallest unit of message content.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Globally unique part id
    pub id: String,
    /// Owning session
    pub session_id: Option<String>,
    /// Owning message
    pub message_id: Option<String>,
    /// Timing shared by all known kinds
    pub time: Option<PartTime>,
    /// Kind-specific payload
    pub kind: PartKind,
}

/// Kind-specific part payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PartKind {
    Text(TextPart),
    Tool(ToolPart),
    Reasoning(ReasoningPart),
    File(FilePart),
    StepStart(StepPart),
    StepFinish(StepPart),
    Snapshot,
    Patch,
    Agent(AgentPart),
    Subtask(SubtaskPart),
    Retry(RetryPart),
    Compaction,
    /// A discriminant this crate does not recognise
    Unknown { discriminant: String },
}

impl PartKind {
    /// The wire discriminant for this kind.
    pub fn discriminant(&self) -> &str {
        match self {
            PartKind::Text(_) => discriminant::TEXT,
            PartKind::Tool(_) => discriminant::TOOL,
            PartKind::Reasoning(_) => discriminant::REASONING,
            PartKind::File(_) => discriminant::FILE,
            PartKind::StepStart(_) => discriminant::STEP_START,
            PartKind::StepFinish(_) => discriminant::STEP_FINISH,
            PartKind::Snapshot => discriminant::SNAPSHOT,
            PartKind::Patch => discriminant::PATCH,
            PartKind::Agent(_) => discriminant::AGENT,
            PartKind::Subtask(_) => discriminant::SUBTASK,
            PartKind::Retry(_) => discriminant::RETRY,
            PartKind::Compaction => discriminant::COMPACTION,
            PartKind::Unknown { discriminant } => discriminant,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextPart {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthetic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReasoningPart {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolPart {
    #[serde(rename = "callID", default, deserialize_with = "null_as_default")]
    pub call_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: ToolState,
}

/// Lifecycle of a tool invocation.
///
/// Statuses newer than this crate decode as [`ToolStatus::Unknown`] and are
/// written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ToolStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
    Unknown(String),
}

impl ToolStatus {
    /// Position in the lattice. Unknown statuses have none.
    fn rank(&self) -> Option<u8> {
        match self {
            ToolStatus::Pending => Some(0),
            ToolStatus::Running => Some(1),
            ToolStatus::Completed | ToolStatus::Error => Some(2),
            ToolStatus::Unknown(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolStatus::Completed | ToolStatus::Error)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ToolStatus::Unknown(_))
    }

    /// Forward-only lattice: pending → running → completed | error.
    /// Terminal states only accept themselves. Moves into or out of an
    /// unknown status are always allowed since they cannot be ordered.
    pub fn can_transition_to(&self, next: &ToolStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(_), Some(_)) if self.is_terminal() => next == self,
            (Some(current), Some(incoming)) => incoming >= current,
            _ => true,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ToolStatus::Pending => "pending",
            ToolStatus::Running => "running",
            ToolStatus::Completed => "completed",
            ToolStatus::Error => "error",
            ToolStatus::Unknown(raw) => raw,
        }
    }
}

impl From<String> for ToolStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => ToolStatus::Pending,
            "running" => ToolStatus::Running,
            "completed" => ToolStatus::Completed,
            "error" => ToolStatus::Error,
            _ => ToolStatus::Unknown(raw),
        }
    }
}

impl From<ToolStatus> for String {
    fn from(status: ToolStatus) -> Self {
        match status {
            ToolStatus::Unknown(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolState {
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ValueMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ValueMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<ToolTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<FileAttachment>>,
}

/// Input keys that best summarise a tool call, most specific first.
const SUMMARY_KEYS: [&str; 6] = ["filePath", "path", "pattern", "command", "query", "description"];

impl ToolState {
    pub fn with_status(status: ToolStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Pending or running.
    pub fn is_running(&self) -> bool {
        matches!(self.status, ToolStatus::Pending | ToolStatus::Running)
    }

    pub fn is_completed(&self) -> bool {
        self.status == ToolStatus::Completed
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    /// One-line summary of the tool input, e.g. the file path or command.
    pub fn input_summary(&self) -> Option<String> {
        let input = self.input.as_ref()?;
        if let Some(value) = SUMMARY_KEYS.iter().find_map(|key| input.get(*key)) {
            return Some(value.to_display_string());
        }
        input
            .values()
            .map(DynamicValue::to_display_string)
            .find(|s| !s.is_empty() && s != "null")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ToolTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compacted: Option<i64>,
}

/// File produced by a tool. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileAttachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "messageID", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FilePart {
    #[serde(default, deserialize_with = "null_as_default")]
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
}

/// Payload shared by `step-start` and `step-finish`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Tokens>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AgentPart {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubtaskPart {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Agent the work is delegated to
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RetryPart {
    #[serde(default, deserialize_with = "null_as_default")]
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PartError>,
}

/// Error attached to a retry part: a name plus a message and status code.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PartErrorData>,
}

impl PartError {
    pub fn new(name: impl Into<String>, message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            name: Some(name.into()),
            data: Some(PartErrorData {
                message: Some(message.into()),
                status_code,
            }),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.message.as_deref())
    }

    pub fn status_code(&self) -> Option<u16> {
        self.data.as_ref().and_then(|d| d.status_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "statusCode", default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl Part {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        kind: PartKind,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: Some(session_id.into()),
            message_id: Some(message_id.into()),
            time: None,
            kind,
        }
    }

    /// Convenience constructor for a text part.
    pub fn text_part(
        id: impl Into<String>,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            session_id,
            message_id,
            PartKind::Text(TextPart {
                text: text.into(),
                ..TextPart::default()
            }),
        )
    }

    /// Decode a part from JSON bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(&value)
    }

    /// Decode a part from an already-parsed JSON value.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let object = value
            .as_object()
            .ok_or_else(|| DecodeError::invalid("part", "expected a JSON object"))?;

        let id = match object.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => return Err(DecodeError::invalid("id", format!("expected a string, got {}", other))),
            None => return Err(DecodeError::MissingField("id")),
        };
        let session_id = optional_string(object, "sessionID");
        let message_id = optional_string(object, "messageID");
        let tag = object.get("type").and_then(Value::as_str).unwrap_or_default();

        let kind = match tag {
            discriminant::TEXT => PartKind::Text(TextPart::deserialize(value)?),
            discriminant::TOOL => PartKind::Tool(ToolPart::deserialize(value)?),
            discriminant::REASONING => PartKind::Reasoning(ReasoningPart::deserialize(value)?),
            discriminant::FILE => PartKind::File(FilePart::deserialize(value)?),
            discriminant::STEP_START => PartKind::StepStart(StepPart::deserialize(value)?),
            discriminant::STEP_FINISH => PartKind::StepFinish(StepPart::deserialize(value)?),
            discriminant::SNAPSHOT => PartKind::Snapshot,
            discriminant::PATCH => PartKind::Patch,
            discriminant::AGENT => PartKind::Agent(AgentPart::deserialize(value)?),
            discriminant::SUBTASK => PartKind::Subtask(SubtaskPart::deserialize(value)?),
            discriminant::RETRY => PartKind::Retry(RetryPart::deserialize(value)?),
            discriminant::COMPACTION => PartKind::Compaction,
            other => {
                return Ok(Part {
                    id,
                    session_id,
                    message_id,
                    time: None,
                    kind: PartKind::Unknown {
                        discriminant: other.to_owned(),
                    },
                })
            }
        };

        let time = match object.get("time") {
            None | Some(Value::Null) => None,
            Some(time) => Some(PartTime::deserialize(time)?),
        };

        Ok(Part {
            id,
            session_id,
            message_id,
            time,
            kind,
        })
    }

    /// Encode the part as JSON bytes, discriminant first.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn discriminant(&self) -> &str {
        self.kind.discriminant()
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.kind, PartKind::Unknown { .. })
    }

    /// Body of a text or reasoning part.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            PartKind::Text(p) => Some(&p.text),
            PartKind::Reasoning(p) => Some(&p.text),
            _ => None,
        }
    }

    /// Mutable body of a text or reasoning part.
    pub fn text_mut(&mut self) -> Option<&mut String> {
        match &mut self.kind {
            PartKind::Text(p) => Some(&mut p.text),
            PartKind::Reasoning(p) => Some(&mut p.text),
            _ => None,
        }
    }

    pub fn tool(&self) -> Option<&ToolPart> {
        match &self.kind {
            PartKind::Tool(tool) => Some(tool),
            _ => None,
        }
    }

    pub fn tool_status(&self) -> Option<ToolStatus> {
        self.tool().map(|t| t.state.status.clone())
    }

    fn envelope<'a, T: Serialize>(&'a self, payload: &'a T) -> Envelope<'a, T> {
        Envelope {
            discriminant: self.kind.discriminant(),
            id: &self.id,
            session_id: self.session_id.as_deref(),
            message_id: self.message_id.as_deref(),
            time: self.time.as_ref(),
            payload,
        }
    }
}

fn optional_string(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Servers send `null` for fields they have not filled in yet; read it as the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Wire layout of an encoded part.
#[derive(serde::Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    discriminant: &'a str,
    id: &'a str,
    #[serde(rename = "sessionID", skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(rename = "messageID", skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<&'a PartTime>,
    #[serde(flatten)]
    payload: &'a T,
}

/// Payload for kinds that carry nothing beyond identity.
#[derive(serde::Serialize)]
struct Marker {}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.kind {
            PartKind::Text(p) => self.envelope(p).serialize(serializer),
            PartKind::Tool(p) => self.envelope(p).serialize(serializer),
            PartKind::Reasoning(p) => self.envelope(p).serialize(serializer),
            PartKind::File(p) => self.envelope(p).serialize(serializer),
            PartKind::StepStart(p) | PartKind::StepFinish(p) => {
                self.envelope(p).serialize(serializer)
            }
            PartKind::Agent(p) => self.envelope(p).serialize(serializer),
            PartKind::Subtask(p) => self.envelope(p).serialize(serializer),
            PartKind::Retry(p) => self.envelope(p).serialize(serializer),
            PartKind::Snapshot
            | PartKind::Patch
            | PartKind::Compaction
            | PartKind::Unknown { .. } => self.envelope(&Marker {}).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Part::from_value(&value).map_err(|e| match e {
            // the outer deserializer adds its own context
            DecodeError::Json(inner) => de::Error::custom(inner),
            other => de::Error::custom(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CacheTokens;

    fn round_trip(part: Part) {
        let bytes = part.encode().unwrap();
        let decoded = Part::decode(&bytes).unwrap();
        assert_eq!(decoded, part, "round trip of {}", String::from_utf8_lossy(&bytes));
    }

    fn with_kind(kind: PartKind) -> Part {
        Part::new("prt_1", "ses_1", "msg_1", kind)
    }

    #[test]
    fn test_round_trip_every_known_kind() {
        let mut input = ValueMap::new();
        input.insert("command".to_string(), "cargo test".into());
        input.insert("timeout".to_string(), DynamicValue::Int(60));

        let tokens = Tokens {
            input: Some(120),
            output: Some(40),
            reasoning: None,
            cache: Some(CacheTokens {
                read: Some(9),
                write: None,
            }),
        };

        let kinds = vec![
            PartKind::Text(TextPart {
                text: "hello".to_string(),
                synthetic: Some(true),
                ignored: None,
            }),
            PartKind::Tool(ToolPart {
                call_id: "call_1".to_string(),
                tool: "bash".to_string(),
                state: ToolState {
                    status: ToolStatus::Completed,
                    input: Some(input),
                    output: Some("ok".to_string()),
                    title: Some("Run tests".to_string()),
                    error: None,
                    metadata: Some(ValueMap::new()),
                    time: Some(ToolTime {
                        start: Some(1),
                        end: Some(2),
                        compacted: None,
                    }),
                    attachments: Some(vec![FileAttachment {
                        mime: Some("image/png".to_string()),
                        url: Some("data:image/png;base64,AA==".to_string()),
                        ..FileAttachment::default()
                    }]),
                },
            }),
            PartKind::Reasoning(ReasoningPart {
                text: "thinking".to_string(),
            }),
            PartKind::File(FilePart {
                mime: "text/plain".to_string(),
                filename: Some("notes.txt".to_string()),
                url: "file:///tmp/notes.txt".to_string(),
            }),
            PartKind::StepStart(StepPart {
                snapshot: Some("abc123".to_string()),
                ..StepPart::default()
            }),
            PartKind::StepFinish(StepPart {
                snapshot: None,
                reason: Some("tool-calls".to_string()),
                cost: Some(0.0042),
                tokens: Some(tokens),
            }),
            PartKind::Snapshot,
            PartKind::Patch,
            PartKind::Agent(AgentPart {
                name: "build".to_string(),
            }),
            PartKind::Subtask(SubtaskPart {
                prompt: "find the bug".to_string(),
                description: "investigate".to_string(),
                agent: "general".to_string(),
            }),
            PartKind::Retry(RetryPart {
                attempt: 2,
                error: Some(PartError::new("APIError", "overloaded", Some(529))),
            }),
            PartKind::Compaction,
        ];

        for kind in kinds {
            round_trip(with_kind(kind));
        }
    }

    #[test]
    fn test_round_trip_keeps_time_and_missing_owner_ids() {
        let mut part = with_kind(PartKind::Text(TextPart::default()));
        part.time = Some(PartTime {
            start: Some(5),
            end: None,
            created: Some(4),
        });
        part.session_id = None;
        round_trip(part);
    }

    #[test]
    fn test_encode_writes_discriminant_first() {
        let part = with_kind(PartKind::Agent(AgentPart {
            name: "plan".to_string(),
        }));
        let encoded = String::from_utf8(part.encode().unwrap()).unwrap();
        assert!(encoded.starts_with(r#"{"type":"agent","id":"prt_1""#), "{}", encoded);
    }

    #[test]
    fn test_unknown_discriminant_preserves_identity() {
        let json = br#"{
            "type": "brand-new-kind",
            "id": "prt_9",
            "sessionID": "ses_9",
            "messageID": "msg_9",
            "text": {"not": "a string"},
            "time": "whenever"
        }"#;
        let part = Part::decode(json).unwrap();
        assert!(part.is_unknown());
        assert_eq!(part.discriminant(), "brand-new-kind");
        assert_eq!(part.id, "prt_9");
        assert_eq!(part.session_id.as_deref(), Some("ses_9"));
        assert_eq!(part.message_id.as_deref(), Some("msg_9"));

        let again = Part::decode(&part.encode().unwrap()).unwrap();
        assert_eq!(again, part);
    }

    #[test]
    fn test_missing_discriminant_is_unknown() {
        let part = Part::decode(br#"{"id":"prt_1"}"#).unwrap();
        assert_eq!(part.kind, PartKind::Unknown { discriminant: String::new() });
    }

    #[test]
    fn test_missing_id_is_structural_error() {
        let err = Part::decode(br#"{"type":"text","text":"hi"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("id")));
    }

    #[test]
    fn test_malformed_bytes_are_structural_error() {
        assert!(matches!(Part::decode(b"{\"id\":"), Err(DecodeError::Json(_))));
        assert!(matches!(Part::decode(b"[1,2]"), Err(DecodeError::InvalidField { .. })));
    }

    #[test]
    fn test_decode_server_tool_part() {
        let json = br#"{
            "id": "prt_2", "sessionID": "ses_1", "messageID": "msg_1",
            "type": "tool", "callID": "toolu_01", "tool": "read",
            "state": {
                "status": "running",
                "input": {"filePath": "/src/main.rs", "limit": 200},
                "title": "main.rs",
                "time": {"start": 1700000000000}
            }
        }"#;
        let part = Part::decode(json).unwrap();
        let tool = part.tool().unwrap();
        assert_eq!(tool.tool, "read");
        assert_eq!(tool.call_id, "toolu_01");
        assert!(tool.state.is_running());
        assert_eq!(tool.state.input_summary().as_deref(), Some("/src/main.rs"));
    }

    #[test]
    fn test_unknown_tool_status_is_kept() {
        let json = br#"{"id":"p","type":"tool","state":{"status":"paused"}}"#;
        let part = Part::decode(json).unwrap();
        assert_eq!(
            part.tool_status(),
            Some(ToolStatus::Unknown("paused".to_string()))
        );

        let encoded = String::from_utf8(part.encode().unwrap()).unwrap();
        assert!(encoded.contains(r#""status":"paused""#), "{}", encoded);
        assert_eq!(Part::decode(encoded.as_bytes()).unwrap(), part);
    }

    #[test]
    fn test_null_fields_decode_as_defaults() {
        let text = Part::decode(br#"{"id":"p","type":"text","text":null}"#).unwrap();
        assert_eq!(text.text(), Some(""));

        let tool = Part::decode(
            br#"{"id":"p","type":"tool","callID":null,"tool":null,"state":null}"#,
        )
        .unwrap();
        let tool = tool.tool().unwrap();
        assert_eq!(tool.call_id, "");
        assert_eq!(tool.state.status, ToolStatus::Pending);

        let retry = Part::decode(br#"{"id":"p","type":"retry","attempt":null}"#).unwrap();
        assert!(matches!(retry.kind, PartKind::Retry(RetryPart { attempt: 0, .. })));

        let subtask = Part::decode(
            br#"{"id":"p","type":"subtask","prompt":"go","description":null,"agent":null}"#,
        )
        .unwrap();
        match subtask.kind {
            PartKind::Subtask(subtask) => {
                assert_eq!(subtask.prompt, "go");
                assert!(subtask.agent.is_empty());
            }
            other => panic!("expected subtask part, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_part_error_is_not_prefixed_twice() {
        let err = serde_json::from_str::<Part>(r#"{"id":"p","type":"retry","attempt":"three"}"#)
            .unwrap_err()
            .to_string();
        assert_eq!(err.matches("malformed payload").count(), 0, "{}", err);
        assert!(err.contains("invalid type"), "{}", err);

        let err = serde_json::from_str::<Part>(r#"{"type":"text"}"#).unwrap_err();
        assert!(err.to_string().starts_with("missing required field `id`"), "{}", err);
    }

    #[test]
    fn test_tool_status_lattice() {
        use ToolStatus::*;
        assert!(Pending.can_transition_to(&Running));
        assert!(Pending.can_transition_to(&Completed));
        assert!(Running.can_transition_to(&Error));
        assert!(Running.can_transition_to(&Running));
        assert!(Completed.can_transition_to(&Completed));
        assert!(!Running.can_transition_to(&Pending));
        assert!(!Completed.can_transition_to(&Running));
        assert!(!Completed.can_transition_to(&Error));
        assert!(!Error.can_transition_to(&Pending));

        let paused = Unknown("paused".to_string());
        assert!(Running.can_transition_to(&paused));
        assert!(paused.can_transition_to(&Pending));
        assert!(Completed.can_transition_to(&paused));
    }

    #[test]
    fn test_input_summary_falls_back_to_any_value() {
        let mut input = ValueMap::new();
        input.insert("empty".to_string(), "".into());
        input.insert("nothing".to_string(), DynamicValue::Null);
        input.insert("url".to_string(), "https://example.com".into());
        let state = ToolState {
            input: Some(input),
            ..ToolState::default()
        };
        assert_eq!(state.input_summary().as_deref(), Some("https://example.com"));
        assert_eq!(ToolState::default().input_summary(), None);
    }

    #[test]
    fn test_text_accessors() {
        let mut part = Part::text_part("p", "s", "m", "abc");
        part.text_mut().unwrap().push_str("def");
        assert_eq!(part.text(), Some("abcdef"));
        assert!(with_kind(PartKind::Patch).text().is_none());
    }

    #[test]
    fn test_retry_error_accessors() {
        let part = Part::decode(
            br#"{"id":"p","type":"retry","attempt":3,"error":{"name":"APIError","data":{"message":"rate limited","statusCode":429}}}"#,
        )
        .unwrap();
        match part.kind {
            PartKind::Retry(retry) => {
                assert_eq!(retry.attempt, 3);
                let error = retry.error.unwrap();
                assert_eq!(error.name.as_deref(), Some("APIError"));
                assert_eq!(error.message(), Some("rate limited"));
                assert_eq!(error.status_code(), Some(429));
            }
            other => panic!("expected retry part, got {:?}", other),
        }
    }
}
