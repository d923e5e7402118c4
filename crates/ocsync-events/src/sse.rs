//! Server-sent events framing.
//!
//! Network chunks split records anywhere, including inside a multi-byte
//! character, so bytes are held until a full line is available and only
//! complete lines are decoded as UTF-8. A blank line ends a record, which is
//! turned straight into a [`RawEvent`] for the event decoder.

use ocsync_core::DecodeError;
use serde::Deserialize;

use crate::event::RawEvent;

/// Event name SSE implies when a record names none.
const IMPLIED_EVENT_NAME: &str = "message";

#[derive(Deserialize)]
struct EnvelopeType {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Fields collected for the record currently being read.
#[derive(Debug, Default)]
struct PartialRecord {
    event: Option<String>,
    data: Option<String>,
    id: Option<String>,
    /// A line of this record was not valid UTF-8
    corrupt: bool,
}

impl PartialRecord {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_none() && self.id.is_none() && !self.corrupt
    }

    fn push_line(&mut self, line: &str) {
        // `:` starts a comment, used by servers as a keepalive
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "id" => self.id = Some(value.to_owned()),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_owned()),
            },
            _ => {}
        }
    }

    /// Finish the record. Records without data carry nothing and are skipped.
    fn finish(self) -> Option<Result<RawEvent, DecodeError>> {
        if self.corrupt {
            return Some(Err(DecodeError::invalid("data", "record is not valid UTF-8")));
        }
        let data = self.data?;
        Some(record_name(self.event, &data).map(|name| RawEvent {
            name,
            data: data.into_bytes(),
            id: self.id,
        }))
    }
}

/// An explicit event name wins, otherwise the envelope's `type` names the record.
fn record_name(event: Option<String>, data: &str) -> Result<String, DecodeError> {
    match event {
        Some(name) if name != IMPLIED_EVENT_NAME => Ok(name),
        _ => {
            let envelope: EnvelopeType = serde_json::from_str(data)?;
            envelope.kind.ok_or(DecodeError::MissingField("type"))
        }
    }
}

/// Incremental decoder from SSE bytes to raw event records.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes after the last complete line
    pending: Vec<u8>,
    record: PartialRecord,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every record it completes.
    ///
    /// A record that cannot be framed yields an error in its place; the
    /// decoder keeps going with the next one.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<RawEvent, DecodeError>> {
        self.pending.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.pending[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let mut line = &self.pending[consumed..end];
            consumed = end + 1;
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }

            if line.is_empty() {
                let record = std::mem::take(&mut self.record);
                records.extend(record.finish());
                continue;
            }
            match std::str::from_utf8(line) {
                Ok(line) => self.record.push_line(line),
                Err(_) => self.record.corrupt = true,
            }
        }
        self.pending.drain(..consumed);

        records
    }

    /// Whether a record has started but not been terminated yet.
    pub fn has_partial_record(&self) -> bool {
        !self.pending.is_empty() || !self.record.is_empty()
    }
}
