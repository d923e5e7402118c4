//! The merge engine.
//!
//! [`SessionStore`] applies decoded events, in arrival order, onto three
//! id-keyed tables (sessions, messages, parts) plus ordered id lists that
//! record arrival order of messages per session and parts per message.
//! Status and errors live in side tables keyed by session id.

use std::collections::HashMap;

use ocsync_core::{
    DeltaDedup, Message, MessageWithParts, Part, Session, SessionError, SessionStatus,
    StoreConfig, ToolStatus,
};
use ocsync_events::{ErrorReported, Event, PartRemoved, PartUpdated, StatusChanged};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::buffer::PendingBuffer;

/// What applying one event did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// State changed.
    Applied,
    /// The event matched what is already stored.
    Unchanged,
    /// Held until its owner arrives.
    Buffered,
    /// Refused to keep state consistent. Not an error for the caller.
    Rejected(Rejection),
    /// The event cannot be placed anywhere and was discarded.
    Dropped,
    /// Unknown event; no state touched.
    Ignored,
    /// The transport reported it is live.
    Connected,
}

impl ApplyOutcome {
    /// Whether readers can observe a difference after this outcome.
    pub fn is_visible_change(&self) -> bool {
        matches!(self, ApplyOutcome::Applied | ApplyOutcome::Connected)
    }
}

/// Why an event was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("tool part {part_id} cannot move from {from} to {to}")]
    ToolRegression {
        part_id: String,
        from: ToolStatus,
        to: ToolStatus,
    },

    #[error("session {session_id} snapshot is older than the stored one ({incoming} < {stored})")]
    StaleSession {
        session_id: String,
        stored: i64,
        incoming: i64,
    },

    #[error("part {part_id} claims session {part_session} but its message belongs to {message_session}")]
    SessionMismatch {
        part_id: String,
        part_session: String,
        message_session: String,
    },

    #[error("session {session_id} retry attempt went backwards ({incoming} < {current})")]
    StatusRegression {
        session_id: String,
        current: u32,
        incoming: u32,
    },
}

/// Number of records waiting for their owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub messages: usize,
    pub parts: usize,
}

/// In-memory model of sessions, messages and parts rebuilt from the event stream.
#[derive(Debug)]
pub struct SessionStore {
    config: StoreConfig,
    sessions: HashMap<String, Session>,
    messages: HashMap<String, Message>,
    parts: HashMap<String, Part>,
    /// session id -> message ids in arrival order
    session_messages: HashMap<String, Vec<String>>,
    /// message id -> part ids in arrival order
    message_parts: HashMap<String, Vec<String>>,
    statuses: HashMap<String, SessionStatus>,
    errors: HashMap<String, SessionError>,
    global_error: Option<SessionError>,
    pending: PendingBuffer,
    /// part id -> highest delta sequence applied
    delta_sequences: HashMap<String, u64>,
    connected: bool,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl SessionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            pending: PendingBuffer::new(&config),
            config,
            sessions: HashMap::new(),
            messages: HashMap::new(),
            parts: HashMap::new(),
            session_messages: HashMap::new(),
            message_parts: HashMap::new(),
            statuses: HashMap::new(),
            errors: HashMap::new(),
            global_error: None,
            delta_sequences: HashMap::new(),
            connected: false,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Apply one decoded event.
    ///
    /// Never fails: inconsistencies are reported through the outcome and logged.
    pub fn apply(&mut self, event: Event) -> ApplyOutcome {
        let outcome = match event {
            Event::ServerConnected => {
                info!("Event stream connected");
                self.connected = true;
                ApplyOutcome::Connected
            }
            Event::SessionCreated(p) | Event::SessionUpdated(p) => self.upsert_session(p.info),
            Event::MessageCreated(p) | Event::MessageUpdated(p) => self.upsert_message(p.info),
            Event::PartUpdated(update) => self.apply_part_update(update),
            Event::PartRemoved(removed) => self.remove_part(removed),
            Event::SessionStatus(StatusChanged { session_id, status }) => {
                self.set_status(session_id, status)
            }
            Event::SessionIdle(idle) => self.set_status(idle.session_id, SessionStatus::idle()),
            Event::SessionError(reported) => self.record_error(reported),
            Event::Unknown(unknown) => {
                debug!(
                    event = %unknown.name,
                    payload_len = unknown.payload.len(),
                    "Ignoring unknown event"
                );
                ApplyOutcome::Ignored
            }
        };

        if let ApplyOutcome::Rejected(reason) = &outcome {
            warn!(%reason, "Rejected event");
        }
        outcome
    }

    /// Insert a session created locally, e.g. from a create-session response.
    pub fn insert_session(&mut self, session: Session) -> ApplyOutcome {
        self.upsert_session(session)
    }

    /// Replace every message and part of a session with a freshly fetched
    /// authoritative listing.
    pub fn load_messages(&mut self, session_id: &str, listing: Vec<MessageWithParts>) {
        if !self.sessions.contains_key(session_id) {
            self.sessions
                .insert(session_id.to_owned(), Session::new(session_id));
        }

        for message_id in self.session_messages.remove(session_id).unwrap_or_default() {
            self.messages.remove(&message_id);
            self.forget_parts_of(&message_id);
        }
        self.session_messages.insert(session_id.to_owned(), Vec::new());

        let count = listing.len();
        for MessageWithParts { info, parts } in listing {
            if info.session_id != session_id {
                warn!(
                    session_id,
                    message_id = %info.id,
                    owner = %info.session_id,
                    "Skipping message listed under another session"
                );
                continue;
            }
            let message_id = info.id.clone();
            self.insert_message(info);
            for mut part in parts {
                if part.message_id.is_none() {
                    part.message_id = Some(message_id.clone());
                }
                match part.session_id.as_deref() {
                    Some(owner) if owner != session_id => {
                        warn!(
                            session_id,
                            part_id = %part.id,
                            owner,
                            "Skipping part listed under another session"
                        );
                        continue;
                    }
                    Some(_) => {}
                    None => part.session_id = Some(session_id.to_owned()),
                }
                self.insert_part(&message_id, part);
            }
            self.flush_parts(&message_id);
        }
        debug!(session_id, messages = count, "Loaded messages");

        for message in self.pending.take_messages_for_session(session_id) {
            self.upsert_message(message);
        }
    }

    /// Drop all state, keeping the configuration.
    pub fn clear(&mut self) {
        *self = Self::new(self.config.clone());
    }

    fn upsert_session(&mut self, session: Session) -> ApplyOutcome {
        let session_id = session.id.clone();

        if let Some(stored) = self.sessions.get(&session_id) {
            if let (Some(stored), Some(incoming)) =
                (stored.updated_millis(), session.updated_millis())
            {
                if incoming < stored {
                    return ApplyOutcome::Rejected(Rejection::StaleSession {
                        session_id,
                        stored,
                        incoming,
                    });
                }
            }
            if *stored == session {
                return ApplyOutcome::Unchanged;
            }
        }

        debug!(session_id = %session_id, "Upserted session");
        self.sessions.insert(session_id.clone(), session);
        self.session_messages.entry(session_id.clone()).or_default();

        for message in self.pending.take_messages_for_session(&session_id) {
            self.upsert_message(message);
        }
        ApplyOutcome::Applied
    }

    fn upsert_message(&mut self, message: Message) -> ApplyOutcome {
        if !self.sessions.contains_key(&message.session_id) {
            debug!(
                session_id = %message.session_id,
                message_id = %message.id,
                "Buffering message until its session arrives"
            );
            if let Some(evicted) = self.pending.push_message(message) {
                warn!(
                    session_id = %evicted.session_id,
                    message_id = %evicted.id,
                    "Pending message buffer full, dropped oldest message"
                );
            }
            return ApplyOutcome::Buffered;
        }

        if self.messages.get(&message.id) == Some(&message) {
            return ApplyOutcome::Unchanged;
        }

        let message_id = message.id.clone();
        debug!(session_id = %message.session_id, message_id = %message_id, "Upserted message");
        self.insert_message(message);

        self.flush_parts(&message_id);
        ApplyOutcome::Applied
    }

    fn flush_parts(&mut self, message_id: &str) {
        for update in self.pending.take_parts_for_message(message_id) {
            if let ApplyOutcome::Rejected(reason) = self.apply_part_update(update) {
                warn!(%reason, "Rejected buffered part update");
            }
        }
    }

    fn insert_message(&mut self, message: Message) {
        if let Some(previous) = self.messages.get(&message.id) {
            if previous.session_id != message.session_id {
                let previous_session = previous.session_id.clone();
                remove_id(&mut self.session_messages, &previous_session, &message.id);
            }
        }

        let order = self
            .session_messages
            .entry(message.session_id.clone())
            .or_default();
        if !order.contains(&message.id) {
            order.push(message.id.clone());
        }
        self.messages.insert(message.id.clone(), message);
    }

    fn apply_part_update(&mut self, update: PartUpdated) -> ApplyOutcome {
        let Some(message_id) = update.part.message_id.clone() else {
            warn!(part_id = %update.part.id, "Dropping part without a message id");
            return ApplyOutcome::Dropped;
        };

        let Some(message_session) = self.messages.get(&message_id).map(|m| m.session_id.clone())
        else {
            debug!(
                message_id = %message_id,
                part_id = %update.part.id,
                "Buffering part until its message arrives"
            );
            if let Some(evicted) = self.pending.push_part(update) {
                warn!(
                    part_id = %evicted.part.id,
                    "Pending part buffer full, dropped oldest part update"
                );
            }
            return ApplyOutcome::Buffered;
        };

        let PartUpdated {
            mut part,
            delta,
            sequence,
        } = update;

        match part.session_id.as_deref() {
            Some(part_session) if part_session != message_session => {
                return ApplyOutcome::Rejected(Rejection::SessionMismatch {
                    part_session: part_session.to_owned(),
                    part_id: part.id,
                    message_session,
                });
            }
            Some(_) => {}
            None => part.session_id = Some(message_session),
        }

        let stored = self.parts.get(&part.id);

        if let (Some(from), Some(to)) = (stored.and_then(Part::tool_status), part.tool_status()) {
            if !from.can_transition_to(&to) {
                return ApplyOutcome::Rejected(Rejection::ToolRegression {
                    part_id: part.id,
                    from,
                    to,
                });
            }
        }
        if let Some(status) = part.tool_status().filter(ToolStatus::is_unknown) {
            info!(part_id = %part.id, %status, "Tool part has an unrecognised status");
        }

        if let Some(delta) = delta {
            if part.text().is_some() {
                let base = stored.and_then(Part::text).unwrap_or_default();
                if self.is_redelivered_delta(&part, base, &delta, sequence) {
                    debug!(part_id = %part.id, "Skipping redelivered delta");
                    return ApplyOutcome::Unchanged;
                }
                let text = format!("{}{}", base, delta);
                if let Some(body) = part.text_mut() {
                    *body = text;
                }
            } else {
                debug!(
                    part_id = %part.id,
                    kind = part.discriminant(),
                    "Delta on a part without text, replacing instead"
                );
            }
        } else if stored == Some(&part) {
            self.record_sequence(&part.id, sequence);
            return ApplyOutcome::Unchanged;
        }

        self.record_sequence(&part.id, sequence);
        self.insert_part(&message_id, part);
        ApplyOutcome::Applied
    }

    fn is_redelivered_delta(
        &self,
        part: &Part,
        base: &str,
        delta: &str,
        sequence: Option<u64>,
    ) -> bool {
        match self.config.delta_dedup {
            DeltaDedup::Off => false,
            DeltaDedup::Sequence => match (sequence, self.delta_sequences.get(&part.id)) {
                (Some(incoming), Some(&applied)) => incoming <= applied,
                _ => false,
            },
            DeltaDedup::SnapshotMatch => {
                !delta.is_empty() && part.text() == Some(base) && base.ends_with(delta)
            }
        }
    }

    fn record_sequence(&mut self, part_id: &str, sequence: Option<u64>) {
        if self.config.delta_dedup != DeltaDedup::Sequence {
            return;
        }
        if let Some(sequence) = sequence {
            let applied = self.delta_sequences.entry(part_id.to_owned()).or_insert(0);
            *applied = (*applied).max(sequence);
        }
    }

    fn insert_part(&mut self, message_id: &str, part: Part) {
        if let Some(previous) = self.parts.get(&part.id) {
            if let Some(previous_message) = previous.message_id.as_deref() {
                if previous_message != message_id {
                    let previous_message = previous_message.to_owned();
                    remove_id(&mut self.message_parts, &previous_message, &part.id);
                }
            }
        }

        let order = self.message_parts.entry(message_id.to_owned()).or_default();
        if !order.contains(&part.id) {
            order.push(part.id.clone());
        }
        debug!(message_id, part_id = %part.id, kind = part.discriminant(), "Upserted part");
        self.parts.insert(part.id.clone(), part);
    }

    fn remove_part(&mut self, removed: PartRemoved) -> ApplyOutcome {
        let part_id = removed.part_id;
        let purged = self.pending.remove_part(&part_id);
        self.delta_sequences.remove(&part_id);

        let Some(part) = self.parts.remove(&part_id) else {
            return if purged > 0 {
                ApplyOutcome::Applied
            } else {
                ApplyOutcome::Unchanged
            };
        };

        if let Some(message_id) = part.message_id.as_deref().or(removed.message_id.as_deref()) {
            remove_id(&mut self.message_parts, message_id, &part_id);
        }
        debug!(part_id = %part_id, "Removed part");
        ApplyOutcome::Applied
    }

    fn forget_parts_of(&mut self, message_id: &str) {
        for part_id in self.message_parts.remove(message_id).unwrap_or_default() {
            self.parts.remove(&part_id);
            self.delta_sequences.remove(&part_id);
        }
    }

    fn set_status(&mut self, session_id: String, status: SessionStatus) -> ApplyOutcome {
        // idle carries no retry state
        let status = if status.is_idle() {
            SessionStatus::idle()
        } else {
            status
        };

        if let Some(current) = self.statuses.get(&session_id) {
            if current.regresses_to(&status) {
                return ApplyOutcome::Rejected(Rejection::StatusRegression {
                    current: current.attempt.unwrap_or_default(),
                    incoming: status.attempt.unwrap_or_default(),
                    session_id,
                });
            }
            if *current == status {
                return ApplyOutcome::Unchanged;
            }
        }

        debug!(session_id = %session_id, status = ?status.kind, "Session status changed");
        self.statuses.insert(session_id, status);
        ApplyOutcome::Applied
    }

    fn record_error(&mut self, reported: ErrorReported) -> ApplyOutcome {
        let Some(error) = reported.error else {
            return ApplyOutcome::Unchanged;
        };

        match reported.session_id {
            Some(session_id) => {
                if self.errors.get(&session_id) == Some(&error) {
                    return ApplyOutcome::Unchanged;
                }
                warn!(
                    session_id = %session_id,
                    error = error.message().unwrap_or("unknown error"),
                    "Session reported an error"
                );
                self.errors.insert(session_id, error);
            }
            None => {
                if self.global_error.as_ref() == Some(&error) {
                    return ApplyOutcome::Unchanged;
                }
                warn!(
                    error = error.message().unwrap_or("unknown error"),
                    "Server reported an error"
                );
                self.global_error = Some(error);
            }
        }
        ApplyOutcome::Applied
    }

    // Reads

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// All sessions, most recently updated first.
    pub fn sessions(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by(|a, b| {
            b.updated_millis()
                .cmp(&a.updated_millis())
                .then_with(|| a.id.cmp(&b.id))
        });
        sessions
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.get(message_id)
    }

    /// Messages of a session in arrival order, each with its parts in arrival order.
    pub fn messages(&self, session_id: &str) -> Vec<MessageWithParts> {
        let Some(order) = self.session_messages.get(session_id) else {
            return Vec::new();
        };
        order
            .iter()
            .filter_map(|id| self.messages.get(id))
            .map(|info| MessageWithParts {
                info: info.clone(),
                parts: self.parts(&info.id).into_iter().cloned().collect(),
            })
            .collect()
    }

    pub fn parts(&self, message_id: &str) -> Vec<&Part> {
        self.message_parts
            .get(message_id)
            .map(|order| order.iter().filter_map(|id| self.parts.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn part(&self, part_id: &str) -> Option<&Part> {
        self.parts.get(part_id)
    }

    pub fn status(&self, session_id: &str) -> Option<&SessionStatus> {
        self.statuses.get(session_id)
    }

    pub fn error(&self, session_id: &str) -> Option<&SessionError> {
        self.errors.get(session_id)
    }

    pub fn global_error(&self) -> Option<&SessionError> {
        self.global_error.as_ref()
    }

    /// Remove and return the error recorded for a session once it has been shown.
    pub fn dismiss_error(&mut self, session_id: &str) -> Option<SessionError> {
        self.errors.remove(session_id)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns whether the connection state changed.
    pub fn set_connected(&mut self, connected: bool) -> bool {
        std::mem::replace(&mut self.connected, connected) != connected
    }

    pub fn pending_counts(&self) -> PendingCounts {
        PendingCounts {
            messages: self.pending.message_count(),
            parts: self.pending.part_count(),
        }
    }
}

fn remove_id(index: &mut HashMap<String, Vec<String>>, owner: &str, id: &str) {
    if let Some(order) = index.get_mut(owner) {
        order.retain(|existing| existing != id);
    }
}
