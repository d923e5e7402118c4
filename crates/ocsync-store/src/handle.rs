//! Shared handle over the store.
//!
//! One writer applies events; any number of readers take short read locks.
//! Every visible change is announced on a broadcast channel so a
//! presentation layer can re-render without polling.

use std::sync::Arc;

use ocsync_core::{MessageWithParts, Session, SessionStatus, SyncConfig};
use ocsync_events::{Event, EventKind};
use parking_lot::{RwLock, RwLockReadGuard};
use tokio::sync::broadcast;

use crate::store::{ApplyOutcome, SessionStore};

/// What caused a [`StoreChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A stream event, or a local write shaped like one
    Event(EventKind),
    /// The event stream went live or stopped
    Connection { connected: bool },
    /// All state was dropped
    Cleared,
}

/// Notification that the store changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub kind: ChangeKind,
    /// Session the change belongs to, if any
    pub session_id: Option<String>,
}

/// Cloneable handle to a [`SessionStore`].
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<SessionStore>>,
    changes: broadcast::Sender<StoreChange>,
}

impl SharedStore {
    pub fn new(config: &SyncConfig) -> Self {
        Self::from_store(
            SessionStore::new(config.store.clone()),
            config.stream.change_channel_capacity,
        )
    }

    pub fn from_store(store: SessionStore, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(RwLock::new(store)),
            changes,
        }
    }

    /// Apply one event under the write lock and announce it if it changed anything.
    pub fn apply(&self, event: Event) -> ApplyOutcome {
        let kind = event.kind();
        let session_id = event.session_id().map(str::to_owned);
        let outcome = self.inner.write().apply(event);
        if outcome.is_visible_change() {
            self.notify(ChangeKind::Event(kind), session_id);
        }
        outcome
    }

    pub fn insert_session(&self, session: Session) -> ApplyOutcome {
        let session_id = session.id.clone();
        let outcome = self.inner.write().insert_session(session);
        if outcome.is_visible_change() {
            self.notify(ChangeKind::Event(EventKind::SessionCreated), Some(session_id));
        }
        outcome
    }

    pub fn load_messages(&self, session_id: &str, listing: Vec<MessageWithParts>) {
        self.inner.write().load_messages(session_id, listing);
        self.notify(
            ChangeKind::Event(EventKind::MessageUpdated),
            Some(session_id.to_owned()),
        );
    }

    pub fn set_connected(&self, connected: bool) {
        if self.inner.write().set_connected(connected) {
            self.notify(ChangeKind::Connection { connected }, None);
        }
    }

    pub fn clear(&self) {
        self.inner.write().clear();
        self.notify(ChangeKind::Cleared, None);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Consistent view of the whole store. Hold it briefly: the writer waits on it.
    pub fn read(&self) -> RwLockReadGuard<'_, SessionStore> {
        self.inner.read()
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.inner.read().session(session_id).cloned()
    }

    pub fn messages(&self, session_id: &str) -> Vec<MessageWithParts> {
        self.inner.read().messages(session_id)
    }

    pub fn status(&self, session_id: &str) -> Option<SessionStatus> {
        self.inner.read().status(session_id).cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.read().is_connected()
    }

    fn notify(&self, kind: ChangeKind, session_id: Option<String>) {
        // no subscribers is fine
        let _ = self.changes.send(StoreChange { kind, session_id });
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("subscribers", &self.changes.receiver_count())
            .finish_non_exhaustive()
    }
}
