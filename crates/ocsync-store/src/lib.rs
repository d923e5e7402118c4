//! # ocsync-store
//!
//! Session state reconstruction for opencode-sync.
//!
//! This crate provides:
//! - The merge engine that applies decoded events onto sessions, messages and parts
//! - Bounded buffering for records that arrive before their owner
//! - A shared, lock-guarded handle with change notifications
//! - The event loop that drives a transport into the store
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ocsync_core::SyncConfig;
//! use ocsync_store::{run_event_loop, SharedStore, SseEventSource};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = SyncConfig::load()?;
//! let store = SharedStore::new(&config);
//!
//! // `body` is any stream of byte chunks from the server's event endpoint
//! let source = SseEventSource::new(body);
//! let summary = run_event_loop(source, store.clone(), CancellationToken::new()).await;
//!
//! for message in store.messages("ses_123") {
//!     println!("{}: {} parts", message.info.id, message.parts.len());
//! }
//! ```
//!
//! ## Merge Rules
//!
//! - Session, message and part updates replace the stored record wholesale.
//! - A part update carrying `delta` appends the delta to the stored text instead.
//! - Tool status only moves forward: pending, running, then completed or error.
//! - Records whose owner is unknown wait in a bounded buffer.

pub mod buffer;
pub mod error;
pub mod handle;
pub mod pump;
pub mod store;

pub use buffer::PendingBuffer;
pub use error::TransportError;
pub use handle::{ChangeKind, SharedStore, StoreChange};
pub use pump::{
    run_event_loop, spawn_event_loop, EventSource, SseEventSource, StreamEnd, StreamSummary,
};
pub use store::{ApplyOutcome, PendingCounts, Rejection, SessionStore};
