//! # ocsync-events
//!
//! Event stream handling for opencode-sync.
//!
//! This crate provides:
//! - SSE framing that turns byte chunks into raw `(name, bytes)` records
//! - The event decoder mapping wire event names to typed payloads

pub mod event;
pub mod sse;

pub use event::{
    decode_envelope, decode_event, ErrorReported, Event, EventKind, MessageInfo, PartRemoved,
    PartUpdated, RawEvent, SessionIdle, SessionInfo, StatusChanged, UnknownEvent,
};
pub use sse::SseDecoder;
