//! # ocsync-core
//!
//! Core types for opencode-sync, the client-side state layer for an
//! OpenCode-style coding assistant server.
//!
//! This crate provides:
//! - A schema-less JSON value model for free-form server payloads
//! - The message part codec (text, tool, reasoning, file, step markers, ...)
//! - Session, message and status records
//! - Request/response shapes for the REST endpoints
//! - Configuration and common error types

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod part;
pub mod value;

pub use config::{DeltaDedup, StoreConfig, StreamConfig, SyncConfig};
pub use error::{DecodeError, Error, Result};
pub use model::{
    Message, MessageWithParts, Role, Session, SessionError, SessionStatus, SessionStatusKind,
    Tokens,
};
pub use part::{Part, PartKind, ToolState, ToolStatus};
pub use value::{DynamicValue, ValueMap};
