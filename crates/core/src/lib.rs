//! # naturalmaps core
//!
//! Domain types, traits, and error definitions for the naturalmaps geodata
//! agent. This crate has **no framework dependencies**: it defines the
//! model every other crate implements against.
//!
//! Every seam is a trait here (`Provider`, `Tool`, `RunLog`).
//! Implementations live in their own crates, which keeps the agent loop
//! testable with scripted stand-ins.

pub mod error;
pub mod event;
pub mod message;
pub mod protocol;
pub mod provider;
pub mod runlog;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{FunctionCall, Message, MessageLog, Role};
pub use protocol::ProtocolMarkers;
pub use provider::{FunctionDefinition, Provider, ProviderRequest, ProviderResponse, Usage};
pub use runlog::{RunEntries, RunLog, RunSnapshot, ToolCallRecord, ToolCallRecords};
pub use tool::{ResultPolicy, Tool, ToolOutcome, ToolRegistry, ToolResult};
