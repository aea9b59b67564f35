//! Go2 Dispatch – typed command dispatch for a quadruped's sport-mode service
//!
//! This crate implements:
//! - An immutable catalog of named robot actions with typed parameter schemas
//! - Validation and deterministic serialisation of call arguments
//! - Request envelopes addressed to the sport or obstacle-avoidance topic
//! - A dispatcher that keeps velocity commands alive at 10 Hz or faster and
//!   halts them cleanly on stop, stance changes and shutdown

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Command catalog, codec, builder and dispatcher
pub mod control;

// Re-export key types for convenience
pub use control::{CommandCall, Dispatcher, DispatcherConfig, RequestEnvelope};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Data-channel message type used for every request
pub const WIRE_MESSAGE_TYPE: &str = "msg";
