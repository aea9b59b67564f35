//! Error types for the command layer
//!
//! Validation failures (catalog and codec) are raised before anything reaches
//! a channel. Transport failures are wrapped in [`DispatchError`] once the
//! bounded retry budget is spent.

use std::io;
use thiserror::Error;

/// Catalog lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// No command is registered under this name
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
}

/// Convenience result alias for catalog operations
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Parameter validation and (de)serialisation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Argument not declared in the command schema
    #[error("Command '{command}' does not accept argument '{field}'")]
    UnexpectedArgument {
        /// Command name
        command: String,
        /// Offending argument name
        field: String,
    },

    /// Required argument missing and no default declared
    #[error("Command '{command}' is missing required argument '{field}'")]
    MissingArgument {
        /// Command name
        command: String,
        /// Missing argument name
        field: String,
    },

    /// Argument present with the wrong type
    #[error("Argument '{field}' of command '{command}' must be {expected}, got {found}")]
    TypeMismatch {
        /// Command name
        command: String,
        /// Argument name
        field: String,
        /// Expected field type
        expected: &'static str,
        /// Rendered value that was supplied
        found: String,
    },

    /// Serialised parameter could not be parsed back
    #[error("Malformed parameter for command '{command}': {detail}")]
    MalformedParameter {
        /// Command name
        command: String,
        /// Parser detail
        detail: String,
    },
}

impl CodecError {
    /// Name of the command whose arguments failed validation
    pub fn command(&self) -> &str {
        match self {
            CodecError::UnexpectedArgument { command, .. }
            | CodecError::MissingArgument { command, .. }
            | CodecError::TypeMismatch { command, .. }
            | CodecError::MalformedParameter { command, .. } => command,
        }
    }
}

/// Convenience result alias for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Errors building a request envelope
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Catalog lookup failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Argument validation failed
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Convenience result alias for request building
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Failures reported by a [`Channel`](super::channel::Channel)
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel no longer accepts envelopes
    #[error("channel closed")]
    Closed,

    /// Transport-level failure reported by the underlying link
    #[error("transport error: {0}")]
    Transport(String),

    /// IO error while writing the envelope
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Envelope could not be rendered
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Dispatcher errors surfaced to callers and to the stream error hook
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Command name not in the catalog
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Arguments rejected by the codec
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Channel publish failed on every attempt
    #[error("Dispatch to '{topic}' failed after {attempts} attempt(s): {source}")]
    DispatchFailed {
        /// Destination topic
        topic: &'static str,
        /// Number of publish attempts made
        attempts: u32,
        /// Last channel error
        #[source]
        source: ChannelError,
    },

    /// The dispatcher has been shut down
    #[error("Dispatcher is shut down")]
    ShutDown,
}

impl From<BuildError> for DispatchError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Catalog(err) => DispatchError::Catalog(err),
            BuildError::Codec(err) => DispatchError::Codec(err),
        }
    }
}

/// Convenience result alias for dispatcher operations
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field is outside its accepted range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_error_maps_into_dispatch_error() {
        let err: DispatchError = BuildError::Catalog(CatalogError::UnknownCommand("x".into())).into();
        assert!(matches!(err, DispatchError::Catalog(CatalogError::UnknownCommand(_))));

        let codec = CodecError::MissingArgument {
            command: "move".into(),
            field: "x".into(),
        };
        assert_eq!(codec.command(), "move");
        let err: DispatchError = BuildError::Codec(codec).into();
        assert!(matches!(err, DispatchError::Codec(CodecError::MissingArgument { .. })));
    }

    #[test]
    fn dispatch_failed_message_names_topic_and_attempts() {
        let err = DispatchError::DispatchFailed {
            topic: "rt/api/sport/request",
            attempts: 3,
            source: ChannelError::Closed,
        };
        let text = err.to_string();
        assert!(text.contains("rt/api/sport/request"));
        assert!(text.contains("3 attempt"));
    }
}
