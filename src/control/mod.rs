//! Command layer and dispatcher configuration
//!
//! Calls flow leaf to root: the [`catalog`] defines every command, the
//! [`codec`] validates arguments, the [`builder`] produces envelopes and the
//! [`dispatcher`] publishes them over a [`channel`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// Submodules
pub mod builder;
pub mod call;
pub mod catalog;
pub mod channel;
pub mod codec;
pub mod dispatcher;
pub mod envelope;
pub mod error;

use error::ConfigError;

/// Slowest re-send interval that still keeps a velocity command in effect (10 Hz)
pub const MAX_RESEND_INTERVAL_MS: u64 = 100;

/// Configuration for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Session id stamped on calls that do not carry one
    pub session_id: u64,

    /// Interval between re-sends of a continuous command, in milliseconds
    pub resend_interval_ms: u64,

    /// Publish attempts per envelope before giving up
    pub max_attempts: u32,

    /// Delay before the first retry, doubled on each further retry
    pub initial_backoff_ms: u64,

    /// Upper bound for the retry delay
    pub max_backoff_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            session_id: 0,
            resend_interval_ms: 50,
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 200,
        }
    }
}

impl DispatcherConfig {
    /// Load a JSON config file and validate it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: DispatcherConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field is within range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resend_interval_ms == 0 || self.resend_interval_ms > MAX_RESEND_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "resend_interval_ms must be within 1..={MAX_RESEND_INTERVAL_MS}, got {}",
                self.resend_interval_ms
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".to_string()));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    /// Re-send interval for continuous commands
    pub fn resend_interval(&self) -> Duration {
        Duration::from_millis(self.resend_interval_ms)
    }

    /// Delay before the first retry
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Retry delay cap
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// Re-export commonly used types
pub use builder::RequestBuilder;
pub use call::CommandCall;
pub use catalog::{Catalog, CommandSpec};
pub use channel::{Channel, RecordingChannel, WriterChannel};
pub use dispatcher::{Dispatcher, SendOutcome};
pub use envelope::{Family, RequestEnvelope};
