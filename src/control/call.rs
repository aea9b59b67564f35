//! Command calls
//!
//! A [`CommandCall`] is the caller-facing form of a request: a command name,
//! its named arguments and optional overrides. Nothing is validated until the
//! call is handed to the builder.

use serde_json::{Number, Value};

use super::codec::Arguments;
use super::error::{CodecError, CodecResult};

/// A typed invocation of a catalog command
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandCall {
    /// Canonical command name
    pub command: String,
    /// Named arguments
    pub arguments: Arguments,
    /// Priority to use instead of the catalog default
    pub priority_override: Option<u8>,
    /// Session identifier to stamp on the envelope
    pub session_id: Option<u64>,
}

impl CommandCall {
    /// Start a call with no arguments
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Build a call from a JSON object of arguments
    ///
    /// `null` is treated as "no arguments"; any other non-object is rejected.
    pub fn from_json(command: impl Into<String>, arguments: Value) -> CodecResult<Self> {
        let command = command.into();
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Arguments::new(),
            other => {
                return Err(CodecError::MalformedParameter {
                    command,
                    detail: format!("arguments must be an object, got {other}"),
                });
            }
        };
        Ok(Self {
            command,
            arguments,
            ..Self::default()
        })
    }

    /// Add (or replace) one argument
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Override the catalog priority
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority_override = Some(priority);
        self
    }

    /// Stamp a session identifier
    pub fn session(mut self, session_id: u64) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Parse a textual `name=value` argument
///
/// The value becomes a boolean for `true`/`false`, a number when it parses as
/// a finite float, and a string otherwise (which the codec will then reject
/// with a type mismatch naming the field).
pub fn parse_argument(text: &str) -> Option<(String, Value)> {
    let (name, raw) = text.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let raw = raw.trim();

    let value = match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => parse_number(raw).unwrap_or_else(|| Value::String(raw.to_string())),
    };
    Some((name.to_string(), value))
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    let float = raw.parse::<f64>().ok()?;
    Number::from_f64(float).map(Value::Number)
}
