//! Parameter codec
//!
//! Validates call arguments against a command schema and renders them as the
//! JSON parameter string carried in the request body. Only presence and type
//! are checked; valid ranges are command-specific and left to the robot.
//!
//! Keys are written in schema order so the output is reproducible.

use serde_json::{Map, Value};

use super::catalog::{CommandSpec, FieldSpec};
use super::error::{CodecError, CodecResult};

/// Named call arguments
pub type Arguments = Map<String, Value>;

/// Parameter string used for commands without arguments
pub const EMPTY_PARAMETER: &str = "";

/// Validate `arguments` against `spec` and serialise them
pub fn encode(spec: &CommandSpec, arguments: &Arguments) -> CodecResult<String> {
    if spec.takes_no_arguments() {
        if let Some(field) = arguments.keys().next() {
            return Err(unexpected(spec, field));
        }
        return Ok(EMPTY_PARAMETER.to_string());
    }

    let ordered = validate(spec, arguments)?;
    serde_json::to_string(&ordered).map_err(|err| malformed(spec, err))
}

/// Parse a serialised parameter back into arguments
///
/// Applies the same validation as [`encode`]. Every field is required, so
/// anything `encode` produced decodes to exactly the arguments it was given.
pub fn decode(spec: &CommandSpec, parameter: &str) -> CodecResult<Arguments> {
    if spec.takes_no_arguments() {
        if parameter.is_empty() {
            return Ok(Arguments::new());
        }
        return Err(CodecError::MalformedParameter {
            command: spec.name.to_string(),
            detail: format!("expected empty parameter, got {parameter:?}"),
        });
    }

    let parsed: Arguments = serde_json::from_str(parameter).map_err(|err| malformed(spec, err))?;
    validate(spec, &parsed)
}

/// Check every argument and return them in schema order
fn validate(spec: &CommandSpec, arguments: &Arguments) -> CodecResult<Arguments> {
    if let Some(field) = arguments.keys().find(|key| spec.field_named(key).is_none()) {
        return Err(unexpected(spec, field));
    }

    let mut ordered = Arguments::new();
    for field in &spec.parameters {
        let value = resolve(spec, field, arguments)?;
        ordered.insert(field.name.to_string(), value);
    }
    Ok(ordered)
}

fn resolve(spec: &CommandSpec, field: &FieldSpec, arguments: &Arguments) -> CodecResult<Value> {
    let Some(value) = arguments.get(field.name) else {
        return Err(CodecError::MissingArgument {
            command: spec.name.to_string(),
            field: field.name.to_string(),
        });
    };

    if !field.kind.accepts(value) {
        return Err(CodecError::TypeMismatch {
            command: spec.name.to_string(),
            field: field.name.to_string(),
            expected: field.kind.describe(),
            found: value.to_string(),
        });
    }
    Ok(value.clone())
}

fn unexpected(spec: &CommandSpec, field: &str) -> CodecError {
    CodecError::UnexpectedArgument {
        command: spec.name.to_string(),
        field: field.to_string(),
    }
}

fn malformed(spec: &CommandSpec, err: serde_json::Error) -> CodecError {
    CodecError::MalformedParameter {
        command: spec.name.to_string(),
        detail: err.to_string(),
    }
}
