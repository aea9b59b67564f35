//! Request builder
//!
//! Turns a [`CommandCall`] into a [`RequestEnvelope`]. Building is a pure
//! function of the call, the default session id and the immutable catalog.

use serde_json::Value;

use super::call::CommandCall;
use super::catalog::{Catalog, CommandSpec, FieldType};
use super::codec::{self, Arguments};
use super::envelope::RequestEnvelope;
use super::error::BuildResult;

/// Builds envelopes against a catalog
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder {
    catalog: &'static Catalog,
    default_session: u64,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new(Catalog::global(), 0)
    }
}

impl RequestBuilder {
    /// Create a builder that stamps `default_session` on calls without one
    pub fn new(catalog: &'static Catalog, default_session: u64) -> Self {
        Self {
            catalog,
            default_session,
        }
    }

    /// Catalog used for lookups
    pub fn catalog(&self) -> &'static Catalog {
        self.catalog
    }

    /// Validate and serialise a call
    pub fn build(&self, call: &CommandCall) -> BuildResult<RequestEnvelope> {
        let spec = self.catalog.lookup(&call.command)?;
        let parameter = codec::encode(spec, &call.arguments)?;
        Ok(self.assemble(spec, parameter, call.priority_override, call.session_id))
    }

    /// Build the envelope that halts a continuous command
    ///
    /// Every schema field is zeroed (numbers) or cleared (booleans).
    pub fn build_halt(&self, spec: &CommandSpec, session_id: Option<u64>) -> BuildResult<RequestEnvelope> {
        let parameter = codec::encode(spec, &halt_arguments(spec))?;
        Ok(self.assemble(spec, parameter, None, session_id))
    }

    fn assemble(
        &self,
        spec: &CommandSpec,
        parameter: String,
        priority_override: Option<u8>,
        session_id: Option<u64>,
    ) -> RequestEnvelope {
        RequestEnvelope {
            session_id: session_id.unwrap_or(self.default_session),
            topic: spec.family.topic(),
            action_id: spec.action_id,
            parameter,
            priority: priority_override.unwrap_or(spec.default_priority),
        }
    }
}

/// Zero-valued arguments for every field in the schema
pub fn halt_arguments(spec: &CommandSpec) -> Arguments {
    spec.parameters
        .iter()
        .map(|field| {
            let value = match field.kind {
                FieldType::Number => Value::from(0),
                FieldType::Boolean => Value::Bool(false),
            };
            (field.name.to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::envelope::{OBSTACLE_AVOID_TOPIC, PRIORITY_ELEVATED, SPORT_TOPIC};
    use crate::control::error::{BuildError, CatalogError, CodecError};

    #[test]
    fn test_build_one_shot() {
        let builder = RequestBuilder::default();
        let envelope = builder.build(&CommandCall::new("standUp")).unwrap();
        assert_eq!(
            envelope,
            RequestEnvelope {
                session_id: 0,
                topic: SPORT_TOPIC,
                action_id: 1004,
                parameter: String::new(),
                priority: 0,
            }
        );
    }

    #[test]
    fn test_build_uses_family_topic_and_defaults() {
        let builder = RequestBuilder::new(Catalog::global(), 9);
        let envelope = builder
            .build(&CommandCall::new("setObstacleAvoidance").arg("enable", false))
            .unwrap();
        assert_eq!(envelope.topic, OBSTACLE_AVOID_TOPIC);
        assert_eq!(envelope.action_id, 1001);
        assert_eq!(envelope.session_id, 9);
        assert_eq!(envelope.parameter, r#"{"enable":false}"#);

        let velocity = builder
            .build(&CommandCall::new("move").arg("x", 0.2).arg("y", 0).arg("z", 0).session(3))
            .unwrap();
        assert_eq!(velocity.priority, PRIORITY_ELEVATED);
        assert_eq!(velocity.session_id, 3);
    }

    #[test]
    fn test_priority_override() {
        let builder = RequestBuilder::default();
        let envelope = builder.build(&CommandCall::new("hello").priority(1)).unwrap();
        assert_eq!(envelope.priority, 1);
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = RequestBuilder::default();
        let call = CommandCall::new("euler").arg("z", 0.3).arg("x", 0.1).arg("y", -0.2);
        let first = builder.build(&call).unwrap();
        let second = builder.build(&call).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_wire().unwrap(), second.to_wire().unwrap());
    }

    #[test]
    fn test_build_propagates_errors() {
        let builder = RequestBuilder::default();
        assert_eq!(
            builder.build(&CommandCall::new("danc3")),
            Err(BuildError::Catalog(CatalogError::UnknownCommand("danc3".into())))
        );
        assert!(matches!(
            builder.build(&CommandCall::new("standUp").arg("x", 0)),
            Err(BuildError::Codec(CodecError::UnexpectedArgument { .. }))
        ));
    }

    #[test]
    fn test_halt_envelope_zeroes_velocity() {
        let builder = RequestBuilder::default();
        let spec = Catalog::global().lookup("move").unwrap();
        let halt = builder.build_halt(spec, None).unwrap();
        assert_eq!(halt.action_id, 1008);
        assert_eq!(halt.parameter, r#"{"x":0,"y":0,"z":0}"#);
    }
}
