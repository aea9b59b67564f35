//! Request envelopes and their data-channel wire form
//!
//! An envelope is immutable once built. The wire rendering uses fixed key
//! order so the same envelope always produces the same bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Topic shared by every sport-mode request
pub const SPORT_TOPIC: &str = "rt/api/sport/request";

/// Topic shared by the obstacle-avoidance request family
pub const OBSTACLE_AVOID_TOPIC: &str = "rt/api/obstacles_avoid/request";

/// Priority used by ordinary one-shot requests
pub const PRIORITY_NORMAL: u8 = 0;

/// Priority used by continuous and interactive requests
pub const PRIORITY_ELEVATED: u8 = 1;

/// Group of commands sharing a destination topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Sport-mode motion requests
    Sport,
    /// Obstacle-avoidance service requests
    ObstacleAvoidance,
}

impl Family {
    /// All families, in a stable order
    pub const ALL: [Family; 2] = [Family::Sport, Family::ObstacleAvoidance];

    /// Destination topic for this family
    pub fn topic(self) -> &'static str {
        match self {
            Family::Sport => SPORT_TOPIC,
            Family::ObstacleAvoidance => OBSTACLE_AVOID_TOPIC,
        }
    }

    /// Reverse lookup from a topic string
    pub fn from_topic(topic: &str) -> Option<Family> {
        Family::ALL.into_iter().find(|family| family.topic() == topic)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// A fully built request, ready to publish
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestEnvelope {
    /// Caller/session identifier (not validated here)
    pub session_id: u64,
    /// Destination topic, one of the family constants
    pub topic: &'static str,
    /// Command-specific action identifier
    pub action_id: u32,
    /// Serialised parameter payload, empty when the command takes none
    pub parameter: String,
    /// Priority hint consumed by the receiver
    pub priority: u8,
}

impl RequestEnvelope {
    /// Family this envelope is addressed to
    pub fn family(&self) -> Option<Family> {
        Family::from_topic(self.topic)
    }

    /// Render the data-channel message for this envelope
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(&WireMessage::from(self))
    }

    /// Parse a data-channel message back into an envelope
    ///
    /// Only topics belonging to a known family are accepted.
    pub fn from_wire(text: &str) -> Result<RequestEnvelope, WireError> {
        let message: WireMessage<'_> = serde_json::from_str(text)?;
        if message.kind != crate::WIRE_MESSAGE_TYPE {
            return Err(WireError::UnexpectedType(message.kind.to_string()));
        }
        let family = Family::from_topic(&message.topic)
            .ok_or_else(|| WireError::UnknownTopic(message.topic.to_string()))?;

        Ok(RequestEnvelope {
            session_id: message.data.header.identity.id,
            topic: family.topic(),
            action_id: message.data.header.identity.api_id,
            parameter: message.data.parameter.into_owned(),
            priority: message.data.header.policy.priority,
        })
    }
}

impl fmt::Display for RequestEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} (session {}, priority {})",
            self.topic, self.action_id, self.session_id, self.priority
        )
    }
}

/// Errors parsing a wire message
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Not valid JSON or missing fields
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message type other than the request type
    #[error("unexpected message type '{0}'")]
    UnexpectedType(String),

    /// Topic outside the known families
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),
}

#[derive(Serialize, Deserialize)]
struct WireMessage<'a> {
    #[serde(rename = "type", borrow)]
    kind: std::borrow::Cow<'a, str>,
    #[serde(borrow)]
    topic: std::borrow::Cow<'a, str>,
    #[serde(borrow)]
    data: WireData<'a>,
}

#[derive(Serialize, Deserialize)]
struct WireData<'a> {
    header: WireHeader,
    #[serde(borrow)]
    parameter: std::borrow::Cow<'a, str>,
}

#[derive(Serialize, Deserialize)]
struct WireHeader {
    identity: WireIdentity,
    policy: WirePolicy,
}

#[derive(Serialize, Deserialize)]
struct WireIdentity {
    id: u64,
    api_id: u32,
}

#[derive(Serialize, Deserialize)]
struct WirePolicy {
    priority: u8,
}

impl<'a> From<&'a RequestEnvelope> for WireMessage<'a> {
    fn from(envelope: &'a RequestEnvelope) -> Self {
        WireMessage {
            kind: crate::WIRE_MESSAGE_TYPE.into(),
            topic: envelope.topic.into(),
            data: WireData {
                header: WireHeader {
                    identity: WireIdentity {
                        id: envelope.session_id,
                        api_id: envelope.action_id,
                    },
                    policy: WirePolicy {
                        priority: envelope.priority,
                    },
                },
                parameter: envelope.parameter.as_str().into(),
            },
        }
    }
}
