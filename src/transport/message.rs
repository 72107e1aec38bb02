//! Wire protocol
//!
//! Clients send one JSON object per line, tagged by `action`. The server
//! answers with a JSON welcome on connect and plain text lines afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::error::ProtocolError;

/// Messages a client sends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    Register {
        identity: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    Subscribe {
        #[serde(alias = "event")]
        topic: String,
    },
    Unsubscribe {
        #[serde(alias = "event")]
        topic: String,
    },
}

impl ClientMessage {
    /// Encodes the message as one protocol line, without the newline.
    pub fn to_line(&self) -> String {
        // A tagged enum of strings always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Loose view of a client line; fields are checked per action so a missing
/// field gets its own rejection instead of a parse error.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    action: Option<String>,
    identity: Option<String>,
    email: Option<String>,
    topic: Option<String>,
    /// Older clients name the topic `event`; `topic` wins when both are set.
    event: Option<String>,
}

/// A parsed client request. Missing or blank fields are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Register {
        identity: Option<String>,
        email: Option<String>,
    },
    Subscribe {
        topic: Option<String>,
    },
    Unsubscribe {
        topic: Option<String>,
    },
    Unknown {
        action: String,
    },
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ClientRequest {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|source| ProtocolError::Malformed { source })?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        let envelope: Envelope =
            serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { source })?;

        let action = envelope.action.unwrap_or_default();
        Ok(match action.as_str() {
            "register" => ClientRequest::Register {
                identity: non_blank(envelope.identity),
                email: non_blank(envelope.email),
            },
            "subscribe" => ClientRequest::Subscribe {
                topic: non_blank(envelope.topic).or_else(|| non_blank(envelope.event)),
            },
            "unsubscribe" => ClientRequest::Unsubscribe {
                topic: non_blank(envelope.topic).or_else(|| non_blank(envelope.event)),
            },
            _ => ClientRequest::Unknown { action },
        })
    }
}

/// Payload sent as soon as a connection is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Welcome {
    pub message: String,
    pub topics: Vec<String>,
}

impl Welcome {
    pub fn new(topics: &[String]) -> Self {
        Self {
            message: "Welcome! Register with {\"action\": \"register\", \"identity\": \"<you>\"}, then subscribe to one of the topics.".to_string(),
            topics: topics.to_vec(),
        }
    }
}

/// Plain-text acknowledgements and notices sent to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply {
    Registered(String),
    Subscribed(String),
    Unsubscribed(String),
    UnknownAction(String),
    ServerFull,
}

impl fmt::Display for ServerReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerReply::Registered(identity) => write!(f, "Registered as '{identity}'."),
            ServerReply::Subscribed(topic) => write!(f, "Subscribed to '{topic}'."),
            ServerReply::Unsubscribed(topic) => write!(f, "Unsubscribed from '{topic}'."),
            ServerReply::UnknownAction(action) => write!(f, "Unknown action '{action}'."),
            ServerReply::ServerFull => write!(f, "Server is full, try again later."),
        }
    }
}
