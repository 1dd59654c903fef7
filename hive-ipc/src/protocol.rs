//! IPC protocol definitions and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// IPC protocol version for compatibility checking
pub const IPC_PROTOCOL_VERSION: u32 = 1;

/// Reserved control opcodes exchanged between manager and workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    /// Worker -> manager, sent once right after connecting
    Register,
    /// Manager -> worker heartbeat
    Ping,
    /// Worker -> manager heartbeat reply
    Pong,
    /// Manager -> worker shutdown signal
    Stop,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Register => "register",
            Opcode::Ping => "ping",
            Opcode::Pong => "pong",
            Opcode::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// A message carried by a channel.
///
/// The adjacent tag keeps control opcodes apart from application payloads no
/// matter what the payload contains: a payload holding the string `"stop"` is
/// still a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Message {
    /// Reserved control opcode
    Control(Opcode),

    /// Opaque application data
    Payload(JsonValue),
}

impl Message {
    /// Wrap any JSON value as a payload message
    pub fn payload(value: impl Into<JsonValue>) -> Self {
        Message::Payload(value.into())
    }

    /// Returns the opcode if this is a control message
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Message::Control(op) => Some(*op),
            Message::Payload(_) => None,
        }
    }

    /// True for the acknowledgements the manager consumes silently
    pub fn is_acknowledgement(&self) -> bool {
        matches!(self.opcode(), Some(Opcode::Pong | Opcode::Register))
    }
}

impl From<Opcode> for Message {
    fn from(op: Opcode) -> Self {
        Message::Control(op)
    }
}

/// Message envelope for all IPC communications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub timestamp: DateTime<Utc>,
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    /// Create a new message envelope
    pub fn new(message: T) -> Self {
        Self {
            protocol_version: IPC_PROTOCOL_VERSION,
            timestamp: Utc::now(),
            message,
        }
    }

    /// Check if protocol version is compatible
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == IPC_PROTOCOL_VERSION
    }
}
