//! Client message envelope and its text wire format
//!
//! Wire format: `<message id> <command>[ <JSON arguments>]`, for example
//! `-1 reload_ff 23` or `12 sub "room.alice"`. Message id `-1` marks a
//! server-initiated message; client ids start at 1.

use serde_json::Value;

use crate::{EnvelopeError, Result};

/// Message id used for messages the server originates
pub const SERVER_MESSAGE_ID: i64 = -1;

/// Transport framing of an inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

/// Argument payload carried by a message
#[derive(Debug, Clone, PartialEq)]
pub enum Arguments {
    /// No arguments were sent
    None,
    /// Decoded JSON arguments
    Json(Value),
    /// Instructs the connection handler to close the client so it reconnects
    /// elsewhere. Never serialized onto the wire.
    CloseRebalance,
}

impl Arguments {
    /// JSON text for the wire, if the arguments have a wire form
    pub fn to_json(&self) -> Option<String> {
        match self {
            Arguments::Json(value) => Some(value.to_string()),
            Arguments::None | Arguments::CloseRebalance => None,
        }
    }

    /// Opaque payload forwarded to the backend as `clientData`
    pub fn as_payload(&self) -> String {
        self.to_json().unwrap_or_default()
    }

    pub fn is_close_rebalance(&self) -> bool {
        matches!(self, Arguments::CloseRebalance)
    }
}

/// A message exchanged with a connected client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMessage {
    pub message_id: i64,
    pub command: String,
    pub arguments: Arguments,
}

impl ClientMessage {
    pub fn new(message_id: i64, command: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            message_id,
            command: command.into(),
            arguments,
        }
    }

    /// Server-originated message with JSON arguments
    pub fn from_server(command: impl Into<String>, arguments: Value) -> Self {
        Self::new(SERVER_MESSAGE_ID, command, Arguments::Json(arguments))
    }

    /// Sentinel message asking the connection layer to drop the client
    pub fn close_rebalance() -> Self {
        Self::new(0, String::new(), Arguments::CloseRebalance)
    }

    /// Render the message in the text wire format
    pub fn to_wire(&self) -> String {
        match self.arguments.to_json() {
            Some(args) => format!("{} {} {}", self.message_id, self.command, args),
            None => format!("{} {}", self.message_id, self.command),
        }
    }
}

/// Decode a raw inbound payload into a [`ClientMessage`]
pub fn parse_client_message(data: &[u8], frame: FrameKind) -> Result<ClientMessage> {
    if frame == FrameKind::Binary {
        return Err(EnvelopeError::BinaryFrame);
    }

    let text = std::str::from_utf8(data).map_err(|_| EnvelopeError::Malformed)?;

    let (id_str, rest) = text.split_once(' ').ok_or(EnvelopeError::Malformed)?;
    let message_id: i64 = id_str
        .parse()
        .map_err(|_| EnvelopeError::InvalidMessageId(id_str.to_string()))?;
    if message_id == 0 || message_id < SERVER_MESSAGE_ID {
        return Err(EnvelopeError::InvalidMessageId(id_str.to_string()));
    }

    let (command, arguments) = match rest.split_once(' ') {
        Some((command, args)) => (command, Arguments::Json(serde_json::from_str(args)?)),
        None => (rest, Arguments::None),
    };
    if command.is_empty() {
        return Err(EnvelopeError::Malformed);
    }

    Ok(ClientMessage {
        message_id,
        command: command.to_string(),
        arguments,
    })
}
