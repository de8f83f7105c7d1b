//! RPC envelope.
//!
//! Every call is one request and one response, each carried in a single
//! transport frame. The envelope is bincode; the bodies inside it are the
//! fixed wire formats of [`HandshakeMessage`](crate::HandshakeMessage),
//! [`Frame`](crate::Frame) and the `u32` status result.

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ProtocolError, StatusCode};

/// Handshake request/response.
pub const METHOD_KEX: &str = "Kex";

/// Encrypted application payload, answered with a `u32` status.
pub const METHOD_MESSAGE: &str = "Message";

/// Upper bound for one encoded envelope.
pub const MAX_ENVELOPE_SIZE: u64 = 1024 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_ENVELOPE_SIZE)
        .reject_trailing_bytes()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub body: Vec<u8>,
}

/// Transport-level failure reported by the serving side.
///
/// Handlers themselves never produce faults: protocol failures travel as
/// status codes inside a normal response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RpcFault {
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error("server shutting down")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResponse {
    Ok(Vec<u8>),
    Fault(RpcFault),
}

impl RpcRequest {
    pub fn new(method: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: method.to_string(),
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        options()
            .serialize(self)
            .map_err(|e| ProtocolError::Envelope(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        options()
            .deserialize(bytes)
            .map_err(|e| ProtocolError::Envelope(e.to_string()))
    }
}

impl RpcResponse {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        options()
            .serialize(self)
            .map_err(|e| ProtocolError::Envelope(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        options()
            .deserialize(bytes)
            .map_err(|e| ProtocolError::Envelope(e.to_string()))
    }
}

/// Body of a `Message` response.
pub fn encode_status(status: StatusCode) -> [u8; 4] {
    status.as_u32().to_be_bytes()
}

pub fn decode_status(body: &[u8]) -> Result<StatusCode, ProtocolError> {
    let raw: [u8; 4] = body
        .try_into()
        .map_err(|_| ProtocolError::TooShort(body.len(), 4))?;
    StatusCode::try_from(u32::from_be_bytes(raw))
}
