//! Core Tether protocol types, framing, and constants.
//!
//! This crate provides:
//! - Status codes shared by both peers
//! - The signed handshake message and its transcript digest
//! - Encrypted application frames and the channel codec
//! - The RPC envelope carrying the `Kex` and `Message` calls

#![forbid(unsafe_code)]

pub mod codec;
pub mod frame;
pub mod handshake;
pub mod rpc;

use std::fmt;

pub use codec::{ChannelCodec, ChannelError};
pub use frame::{AcceptNoIntegrity, CipherMode, CipherSuite, Frame, MessageType};
pub use handshake::HandshakeMessage;
pub use rpc::{RpcFault, RpcRequest, RpcResponse, METHOD_KEX, METHOD_MESSAGE};

/// Longest address a peer may advertise in a handshake message.
pub const MAX_ADDRESS_LEN: usize = 255;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("buffer too short: {0} bytes, need {1}")]
    TooShort(usize, usize),
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("unknown status code: {0}")]
    UnknownStatus(u32),
    #[error("unknown cipher mode: 0x{0:02x}")]
    UnknownCipherMode(u8),
    #[error("unknown message type: 0x{0:02x}")]
    UnknownMessageType(u8),
    #[error("address too long: {0} bytes, max 255")]
    AddressTooLong(usize),
    #[error("address is not valid UTF-8")]
    InvalidAddress,
    #[error("port out of range: {0}")]
    PortOutOfRange(u32),
    #[error("envelope error: {0}")]
    Envelope(String),
}

/// Result codes exchanged between peers.
///
/// The numeric values are part of the wire contract: they appear as one
/// byte in handshake messages and as the `u32` result of the `Message` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    Failed = 1,
    /// A handshake signature did not verify.
    FailedValidationKex = 2,
    /// A frame decrypted but its message type is not accepted by `Message`.
    InvalidFunctionPerType = 3,
}

impl StatusCode {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(value as u32)
    }
}

impl TryFrom<u32> for StatusCode {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::Failed),
            2 => Ok(Self::FailedValidationKex),
            3 => Ok(Self::InvalidFunctionPerType),
            _ => Err(ProtocolError::UnknownStatus(value)),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::FailedValidationKex => "FAILED_VALIDATION_KEX",
            Self::InvalidFunctionPerType => "INVALID_FUNCTION_PER_TYPE",
        };
        f.write_str(name)
    }
}
