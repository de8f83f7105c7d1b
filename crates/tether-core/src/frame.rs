//! Encrypted application frame (`Message` request body).
//!
//! # Wire Format
//!
//! ```text
//! +-------------+--------------+-----------+---------------------------------+
//! | cipher mode | message type | nonce     | ciphertext [|| 16-byte tag]     |
//! | 1 byte      | 1 byte       | 12 bytes  | variable                        |
//! +-------------+--------------+-----------+---------------------------------+
//! ```
//!
//! The tag is present iff the cipher mode is `ChaCha20Poly1305`.

use bytes::{BufMut, Bytes, BytesMut};
use tether_crypto::{Nonce, NONCE_SIZE};

use crate::ProtocolError;

/// Frame header size (mode + type + nonce).
pub const FRAME_HEADER_SIZE: usize = 2 + NONCE_SIZE;

/// Cipher mode tag carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CipherMode {
    /// ChaCha20 without authentication.
    ChaCha20 = 0x00,
    /// ChaCha20-Poly1305 AEAD.
    ChaCha20Poly1305 = 0x01,
}

impl CipherMode {
    pub fn is_authenticated(self) -> bool {
        matches!(self, Self::ChaCha20Poly1305)
    }
}

impl TryFrom<u8> for CipherMode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::ChaCha20),
            0x01 => Ok(Self::ChaCha20Poly1305),
            _ => Err(ProtocolError::UnknownCipherMode(value)),
        }
    }
}

/// Message type tag carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Application text pushed onto the receiver's inbound queue.
    Data = 0x01,
    /// Orderly close notice. Not accepted by the `Message` call.
    Close = 0x02,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Data),
            0x02 => Ok(Self::Close),
            _ => Err(ProtocolError::UnknownMessageType(value)),
        }
    }
}

/// Acknowledgment that frames sent under the unauthenticated cipher can be
/// modified in transit without the receiver noticing.
///
/// This is the only way to obtain [`CipherSuite::ChaCha20Unauthenticated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptNoIntegrity(());

impl AcceptNoIntegrity {
    pub fn frames_can_be_forged_undetected() -> Self {
        Self(())
    }
}

/// Cipher used for outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherSuite {
    #[default]
    ChaCha20Poly1305,
    /// Confidentiality only. Tampered frames decrypt "successfully" to
    /// garbage.
    ChaCha20Unauthenticated(AcceptNoIntegrity),
}

impl CipherSuite {
    pub fn authenticated() -> Self {
        Self::ChaCha20Poly1305
    }

    pub fn unauthenticated(ack: AcceptNoIntegrity) -> Self {
        Self::ChaCha20Unauthenticated(ack)
    }

    pub fn mode(&self) -> CipherMode {
        match self {
            Self::ChaCha20Poly1305 => CipherMode::ChaCha20Poly1305,
            Self::ChaCha20Unauthenticated(_) => CipherMode::ChaCha20,
        }
    }
}

/// An encrypted application payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cipher_mode: CipherMode,
    pub message_type: MessageType,
    pub nonce: Nonce,
    pub ciphertext: Vec<u8>,
}

impl Frame {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.ciphertext.len());
        buf.put_u8(self.cipher_mode as u8);
        buf.put_u8(self.message_type as u8);
        buf.put_slice(&self.nonce.0);
        buf.put_slice(&self.ciphertext);
        buf.freeze()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::TooShort(buf.len(), FRAME_HEADER_SIZE));
        }

        let cipher_mode = CipherMode::try_from(buf[0])?;
        let message_type = MessageType::try_from(buf[1])?;

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&buf[2..FRAME_HEADER_SIZE]);

        Ok(Self {
            cipher_mode,
            message_type,
            nonce: Nonce(nonce),
            ciphertext: buf[FRAME_HEADER_SIZE..].to_vec(),
        })
    }
}
