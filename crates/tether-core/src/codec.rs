//! Channel codec: application payloads to and from [`Frame`]s under the
//! session key.
//!
//! Associated data is exactly `[message_type, cipher_mode]`. In the
//! authenticated mode a change to either tag, the nonce, or the ciphertext
//! fails decryption. In the unauthenticated mode decryption always
//! succeeds, whatever happened to the frame on the way.

use tether_crypto::{cipher, CryptoError, Digest32, Nonce, SharedKey, TranscriptHasher};
use thiserror::Error;

use crate::frame::{CipherMode, CipherSuite, Frame, MessageType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("encryption failed: {0}")]
    Encryption(CryptoError),

    #[error("frame failed authentication")]
    Authentication,
}

pub fn associated_data(message_type: MessageType, cipher_mode: CipherMode) -> [u8; 2] {
    [message_type as u8, cipher_mode as u8]
}

/// Encrypts and decrypts frames with one session key.
#[derive(Debug, Clone)]
pub struct ChannelCodec {
    key: SharedKey,
}

impl ChannelCodec {
    pub fn new(key: SharedKey) -> Self {
        Self { key }
    }

    /// Digest identifying the session key without revealing it. Two peers
    /// holding the same key report the same fingerprint.
    pub fn fingerprint(&self) -> Digest32 {
        TranscriptHasher::new()
            .absorb(b"tether-key-fingerprint-v1")
            .absorb(self.key.as_bytes())
            .finalize()
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn encrypt(
        &self,
        suite: &CipherSuite,
        message_type: MessageType,
        plaintext: &[u8],
    ) -> Result<Frame, ChannelError> {
        let cipher_mode = suite.mode();
        let nonce = Nonce::random();

        let ciphertext = match cipher_mode {
            CipherMode::ChaCha20 => cipher::stream_xor(&self.key, &nonce, plaintext),
            CipherMode::ChaCha20Poly1305 => {
                let ad = associated_data(message_type, cipher_mode);
                cipher::seal(&self.key, &nonce, &ad, plaintext)
                    .map_err(ChannelError::Encryption)?
            }
        };

        Ok(Frame {
            cipher_mode,
            message_type,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt `frame` using the cipher mode it declares.
    pub fn decrypt(&self, frame: &Frame) -> Result<Vec<u8>, ChannelError> {
        match frame.cipher_mode {
            CipherMode::ChaCha20 => Ok(cipher::stream_xor(
                &self.key,
                &frame.nonce,
                &frame.ciphertext,
            )),
            CipherMode::ChaCha20Poly1305 => {
                let ad = associated_data(frame.message_type, frame.cipher_mode);
                cipher::open(&self.key, &frame.nonce, &ad, &frame.ciphertext)
                    .map_err(|_| ChannelError::Authentication)
            }
        }
    }
}
