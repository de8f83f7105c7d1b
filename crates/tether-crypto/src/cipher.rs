//! Symmetric ciphers for application frames.
//!
//! - [`stream_xor`]: plain ChaCha20 (IETF, 96-bit nonce). Confidentiality
//!   only; a flipped ciphertext bit decrypts to a flipped plaintext bit.
//! - [`seal`] / [`open`]: ChaCha20-Poly1305 with detachable associated data.
//!   The 16-byte tag is appended to the ciphertext.
//!
//! Nonces are random per frame ([`Nonce::random`]). With 96-bit random
//! nonces a single key should stay well below 2^32 frames.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305,
};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::ephemeral::SharedKey;
use crate::error::CryptoError;

/// Nonce length shared by both cipher modes.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag length.
pub const MAC_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Fresh nonce from the OS CSPRNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

/// Apply the ChaCha20 keystream. Encryption and decryption are the same call.
pub fn stream_xor(key: &SharedKey, nonce: &Nonce, data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    let mut cipher = ChaCha20::new(key.as_bytes().into(), (&nonce.0).into());
    cipher.apply_keystream(&mut out);
    out
}

/// ChaCha20-Poly1305 encrypt. Output is `plaintext.len() + MAC_SIZE` bytes.
pub fn seal(
    key: &SharedKey,
    nonce: &Nonce,
    associated_data: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(
            (&nonce.0).into(),
            Payload {
                msg: plaintext,
                aad: associated_data,
            },
        )
        .map_err(|_| CryptoError::Encryption)
}

/// ChaCha20-Poly1305 decrypt. No plaintext is returned unless the tag
/// verifies over both the ciphertext and `associated_data`.
pub fn open(
    key: &SharedKey,
    nonce: &Nonce,
    associated_data: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < MAC_SIZE {
        return Err(CryptoError::CiphertextTooShort(ciphertext.len()));
    }

    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(
            (&nonce.0).into(),
            Payload {
                msg: ciphertext,
                aad: associated_data,
            },
        )
        .map_err(|_| CryptoError::Authentication)
}
