//! X25519 ephemeral keys and session key derivation.
//!
//! The handshake uses two derivation entry points:
//!
//! - [`ecdh`]: the initiator generated its [`EphemeralKeypair`] before sending
//!   its handshake message and consumes it here against the responder's
//!   ephemeral public key.
//! - [`ecdhe`]: the responder generates its ephemeral keypair and derives the
//!   session key against the initiator's ephemeral public key in one step.
//!
//! Both run X25519 and hash the DH output with SHA-256 under a fixed label,
//! so a completed handshake leaves both sides with the same [`SharedKey`].
//! The ephemeral secret is moved into the derivation and cannot be reused.

use std::fmt;

use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::digest::TranscriptHasher;
use crate::error::CryptoError;
use crate::PUBLIC_KEY_SIZE;

const SESSION_KEY_LABEL: &[u8] = b"tether-session-key-v1";

/// X25519 public key sent in a handshake message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EphemeralPublic(pub [u8; PUBLIC_KEY_SIZE]);

impl EphemeralPublic {
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

/// Symmetric key shared by both peers after a successful handshake.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Single-use X25519 keypair generated per handshake attempt.
pub struct EphemeralKeypair {
    secret: EphemeralSecret,
    public: EphemeralPublic,
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = EphemeralPublic(*PublicKey::from(&secret).as_bytes());
        Self { secret, public }
    }

    pub fn public(&self) -> EphemeralPublic {
        self.public
    }
}

impl fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Initiator-side derivation: consume our ephemeral secret against the
/// peer's ephemeral public key.
pub fn ecdh(own: EphemeralKeypair, peer: &EphemeralPublic) -> Result<SharedKey, CryptoError> {
    let shared = own.secret.diffie_hellman(&PublicKey::from(peer.0));
    session_key(shared)
}

/// Responder-side derivation: generate a fresh ephemeral keypair and derive
/// against the peer's ephemeral public key. Returns our public half for the
/// reply.
pub fn ecdhe(peer: &EphemeralPublic) -> Result<(EphemeralPublic, SharedKey), CryptoError> {
    let own = EphemeralKeypair::generate();
    let public = own.public();
    let key = ecdh(own, peer)?;
    Ok((public, key))
}

fn session_key(shared: SharedSecret) -> Result<SharedKey, CryptoError> {
    // Low-order peer points give an all-zero secret.
    if !shared.was_contributory() {
        return Err(CryptoError::NonContributory);
    }

    let key = TranscriptHasher::new()
        .absorb(SESSION_KEY_LABEL)
        .absorb(shared.as_bytes())
        .finalize();

    Ok(SharedKey(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecdh_and_ecdhe_agree() {
        let initiator = EphemeralKeypair::generate();
        let initiator_public = initiator.public();

        let (responder_public, responder_key) = ecdhe(&initiator_public).unwrap();
        let initiator_key = ecdh(initiator, &responder_public).unwrap();

        assert_eq!(initiator_key, responder_key);
    }

    #[test]
    fn test_fresh_keypairs_differ() {
        let a = EphemeralKeypair::generate();
        let b = EphemeralKeypair::generate();
        assert_ne!(a.public(), b.public());
    }

    #[test]
    fn test_low_order_point_rejected() {
        let own = EphemeralKeypair::generate();
        let zero = EphemeralPublic([0u8; 32]);
        assert_eq!(ecdh(own, &zero), Err(CryptoError::NonContributory));
        assert!(ecdhe(&zero).is_err());
    }

    #[test]
    fn test_shared_key_debug_is_redacted() {
        let key = SharedKey::from_bytes([0xAB; 32]);
        assert_eq!(format!("{:?}", key), "SharedKey(..)");
    }
}
