//! Cryptographic primitives for Tether.
//!
//! This crate provides:
//! - Ed25519 identity keys and Tether IDs
//! - X25519 ephemeral Diffie-Hellman with two derivation entry points
//!   (`ecdh` for the initiator, `ecdhe` for the responder)
//! - SHA-256 transcript hashing
//! - ChaCha20 and ChaCha20-Poly1305 for application frames
//!
//! Every key, digest, signature and nonce is a fixed-size array so that
//! length mismatches surface at construction instead of deep inside a
//! primitive.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod digest;
pub mod ephemeral;
pub mod error;
pub mod identity;

pub use cipher::{Nonce, MAC_SIZE, NONCE_SIZE};
pub use digest::{sha256, Digest32, TranscriptHasher};
pub use ephemeral::{ecdh, ecdhe, EphemeralKeypair, EphemeralPublic, SharedKey};
pub use error::CryptoError;
pub use identity::{verify_with, IdentityKeypair, PublicIdentity, TetherId};

/// Length of every public key exchanged in a handshake (Ed25519 and X25519).
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Length of an Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;
