//! Ed25519 identity keys and Tether ID.
//!
//! Every peer holds one long-term identity keypair for the lifetime of its
//! session controller. Handshake messages are signed with it, and the
//! public half travels inside every handshake message.
//!
//! A **Tether ID** is the base64url-encoded Ed25519 public key
//! (32 bytes → 43 characters). It is only a display form; nothing on the
//! wire uses it.
//!
//! # Example
//!
//! ```
//! use tether_crypto::identity::{IdentityKeypair, PublicIdentity};
//!
//! let keypair = IdentityKeypair::generate();
//! let digest = [7u8; 32];
//! let signature = keypair.sign(&digest).unwrap();
//!
//! let public = PublicIdentity::from_bytes(&keypair.public_key_bytes()).unwrap();
//! assert!(public.verify(&digest, &signature).is_ok());
//! ```

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use std::fs;
use std::path::Path;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE};

/// Tether ID: base64url-encoded Ed25519 public key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TetherId(String);

impl TetherId {
    /// Create a Tether ID from raw public key bytes.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TetherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TetherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TetherId({})", self.0)
    }
}

/// Ed25519 identity keypair.
///
/// The signing key never leaves this type except through
/// [`IdentityKeypair::save`]. `SigningKey` zeroizes itself on drop.
pub struct IdentityKeypair {
    signing_key: SigningKey,
}

impl IdentityKeypair {
    /// Generate a new random keypair using the OS CSPRNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from raw signing key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        Self { signing_key }
    }

    pub fn tether_id(&self) -> TetherId {
        TetherId::from_bytes(self.signing_key.verifying_key().as_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.signing_key.verifying_key().as_bytes()
    }

    /// Sign `message` (in practice a 32-byte transcript digest).
    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_SIZE], CryptoError> {
        self.signing_key
            .try_sign(message)
            .map(|sig| sig.to_bytes())
            .map_err(|_| CryptoError::Signing)
    }

    /// Save keypair to files.
    ///
    /// Private key is saved with restricted permissions (0600 on Unix).
    pub fn save(&self, private_path: impl AsRef<Path>, public_path: impl AsRef<Path>) -> Result<()> {
        let private_path = private_path.as_ref();
        let mut private_bytes = self.signing_key.to_bytes();
        let written = fs::write(private_path, private_bytes);
        private_bytes.zeroize();
        written.with_context(|| format!("failed to write {}", private_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(private_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(private_path, perms)?;
        }

        fs::write(public_path.as_ref(), self.public_key_bytes())?;

        Ok(())
    }

    /// Load keypair from private key file.
    pub fn load(private_path: impl AsRef<Path>) -> Result<Self> {
        let mut bytes = fs::read(private_path.as_ref()).context("failed to read private key")?;

        if bytes.len() != 32 {
            bytes.zeroize();
            anyhow::bail!("invalid private key length: expected 32 bytes");
        }

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&bytes);
        bytes.zeroize();

        let keypair = Self::from_bytes(&key_bytes);
        key_bytes.zeroize();

        Ok(keypair)
    }

    /// Load only the public key (for verification).
    pub fn load_public(public_path: impl AsRef<Path>) -> Result<PublicIdentity> {
        let bytes = fs::read(public_path.as_ref()).context("failed to read public key")?;

        let key_bytes: [u8; PUBLIC_KEY_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("invalid public key length: expected 32 bytes"))?;

        PublicIdentity::from_bytes(&key_bytes).context("invalid public key")
    }
}

impl fmt::Debug for IdentityKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeypair")
            .field("id", &self.tether_id())
            .finish_non_exhaustive()
    }
}

/// Public identity (verifying key only).
///
/// Verification proves that a message was signed by the holder of this key.
/// It says nothing about whether the key belongs to a peer the caller trusts;
/// pinning or trust-on-first-use is the caller's decision.
#[derive(Debug, Clone)]
pub struct PublicIdentity {
    verifying_key: VerifyingKey,
}

impl PublicIdentity {
    /// Create from raw public key bytes. Fails for bytes that are not a valid
    /// curve point.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self, CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { verifying_key })
    }

    pub fn tether_id(&self) -> TetherId {
        TetherId::from_bytes(self.verifying_key.as_bytes())
    }

    /// Verify a signature. Weak keys and non-canonical signatures are rejected.
    pub fn verify(
        &self,
        message: &[u8],
        signature: &[u8; SIGNATURE_SIZE],
    ) -> Result<(), CryptoError> {
        let sig = Signature::from_bytes(signature);
        self.verifying_key
            .verify_strict(message, &sig)
            .map_err(|_| CryptoError::BadSignature)
    }
}

/// Verify `signature` over `message` against raw public key bytes.
pub fn verify_with(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<(), CryptoError> {
    PublicIdentity::from_bytes(public_key)?.verify(message, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let keypair = IdentityKeypair::generate();
        let tether_id = keypair.tether_id();

        // 32 bytes base64url without padding
        assert_eq!(tether_id.as_str().len(), 43);
    }

    #[test]
    fn test_sign_verify() {
        let keypair = IdentityKeypair::generate();
        let message = b"hello tether";

        let signature = keypair.sign(message).unwrap();
        assert!(verify_with(&keypair.public_key_bytes(), message, &signature).is_ok());

        assert_eq!(
            verify_with(&keypair.public_key_bytes(), b"wrong message", &signature),
            Err(CryptoError::BadSignature)
        );
    }

    #[test]
    fn test_verify_against_other_key_fails() {
        let signer = IdentityKeypair::generate();
        let other = IdentityKeypair::generate();
        let signature = signer.sign(b"digest").unwrap();

        assert!(verify_with(&other.public_key_bytes(), b"digest", &signature).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let private_path = dir.path().join("peer.key");
        let public_path = dir.path().join("peer.pub");

        let keypair = IdentityKeypair::generate();
        keypair.save(&private_path, &public_path).unwrap();

        let restored = IdentityKeypair::load(&private_path).unwrap();
        assert_eq!(restored.public_key_bytes(), keypair.public_key_bytes());

        let public = IdentityKeypair::load_public(&public_path).unwrap();
        assert_eq!(public.tether_id(), keypair.tether_id());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&private_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_load_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.key");
        fs::write(&path, [1u8; 16]).unwrap();

        assert!(IdentityKeypair::load(&path).is_err());
        assert!(IdentityKeypair::load_public(&path).is_err());
    }
}
