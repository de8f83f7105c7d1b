use thiserror::Error;

/// Failures reported by the primitive adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("signing failed")]
    Signing,

    #[error("signature verification failed")]
    BadSignature,

    #[error("key agreement produced a non-contributory secret")]
    NonContributory,

    #[error("encryption failed")]
    Encryption,

    #[error("authentication tag mismatch")]
    Authentication,

    #[error("ciphertext too short: {0} bytes")]
    CiphertextTooShort(usize),
}
