//! SHA-256 transcript hashing.
//!
//! ```
//! use tether_crypto::digest::TranscriptHasher;
//!
//! let digest = TranscriptHasher::new()
//!     .absorb_u8(0)
//!     .absorb(b"127.0.0.1")
//!     .absorb_u32_le(7000)
//!     .finalize();
//! assert_eq!(digest.len(), 32);
//! ```

use sha2::{Digest, Sha256};

/// A 32-byte digest.
pub type Digest32 = [u8; 32];

/// Absorbs ordered byte chunks and produces a SHA-256 digest.
///
/// Chunks are concatenated without separators, so callers own the
/// framing of whatever they absorb.
#[derive(Clone, Default)]
pub struct TranscriptHasher {
    inner: Sha256,
}

impl TranscriptHasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    pub fn absorb(mut self, bytes: &[u8]) -> Self {
        self.inner.update(bytes);
        self
    }

    pub fn absorb_u8(self, value: u8) -> Self {
        self.absorb(&[value])
    }

    pub fn absorb_u32_le(self, value: u32) -> Self {
        self.absorb(&value.to_le_bytes())
    }

    pub fn finalize(self) -> Digest32 {
        self.inner.finalize().into()
    }
}

/// One-shot SHA-256.
pub fn sha256(bytes: &[u8]) -> Digest32 {
    TranscriptHasher::new().absorb(bytes).finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // SHA-256("abc")
        let expected = [
            0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
            0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
            0xf2, 0x00, 0x15, 0xad,
        ];
        assert_eq!(sha256(b"abc"), expected);
    }

    #[test]
    fn test_chunking_is_concatenation() {
        let chunked = TranscriptHasher::new()
            .absorb(b"a")
            .absorb_u8(b'b')
            .absorb(b"c")
            .finalize();
        assert_eq!(chunked, sha256(b"abc"));
    }

    #[test]
    fn test_u32_is_little_endian() {
        let a = TranscriptHasher::new().absorb_u32_le(0x0102_0304).finalize();
        let b = sha256(&[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(a, b);
    }
}
