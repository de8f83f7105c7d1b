//! Signed handshake message (`Kex` request and response).
//!
//! # Wire Format
//!
//! ```text
//! +--------+------------------+------------------+----------+-----------+--------+-------------+
//! | status | identity pubkey  | ephemeral pubkey | addr len | address   | port   | signature   |
//! | 1 byte | 32 bytes         | 32 bytes         | u16 BE   | addr len  | u32 BE | 64 bytes    |
//! +--------+------------------+------------------+----------+-----------+--------+-------------+
//! ```
//!
//! # Transcript
//!
//! The signature covers SHA-256 over, in this order:
//! `status (1 byte) || identity pubkey || ephemeral pubkey || address bytes || port (u32 LE)`.
//! The address is absorbed without its length prefix; it is the only
//! variable-length field, so the transcript stays unambiguous. Any peer
//! implementation must hash exactly these bytes or verification fails.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tether_crypto::{
    verify_with, CryptoError, Digest32, EphemeralPublic, IdentityKeypair, TranscriptHasher,
    PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
};

use crate::{ProtocolError, StatusCode, MAX_ADDRESS_LEN};

/// Encoded size of every field except the address bytes.
const FIXED_SIZE: usize = 1 + PUBLIC_KEY_SIZE + PUBLIC_KEY_SIZE + 2 + 4 + SIGNATURE_SIZE;

/// One leg of the key exchange.
///
/// A message whose status is not [`StatusCode::Success`] carries no
/// cryptographic guarantees: its keys are zero and its signature is not
/// checked by anyone. Callers must look at `status` before using any key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub status: StatusCode,
    /// Sender's long-term Ed25519 public key.
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    /// Sender's X25519 ephemeral public key for this handshake.
    pub ephemeral_key: EphemeralPublic,
    /// Address the sender claims to be reachable at.
    pub address: String,
    pub port: u16,
    pub signature: [u8; SIGNATURE_SIZE],
}

impl HandshakeMessage {
    /// Build an unsigned `Success` message.
    pub fn new(
        public_key: [u8; PUBLIC_KEY_SIZE],
        ephemeral_key: EphemeralPublic,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            status: StatusCode::Success,
            public_key,
            ephemeral_key,
            address: address.into(),
            port,
            signature: [0u8; SIGNATURE_SIZE],
        }
    }

    /// Unsigned rejection carrying only a status code.
    pub fn failure(status: StatusCode) -> Self {
        Self {
            status,
            public_key: [0u8; PUBLIC_KEY_SIZE],
            ephemeral_key: EphemeralPublic::default(),
            address: String::new(),
            port: 0,
            signature: [0u8; SIGNATURE_SIZE],
        }
    }

    pub fn generate_digest(&self) -> Digest32 {
        TranscriptHasher::new()
            .absorb_u8(self.status as u8)
            .absorb(&self.public_key)
            .absorb(self.ephemeral_key.as_bytes())
            .absorb(self.address.as_bytes())
            .absorb_u32_le(self.port as u32)
            .finalize()
    }

    /// Sign the transcript with `identity` and store the signature.
    pub fn sign(&mut self, identity: &IdentityKeypair) -> Result<(), CryptoError> {
        let digest = self.generate_digest();
        self.signature = identity.sign(&digest)?;
        Ok(())
    }

    /// Check the stored signature against the embedded identity key.
    ///
    /// This proves the message was produced by whoever holds `public_key`.
    /// It does not prove that key belongs to anyone in particular.
    pub fn verify(&self) -> Result<(), CryptoError> {
        let digest = self.generate_digest();
        verify_with(&self.public_key, &digest, &self.signature)
    }

    pub fn encoded_len(&self) -> usize {
        FIXED_SIZE + self.address.len()
    }

    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        if self.address.len() > MAX_ADDRESS_LEN {
            return Err(ProtocolError::AddressTooLong(self.address.len()));
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.status as u8);
        buf.put_slice(&self.public_key);
        buf.put_slice(self.ephemeral_key.as_bytes());
        buf.put_u16(self.address.len() as u16);
        buf.put_slice(self.address.as_bytes());
        buf.put_u32(self.port as u32);
        buf.put_slice(&self.signature);

        Ok(buf.freeze())
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < FIXED_SIZE {
            return Err(ProtocolError::TooShort(buf.len(), FIXED_SIZE));
        }

        let status = StatusCode::try_from(buf.get_u8())?;

        let mut public_key = [0u8; PUBLIC_KEY_SIZE];
        buf.copy_to_slice(&mut public_key);

        let mut ephemeral_key = [0u8; PUBLIC_KEY_SIZE];
        buf.copy_to_slice(&mut ephemeral_key);

        let address_len = buf.get_u16() as usize;
        if address_len > MAX_ADDRESS_LEN {
            return Err(ProtocolError::AddressTooLong(address_len));
        }
        let remaining_fixed = 4 + SIGNATURE_SIZE;
        if buf.remaining() < address_len + remaining_fixed {
            return Err(ProtocolError::TooShort(
                buf.remaining(),
                address_len + remaining_fixed,
            ));
        }
        let address = std::str::from_utf8(&buf[..address_len])
            .map_err(|_| ProtocolError::InvalidAddress)?
            .to_string();
        buf.advance(address_len);

        let raw_port = buf.get_u32();
        let port = u16::try_from(raw_port).map_err(|_| ProtocolError::PortOutOfRange(raw_port))?;

        let mut signature = [0u8; SIGNATURE_SIZE];
        buf.copy_to_slice(&mut signature);

        if buf.has_remaining() {
            return Err(ProtocolError::TrailingBytes(buf.remaining()));
        }

        Ok(Self {
            status,
            public_key,
            ephemeral_key: EphemeralPublic(ephemeral_key),
            address,
            port,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_crypto::EphemeralKeypair;

    fn signed(identity: &IdentityKeypair) -> HandshakeMessage {
        let eph = EphemeralKeypair::generate();
        let mut msg = HandshakeMessage::new(
            identity.public_key_bytes(),
            eph.public(),
            "10.0.0.7",
            7000,
        );
        msg.sign(identity).unwrap();
        msg
    }

    #[test]
    fn test_sign_then_verify() {
        let identity = IdentityKeypair::generate();
        assert!(signed(&identity).verify().is_ok());
    }

    #[test]
    fn test_every_signed_field_is_covered() {
        let identity = IdentityKeypair::generate();
        let msg = signed(&identity);

        let mut status = msg.clone();
        status.status = StatusCode::Failed;
        assert!(status.verify().is_err());

        let mut public_key = msg.clone();
        public_key.public_key[0] ^= 0x01;
        assert!(public_key.verify().is_err());

        let mut ephemeral = msg.clone();
        ephemeral.ephemeral_key.0[31] ^= 0x80;
        assert!(ephemeral.verify().is_err());

        let mut address = msg.clone();
        address.address = "10.0.0.8".to_string();
        assert!(address.verify().is_err());

        let mut port = msg.clone();
        port.port = 7001;
        assert!(port.verify().is_err());

        let mut signature = msg;
        signature.signature[10] ^= 0x01;
        assert!(signature.verify().is_err());
    }

    #[test]
    fn test_signature_bound_to_embedded_key() {
        let signer = IdentityKeypair::generate();
        let other = IdentityKeypair::generate();

        let mut msg = signed(&signer);
        msg.public_key = other.public_key_bytes();
        assert!(msg.verify().is_err());
    }

    #[test]
    fn test_digest_layout() {
        let msg = HandshakeMessage {
            status: StatusCode::Success,
            public_key: [1u8; 32],
            ephemeral_key: EphemeralPublic([2u8; 32]),
            address: "ab".to_string(),
            port: 0x0102,
            signature: [0u8; 64],
        };

        let mut transcript = vec![0u8];
        transcript.extend_from_slice(&[1u8; 32]);
        transcript.extend_from_slice(&[2u8; 32]);
        transcript.extend_from_slice(b"ab");
        transcript.extend_from_slice(&[0x02, 0x01, 0x00, 0x00]);

        assert_eq!(msg.generate_digest(), tether_crypto::sha256(&transcript));
    }

    #[test]
    fn test_failure_message_does_not_verify() {
        let msg = HandshakeMessage::failure(StatusCode::FailedValidationKex);
        assert_eq!(msg.status, StatusCode::FailedValidationKex);
        assert!(msg.verify().is_err());
    }

    #[test]
    fn test_wire_layout() {
        let identity = IdentityKeypair::generate();
        let msg = signed(&identity);
        let bytes = msg.encode().unwrap();

        assert_eq!(bytes.len(), msg.encoded_len());
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..33], &identity.public_key_bytes());
        assert_eq!(&bytes[65..67], &8u16.to_be_bytes());
        assert_eq!(&bytes[67..75], b"10.0.0.7");
        assert_eq!(&bytes[75..79], &7000u32.to_be_bytes());

        let decoded = HandshakeMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.verify().is_ok());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let identity = IdentityKeypair::generate();
        let bytes = signed(&identity).encode().unwrap();

        assert!(matches!(
            HandshakeMessage::decode(&bytes[..10]),
            Err(ProtocolError::TooShort(10, _))
        ));

        let mut trailing = bytes.to_vec();
        trailing.push(0);
        assert_eq!(
            HandshakeMessage::decode(&trailing),
            Err(ProtocolError::TrailingBytes(1))
        );

        let mut bad_status = bytes.to_vec();
        bad_status[0] = 9;
        assert_eq!(
            HandshakeMessage::decode(&bad_status),
            Err(ProtocolError::UnknownStatus(9))
        );

        let mut bad_port = bytes.to_vec();
        bad_port[75..79].copy_from_slice(&70_000u32.to_be_bytes());
        assert_eq!(
            HandshakeMessage::decode(&bad_port),
            Err(ProtocolError::PortOutOfRange(70_000))
        );
    }

    #[test]
    fn test_encode_rejects_long_address() {
        let mut msg = HandshakeMessage::failure(StatusCode::Failed);
        msg.address = "x".repeat(MAX_ADDRESS_LEN + 1);
        assert_eq!(
            msg.encode(),
            Err(ProtocolError::AddressTooLong(MAX_ADDRESS_LEN + 1))
        );
    }
}
