use rand::{thread_rng, Rng};
use tether_core::{Frame, HandshakeMessage, RpcRequest, RpcResponse, StatusCode};
use tether_crypto::{EphemeralKeypair, IdentityKeypair};

#[test]
fn fuzz_decode_handshake_never_panics() {
    let mut rng = thread_rng();
    for _ in 0..10_000 {
        let len: usize = rng.gen_range(0..512);
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);
        let _ = HandshakeMessage::decode(&data);
    }
}

#[test]
fn fuzz_decode_frame_never_panics() {
    let mut rng = thread_rng();
    for _ in 0..10_000 {
        let len: usize = rng.gen_range(0..256);
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);
        let _ = Frame::decode(&data);
    }
}

#[test]
fn fuzz_decode_envelope_never_panics() {
    let mut rng = thread_rng();
    for _ in 0..10_000 {
        let len: usize = rng.gen_range(0..256);
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);
        let _ = RpcRequest::decode(&data);
        let _ = RpcResponse::decode(&data);
    }
}

#[test]
fn random_mutation_of_signed_handshake_never_verifies() {
    let mut rng = thread_rng();
    let identity = IdentityKeypair::generate();
    let mut msg = HandshakeMessage::new(
        identity.public_key_bytes(),
        EphemeralKeypair::generate().public(),
        "192.168.1.20",
        7100,
    );
    msg.sign(&identity).unwrap();
    let packet = msg.encode().unwrap().to_vec();

    for _ in 0..500 {
        let mut mutated = packet.clone();
        let idx = rng.gen_range(0..mutated.len());
        mutated[idx] ^= rng.gen_range(1..=255u8);

        // Either it no longer parses, or it parses and fails verification
        if let Ok(decoded) = HandshakeMessage::decode(&mutated) {
            if decoded.status == StatusCode::Success {
                assert!(decoded.verify().is_err(), "byte {} flip verified", idx);
            }
        }
    }
}
