//! Session controller: the handshake state machine and encrypted messaging
//! for one local peer.
//!
//! The controller holds at most one established session. A session bundles
//! the outbound client handle, the peer's identity and ephemeral keys, and
//! the channel codec, and is replaced as a unit: readers either see the old
//! session or the new one, never a mix. Network round-trips happen with no
//! lock held; only the final swap takes the write lock. When two
//! handshakes finish concurrently the later commit wins.

use std::sync::{Arc, PoisonError, RwLock};

use tether_core::{ChannelCodec, CipherSuite, Frame, HandshakeMessage, MessageType, StatusCode};
use tether_crypto::{
    ecdh, ecdhe, Digest32, EphemeralKeypair, EphemeralPublic, IdentityKeypair, TetherId,
};
use tracing::{debug, info, warn};

use crate::queue::InboundQueue;
use crate::transport::{Connector, RpcClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This side called `connect`.
    Initiator,
    /// This side answered a `Kex` call.
    Responder,
}

/// Settings fixed for the controller's lifetime.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Host placed in outgoing handshake messages.
    pub advertised_host: String,
    /// Port placed in outgoing handshake messages.
    pub advertised_port: u16,
    pub cipher_suite: CipherSuite,
}

struct Session {
    client: Arc<dyn RpcClient>,
    peer_identity: [u8; 32],
    peer_ephemeral: EphemeralPublic,
    codec: ChannelCodec,
    role: Role,
}

/// Snapshot of the established session, for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub peer_id: TetherId,
    pub peer_address: String,
    pub peer_ephemeral: EphemeralPublic,
    pub role: Role,
    /// Same on both peers exactly when they derived the same session key.
    pub key_fingerprint: Digest32,
}

pub struct SessionController {
    identity: IdentityKeypair,
    advertised_host: String,
    advertised_port: u16,
    cipher_suite: RwLock<CipherSuite>,
    connector: Arc<dyn Connector>,
    session: RwLock<Option<Arc<Session>>>,
    inbound: InboundQueue,
}

impl SessionController {
    pub fn new(
        identity: IdentityKeypair,
        options: ControllerOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            identity,
            advertised_host: options.advertised_host,
            advertised_port: options.advertised_port,
            cipher_suite: RwLock::new(options.cipher_suite),
            connector,
            session: RwLock::new(None),
            inbound: InboundQueue::new(),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.identity.public_key_bytes()
    }

    pub fn tether_id(&self) -> TetherId {
        self.identity.tether_id()
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        *self
            .cipher_suite
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Cipher used for subsequent outbound frames.
    pub fn set_cipher_suite(&self, suite: CipherSuite) {
        *self
            .cipher_suite
            .write()
            .unwrap_or_else(PoisonError::into_inner) = suite;
    }

    fn current(&self) -> Option<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn commit(&self, session: Session) {
        let peer = TetherId::from_bytes(&session.peer_identity);
        let role = session.role;
        let previous = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::new(session));

        if previous.is_some() {
            info!("session replaced: now {:?} with {}", role, peer);
        } else {
            info!("session established: {:?} with {}", role, peer);
        }
    }

    pub fn is_established(&self) -> bool {
        self.current().is_some()
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.current().map(|session| SessionInfo {
            peer_id: TetherId::from_bytes(&session.peer_identity),
            peer_address: session.client.peer().to_string(),
            peer_ephemeral: session.peer_ephemeral,
            role: session.role,
            key_fingerprint: session.codec.fingerprint(),
        })
    }

    /// Drop the established session, if any, and release its client handle.
    pub fn disconnect(&self) {
        let previous = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = previous {
            info!(
                "session with {} closed",
                TetherId::from_bytes(&session.peer_identity)
            );
        }
    }

    fn signed_handshake(&self, ephemeral: EphemeralPublic) -> Option<HandshakeMessage> {
        let mut msg = HandshakeMessage::new(
            self.public_key(),
            ephemeral,
            self.advertised_host.as_str(),
            self.advertised_port,
        );
        match msg.sign(&self.identity) {
            Ok(()) => Some(msg),
            Err(e) => {
                warn!("failed to sign handshake: {}", e);
                None
            }
        }
    }

    /// Run the initiator side of a handshake against `host:port`.
    ///
    /// On anything other than `Success` the existing session, if any, is
    /// left untouched and the handle opened for this attempt is released.
    ///
    /// `Success` does not mean the peer holds the same key. Two peers that
    /// connect to each other at the same time each commit their own
    /// handshake, and whichever commit lands last on each side wins, so both
    /// calls may return `Success` with different session keys. Messages then
    /// fail to decrypt until one side connects again. Compare
    /// [`SessionInfo::key_fingerprint`] to check that the keys agree.
    pub async fn connect(&self, host: &str, port: u16) -> StatusCode {
        let client = match self.connector.connect(host, port).await {
            Ok(client) => client,
            Err(e) => {
                warn!("cannot reach {}:{}: {}", host, port, e);
                return StatusCode::Failed;
            }
        };

        let ephemeral = EphemeralKeypair::generate();
        let Some(request) = self.signed_handshake(ephemeral.public()) else {
            return StatusCode::Failed;
        };

        let reply = match client.kex(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("kex call to {} failed: {}", client.peer(), e);
                return StatusCode::Failed;
            }
        };

        if !reply.status.is_success() {
            warn!("{} rejected handshake: {}", client.peer(), reply.status);
            return reply.status;
        }

        if let Err(e) = reply.verify() {
            warn!("handshake reply from {} failed verification: {}", client.peer(), e);
            return StatusCode::FailedValidationKex;
        }

        let key = match ecdh(ephemeral, &reply.ephemeral_key) {
            Ok(key) => key,
            Err(e) => {
                warn!("key agreement with {} failed: {}", client.peer(), e);
                return StatusCode::Failed;
            }
        };

        self.commit(Session {
            client,
            peer_identity: reply.public_key,
            peer_ephemeral: reply.ephemeral_key,
            codec: ChannelCodec::new(key),
            role: Role::Initiator,
        });
        StatusCode::Success
    }

    /// Answer an inbound `Kex` call.
    ///
    /// A rejection is an unsigned message carrying only the status. Nothing
    /// is committed unless the reply is a signed `Success`.
    pub async fn receive_handshake(&self, incoming: HandshakeMessage) -> HandshakeMessage {
        if let Err(e) = incoming.verify() {
            warn!(
                "rejecting handshake claiming {}:{}: {}",
                incoming.address, incoming.port, e
            );
            return HandshakeMessage::failure(StatusCode::FailedValidationKex);
        }
        if !incoming.status.is_success() {
            warn!("rejecting handshake with status {}", incoming.status);
            return HandshakeMessage::failure(StatusCode::Failed);
        }

        let (own_ephemeral, key) = match ecdhe(&incoming.ephemeral_key) {
            Ok(derived) => derived,
            Err(e) => {
                warn!("key agreement failed: {}", e);
                return HandshakeMessage::failure(StatusCode::Failed);
            }
        };

        let Some(reply) = self.signed_handshake(own_ephemeral) else {
            return HandshakeMessage::failure(StatusCode::Failed);
        };

        // Outbound handle to the address the initiator advertised.
        let client = match self
            .connector
            .connect(&incoming.address, incoming.port)
            .await
        {
            Ok(client) => client,
            Err(e) => {
                warn!(
                    "cannot reach initiator at {}:{}: {}",
                    incoming.address, incoming.port, e
                );
                return HandshakeMessage::failure(StatusCode::Failed);
            }
        };

        self.commit(Session {
            client,
            peer_identity: incoming.public_key,
            peer_ephemeral: incoming.ephemeral_key,
            codec: ChannelCodec::new(key),
            role: Role::Responder,
        });
        reply
    }

    pub async fn send_message(&self, plaintext: &str) -> StatusCode {
        self.send(MessageType::Data, plaintext.as_bytes()).await
    }

    /// Encrypt and send one frame of `message_type` under the current
    /// cipher suite. Returns the status reported by the peer.
    pub async fn send(&self, message_type: MessageType, payload: &[u8]) -> StatusCode {
        let Some(session) = self.current() else {
            debug!("send without an established session");
            return StatusCode::Failed;
        };

        let frame = match session
            .codec
            .encrypt(&self.cipher_suite(), message_type, payload)
        {
            Ok(frame) => frame,
            Err(e) => {
                warn!("encryption failed: {}", e);
                return StatusCode::Failed;
            }
        };

        match session.client.message(&frame).await {
            Ok(status) => status,
            Err(e) => {
                warn!("message call to {} failed: {}", session.client.peer(), e);
                StatusCode::Failed
            }
        }
    }

    /// Handle an inbound `Message` call. The frame is opened in the cipher
    /// mode it declares, so a peer sending unauthenticated frames is
    /// understood without any receiver-side setting.
    pub fn receive_message(&self, frame: &Frame) -> StatusCode {
        let Some(session) = self.current() else {
            debug!("frame received without an established session");
            return StatusCode::Failed;
        };

        let plaintext = match session.codec.decrypt(frame) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!("dropping frame: {}", e);
                return StatusCode::Failed;
            }
        };

        match frame.message_type {
            MessageType::Data => {
                debug!("queued {} byte message", plaintext.len());
                self.push_message(String::from_utf8_lossy(&plaintext).into_owned());
                StatusCode::Success
            }
            other => {
                debug!("no handler for message type {:?}", other);
                StatusCode::InvalidFunctionPerType
            }
        }
    }

    pub fn push_message(&self, message: String) {
        self.inbound.push(message);
    }

    /// Oldest undelivered inbound message, or `None`.
    pub fn pop_message(&self) -> Option<String> {
        self.inbound.pop()
    }

    pub fn pending_messages(&self) -> usize {
        self.inbound.len()
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("id", &self.tether_id())
            .field("advertised_host", &self.advertised_host)
            .field("advertised_port", &self.advertised_port)
            .field("established", &self.is_established())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Mutex, Weak};
    use tether_core::AcceptNoIntegrity;

    /// In-process network: `host:port` resolves to a controller and calls go
    /// straight to its handlers.
    #[derive(Default)]
    struct LocalNet {
        peers: Mutex<HashMap<String, Weak<SessionController>>>,
    }

    struct LocalConnector {
        net: Arc<LocalNet>,
    }

    struct LocalClient {
        addr: String,
        target: Arc<SessionController>,
    }

    #[async_trait]
    impl Connector for LocalConnector {
        async fn connect(
            &self,
            host: &str,
            port: u16,
        ) -> Result<Arc<dyn RpcClient>, TransportError> {
            let addr = format!("{host}:{port}");
            let target = self
                .net
                .peers
                .lock()
                .unwrap()
                .get(&addr)
                .and_then(Weak::upgrade)
                .ok_or(TransportError::Closed)?;
            Ok(Arc::new(LocalClient { addr, target }))
        }
    }

    #[async_trait]
    impl RpcClient for LocalClient {
        async fn kex(&self, msg: &HandshakeMessage) -> Result<HandshakeMessage, TransportError> {
            Ok(self.target.receive_handshake(msg.clone()).await)
        }

        async fn message(&self, frame: &Frame) -> Result<StatusCode, TransportError> {
            Ok(self.target.receive_message(frame))
        }

        fn peer(&self) -> &str {
            &self.addr
        }
    }

    fn options(port: u16) -> ControllerOptions {
        ControllerOptions {
            advertised_host: "local".into(),
            advertised_port: port,
            cipher_suite: CipherSuite::authenticated(),
        }
    }

    fn spawn_peer(net: &Arc<LocalNet>, options: ControllerOptions) -> Arc<SessionController> {
        let addr = format!("{}:{}", options.advertised_host, options.advertised_port);
        let connector = Arc::new(LocalConnector { net: net.clone() });
        let peer = Arc::new(SessionController::new(
            IdentityKeypair::generate(),
            options,
            connector,
        ));
        net.peers
            .lock()
            .unwrap()
            .insert(addr, Arc::downgrade(&peer));
        peer
    }

    fn pair() -> (Arc<LocalNet>, Arc<SessionController>, Arc<SessionController>) {
        let net = Arc::new(LocalNet::default());
        let a = spawn_peer(&net, options(1));
        let b = spawn_peer(&net, options(2));
        (net, a, b)
    }

    #[tokio::test]
    async fn test_handshake_agrees_on_key() {
        let (_net, a, b) = pair();

        assert_eq!(a.connect("local", 2).await, StatusCode::Success);

        let info_a = a.session_info().unwrap();
        let info_b = b.session_info().unwrap();
        assert_eq!(info_a.key_fingerprint, info_b.key_fingerprint);
        assert_eq!(info_a.peer_id, b.tether_id());
        assert_eq!(info_b.peer_id, a.tether_id());
        assert_eq!(info_a.role, Role::Initiator);
        assert_eq!(info_b.role, Role::Responder);
        assert_eq!(info_b.peer_address, "local:1");
    }

    #[tokio::test]
    async fn test_message_delivery_both_directions() {
        let (_net, a, b) = pair();
        assert_eq!(a.connect("local", 2).await, StatusCode::Success);

        assert_eq!(a.send_message("hello").await, StatusCode::Success);
        assert_eq!(b.send_message("hi back").await, StatusCode::Success);

        assert_eq!(b.pop_message().as_deref(), Some("hello"));
        assert_eq!(b.pop_message(), None);
        assert_eq!(a.pop_message().as_deref(), Some("hi back"));
    }

    #[tokio::test]
    async fn test_connect_to_unknown_peer_fails() {
        let (_net, a, _b) = pair();
        assert_eq!(a.connect("local", 99).await, StatusCode::Failed);
        assert!(!a.is_established());
    }

    #[tokio::test]
    async fn test_responder_unreachable_initiator_fails() {
        let net = Arc::new(LocalNet::default());
        let a = spawn_peer(&net, options(1));
        let b = spawn_peer(&net, options(2));
        // A advertises an address nobody listens on.
        net.peers.lock().unwrap().remove("local:1");

        assert_eq!(a.connect("local", 2).await, StatusCode::Failed);
        assert!(!a.is_established());
        assert!(!b.is_established());
    }

    #[tokio::test]
    async fn test_unsigned_handshake_rejected_without_mutation() {
        let (_net, a, b) = pair();

        let msg = HandshakeMessage::new(
            a.public_key(),
            EphemeralKeypair::generate().public(),
            "local",
            1,
        );
        let reply = b.receive_handshake(msg).await;
        assert_eq!(reply.status, StatusCode::FailedValidationKex);
        assert!(!b.is_established());
    }

    #[tokio::test]
    async fn test_signed_failure_status_is_not_a_key_source() {
        let (_net, _a, b) = pair();
        let identity = IdentityKeypair::generate();

        let mut msg = HandshakeMessage::new(
            identity.public_key_bytes(),
            EphemeralKeypair::generate().public(),
            "local",
            1,
        );
        msg.status = StatusCode::Failed;
        msg.sign(&identity).unwrap();

        let reply = b.receive_handshake(msg).await;
        assert_eq!(reply.status, StatusCode::Failed);
        assert!(!b.is_established());
    }

    #[tokio::test]
    async fn test_failed_handshake_keeps_existing_session() {
        let net = Arc::new(LocalNet::default());
        let a = spawn_peer(&net, options(1));
        let _b = spawn_peer(&net, options(2));

        assert_eq!(a.connect("local", 2).await, StatusCode::Success);
        let before = a.session_info().unwrap();

        assert_eq!(a.connect("local", 42).await, StatusCode::Failed);
        assert_eq!(a.session_info().unwrap(), before);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session() {
        let (_net, a, b) = pair();
        assert_eq!(a.connect("local", 2).await, StatusCode::Success);
        let first = a.session_info().unwrap().key_fingerprint;

        assert_eq!(a.connect("local", 2).await, StatusCode::Success);
        let second = a.session_info().unwrap().key_fingerprint;

        assert_ne!(first, second);
        assert_eq!(b.session_info().unwrap().key_fingerprint, second);
    }

    #[tokio::test]
    async fn test_send_without_session() {
        let (_net, a, _b) = pair();
        assert_eq!(a.send_message("nobody home").await, StatusCode::Failed);
    }

    #[tokio::test]
    async fn test_non_data_frame_is_invalid_function() {
        let (_net, a, b) = pair();
        assert_eq!(a.connect("local", 2).await, StatusCode::Success);

        assert_eq!(
            a.send(MessageType::Close, b"bye").await,
            StatusCode::InvalidFunctionPerType
        );
        assert_eq!(b.pending_messages(), 0);
    }

    #[tokio::test]
    async fn test_tampered_frame_rejected() {
        let (_net, a, b) = pair();
        assert_eq!(a.connect("local", 2).await, StatusCode::Success);

        let session = a.current().unwrap();
        let mut frame = session
            .codec
            .encrypt(&CipherSuite::authenticated(), MessageType::Data, b"payload")
            .unwrap();
        frame.ciphertext[0] ^= 0x01;

        assert_eq!(b.receive_message(&frame), StatusCode::Failed);
        assert_eq!(b.pop_message(), None);
    }

    #[tokio::test]
    async fn test_unauthenticated_frames_accepted_by_default() {
        let net = Arc::new(LocalNet::default());
        let a = spawn_peer(&net, options(1));
        let b = spawn_peer(&net, options(2));
        a.set_cipher_suite(CipherSuite::unauthenticated(
            AcceptNoIntegrity::frames_can_be_forged_undetected(),
        ));

        assert_eq!(a.connect("local", 2).await, StatusCode::Success);
        assert_eq!(a.send_message("plain").await, StatusCode::Success);
        assert_eq!(b.pop_message().as_deref(), Some("plain"));

        // The receiver follows each frame's declared mode.
        a.set_cipher_suite(CipherSuite::authenticated());
        assert_eq!(a.send_message("sealed").await, StatusCode::Success);
        assert_eq!(b.pop_message().as_deref(), Some("sealed"));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let (_net, a, _b) = pair();
        assert_eq!(a.connect("local", 2).await, StatusCode::Success);

        a.disconnect();
        assert!(!a.is_established());
        assert_eq!(a.send_message("late").await, StatusCode::Failed);
    }
}
