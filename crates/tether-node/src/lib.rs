//! Tether peer runtime.
//!
//! A [`Node`] binds an RPC listener, serves the `Kex` and `Message` calls
//! for its [`SessionController`], and opens outbound connections through a
//! [`Connector`].

pub mod binding;
pub mod controller;
pub mod error;
pub mod framing;
pub mod queue;
pub mod server;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use tether_common::{CipherChoice, NodeConfig};
use tether_core::{AcceptNoIntegrity, CipherSuite};
use tether_crypto::IdentityKeypair;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use binding::bind_controller;
pub use controller::{ControllerOptions, Role, SessionController, SessionInfo};
pub use error::TransportError;
pub use queue::InboundQueue;
pub use server::RpcServer;
pub use transport::{Connector, RpcClient, TcpConnector, TcpRpcClient};

/// Cipher suite for a validated config.
pub fn cipher_suite_for(config: &NodeConfig) -> tether_common::Result<CipherSuite> {
    match config.cipher {
        CipherChoice::ChaCha20Poly1305 => Ok(CipherSuite::authenticated()),
        CipherChoice::ChaCha20 if config.allow_unauthenticated_cipher => {
            warn!("outbound frames use chacha20 without integrity protection");
            Ok(CipherSuite::unauthenticated(
                AcceptNoIntegrity::frames_can_be_forged_undetected(),
            ))
        }
        CipherChoice::ChaCha20 => Err(tether_common::Error::config(
            "chacha20 requires allow_unauthenticated_cipher",
        )),
    }
}

/// A running peer: listener, RPC server task and session controller.
pub struct Node {
    controller: Arc<SessionController>,
    local_addr: SocketAddr,
    server: JoinHandle<()>,
}

impl Node {
    /// Bind `config.listen` and start serving.
    ///
    /// When no advertise port is configured the actually bound port is
    /// advertised, so `listen` may use port 0.
    pub async fn start(
        config: &NodeConfig,
        identity: IdentityKeypair,
    ) -> tether_common::Result<Self> {
        let connector = Arc::new(TcpConnector::new(
            config.connect_timeout(),
            config.call_timeout(),
        ));
        Self::start_with_connector(config, identity, connector).await
    }

    /// Like [`Node::start`], with a caller-supplied outbound connector.
    pub async fn start_with_connector(
        config: &NodeConfig,
        identity: IdentityKeypair,
        connector: Arc<dyn Connector>,
    ) -> tether_common::Result<Self> {
        config.validate()?;
        let cipher_suite = cipher_suite_for(config)?;

        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|e| tether_common::Error::bind(config.listen, e))?;
        let local_addr = listener.local_addr()?;

        let options = ControllerOptions {
            advertised_host: config.advertised_host(),
            advertised_port: config.advertise_port.unwrap_or(local_addr.port()),
            cipher_suite,
        };
        info!(
            "node {} advertising {}:{}",
            identity.tether_id(),
            options.advertised_host,
            options.advertised_port
        );
        let controller = Arc::new(SessionController::new(identity, options, connector));

        let mut server = RpcServer::new(config.workers);
        bind_controller(&mut server, controller.clone());
        let server = tokio::spawn(Arc::new(server).serve(listener));

        Ok(Self {
            controller,
            local_addr,
            server,
        })
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting calls and drop the session.
    pub fn shutdown(&self) {
        self.server.abort();
        self.controller.disconnect();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.server.abort();
    }
}
