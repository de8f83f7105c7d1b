//! Outbound RPC: the [`Connector`]/[`RpcClient`] seam and its TCP
//! implementation.
//!
//! A client handle stays open for the lifetime of a session and carries the
//! local side's `Kex` and `Message` calls to one peer. Calls on a handle are
//! serialized; a handle whose call failed mid-flight is poisoned and every
//! later call returns [`TransportError::Closed`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_core::rpc::{decode_status, METHOD_KEX, METHOD_MESSAGE};
use tether_core::{Frame, HandshakeMessage, RpcRequest, RpcResponse, StatusCode};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::TransportError;
use crate::framing::{read_frame, write_frame};

/// Opens RPC client handles to peers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn RpcClient>, TransportError>;
}

/// One peer's `Kex` and `Message` endpoints.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn kex(&self, msg: &HandshakeMessage) -> Result<HandshakeMessage, TransportError>;

    async fn message(&self, frame: &Frame) -> Result<StatusCode, TransportError>;

    /// Human-readable peer address for logs.
    fn peer(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    call_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            call_timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn RpcClient>, TransportError> {
        let addr = format!("{host}:{port}");
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|source| TransportError::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        debug!("rpc client connected to {}", addr);
        Ok(Arc::new(TcpRpcClient {
            peer: addr,
            stream: Mutex::new(Some(stream)),
            call_timeout: self.call_timeout,
        }))
    }
}

pub struct TcpRpcClient {
    peer: String,
    stream: Mutex<Option<TcpStream>>,
    call_timeout: Duration,
}

impl TcpRpcClient {
    async fn call(&self, method: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let request = RpcRequest::new(method, body).encode()?;

        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TransportError::Closed)?;

        let result = tokio::time::timeout(self.call_timeout, async {
            write_frame(stream, &request).await?;
            read_frame(stream).await?.ok_or(TransportError::Closed)
        })
        .await
        .unwrap_or(Err(TransportError::Timeout(self.call_timeout)));

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                // The stream may hold a partial exchange; never reuse it.
                guard.take();
                return Err(e);
            }
        };
        drop(guard);

        match RpcResponse::decode(&reply)? {
            RpcResponse::Ok(body) => Ok(body),
            RpcResponse::Fault(fault) => Err(fault.into()),
        }
    }
}

#[async_trait]
impl RpcClient for TcpRpcClient {
    async fn kex(&self, msg: &HandshakeMessage) -> Result<HandshakeMessage, TransportError> {
        let body = self.call(METHOD_KEX, msg.encode()?.to_vec()).await?;
        Ok(HandshakeMessage::decode(&body)?)
    }

    async fn message(&self, frame: &Frame) -> Result<StatusCode, TransportError> {
        let body = self.call(METHOD_MESSAGE, frame.encode().to_vec()).await?;
        Ok(decode_status(&body)?)
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

impl std::fmt::Debug for TcpRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpRpcClient")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
