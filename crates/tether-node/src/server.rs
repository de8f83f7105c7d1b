//! Inbound RPC server.
//!
//! Each accepted connection is served by its own task, one request at a
//! time. Handler execution across all connections is bounded by a fixed
//! pool of worker permits.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tether_core::{RpcFault, RpcRequest, RpcResponse};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::framing::{read_frame, write_frame};

type Handler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>, RpcFault>> + Send + Sync>;

pub struct RpcServer {
    handlers: HashMap<String, Handler>,
    workers: Arc<Semaphore>,
}

impl RpcServer {
    pub fn new(workers: usize) -> Self {
        Self {
            handlers: HashMap::new(),
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Register `handler` for `method`, replacing any earlier binding.
    pub fn bind<F, Fut>(&mut self, method: &str, handler: F)
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>, RpcFault>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |body| handler(body).boxed());
        self.handlers.insert(method.to_string(), handler);
    }

    /// Accept connections until the task is cancelled. Cancelling also
    /// closes every connection accepted so far.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("rpc server listening on {}", addr);
        }

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("accept failed: {}", e);
                            continue;
                        }
                    };

                    let server = self.clone();
                    connections.spawn(async move {
                        if let Err(e) = server.handle_connection(stream, peer).await {
                            debug!("connection from {} ended: {}", peer, e);
                        }
                    });
                }
                Some(_) = connections.join_next() => {}
            }
        }
    }

    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), TransportError> {
        stream.set_nodelay(true)?;
        debug!("rpc connection from {}", peer);

        while let Some(bytes) = read_frame(&mut stream).await? {
            let response = match RpcRequest::decode(&bytes) {
                Ok(request) => self.dispatch(request).await,
                Err(e) => RpcResponse::Fault(RpcFault::BadRequest(e.to_string())),
            };
            write_frame(&mut stream, &response.encode()?).await?;
        }

        debug!("rpc connection from {} closed", peer);
        Ok(())
    }

    async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let Some(handler) = self.handlers.get(&request.method).cloned() else {
            warn!("unknown rpc method: {}", request.method);
            return RpcResponse::Fault(RpcFault::UnknownMethod(request.method));
        };

        let Ok(_permit) = self.workers.acquire().await else {
            return RpcResponse::Fault(RpcFault::Unavailable);
        };

        match handler(request.body).await {
            Ok(body) => RpcResponse::Ok(body),
            Err(fault) => RpcResponse::Fault(fault),
        }
    }
}
