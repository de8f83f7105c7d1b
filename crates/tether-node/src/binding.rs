//! Wiring between the RPC server and a session controller.

use std::sync::Arc;

use tether_core::rpc::{encode_status, METHOD_KEX, METHOD_MESSAGE};
use tether_core::{Frame, HandshakeMessage, RpcFault, StatusCode};
use tracing::warn;

use crate::controller::SessionController;
use crate::server::RpcServer;

/// Route `Kex` and `Message` calls on `server` to `controller`.
///
/// Bodies that fail to decode are answered with a `Failed` status in the
/// method's normal response shape, not with a transport fault.
pub fn bind_controller(server: &mut RpcServer, controller: Arc<SessionController>) {
    let kex_controller = controller.clone();
    server.bind(METHOD_KEX, move |body| {
        let controller = kex_controller.clone();
        async move {
            let reply = match HandshakeMessage::decode(&body) {
                Ok(incoming) => controller.receive_handshake(incoming).await,
                Err(e) => {
                    warn!("malformed handshake: {}", e);
                    HandshakeMessage::failure(StatusCode::Failed)
                }
            };
            reply
                .encode()
                .map(|bytes| bytes.to_vec())
                .map_err(|e| RpcFault::BadRequest(e.to_string()))
        }
    });

    server.bind(METHOD_MESSAGE, move |body| {
        let controller = controller.clone();
        async move {
            let status = match Frame::decode(&body) {
                Ok(frame) => controller.receive_message(&frame),
                Err(e) => {
                    warn!("malformed frame: {}", e);
                    StatusCode::Failed
                }
            };
            Ok(encode_status(status).to_vec())
        }
    });
}
