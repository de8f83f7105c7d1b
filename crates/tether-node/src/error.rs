use tether_core::{ProtocolError, RpcFault};
use thiserror::Error;

/// Failures of the RPC transport itself.
///
/// These never cross the wire; the session controller turns them into a
/// `Failed` status for its caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection closed")]
    Closed,

    #[error("frame too large: {len} bytes, max {max}")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("remote fault: {0}")]
    Fault(#[from] RpcFault),
}
