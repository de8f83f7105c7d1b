use std::net::SocketAddr;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Setup and local I/O failures.
///
/// Handshake and message outcomes travel as status codes and never become
/// this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Config parsed but is not usable.
    #[error("invalid config: {0}")]
    Config(String),

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr, source }
    }
}
