//! Peer configuration.
//!
//! Loaded from a JSON file and/or built from CLI flags. Every field has a
//! default, so `{}` is a valid configuration.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Outbound cipher selection as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CipherChoice {
    #[default]
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
    /// Unauthenticated. Requires `allow_unauthenticated_cipher`.
    #[serde(rename = "chacha20")]
    ChaCha20,
}

impl std::str::FromStr for CipherChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chacha20-poly1305" => Ok(Self::ChaCha20Poly1305),
            "chacha20" => Ok(Self::ChaCha20),
            other => Err(Error::config(format!("unknown cipher: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the RPC server binds to.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Host advertised in handshake messages. Defaults to the listen IP, or
    /// loopback when listening on the unspecified address.
    #[serde(default)]
    pub advertise_host: Option<String>,

    /// Port advertised in handshake messages. Defaults to the bound port.
    #[serde(default)]
    pub advertise_port: Option<u16>,

    /// Inbound calls handled concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub cipher: CipherChoice,

    /// Must be set to use `cipher = "chacha20"`.
    #[serde(default)]
    pub allow_unauthenticated_cipher: bool,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7000))
}
fn default_workers() -> usize {
    1
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_call_timeout_ms() -> u64 {
    10_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            advertise_host: None,
            advertise_port: None,
            workers: default_workers(),
            cipher: CipherChoice::default(),
            allow_unauthenticated_cipher: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl NodeConfig {
    /// Loopback config on an ephemeral port.
    pub fn loopback() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Self::default()
        }
    }

    /// Parse a JSON config file. Call [`NodeConfig::validate`] once any
    /// overrides have been applied.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::config("workers must be at least 1"));
        }
        if self.cipher == CipherChoice::ChaCha20 && !self.allow_unauthenticated_cipher {
            return Err(Error::config(
                "cipher \"chacha20\" provides no integrity; set allow_unauthenticated_cipher to use it",
            ));
        }
        if self.connect_timeout_ms == 0 || self.call_timeout_ms == 0 {
            return Err(Error::config("timeouts must be non-zero"));
        }
        if let Some(host) = &self.advertise_host {
            if host.is_empty() || host.len() > 255 {
                return Err(Error::config("advertise_host must be 1..=255 bytes"));
            }
        }
        Ok(())
    }

    /// Host to put in handshake messages.
    pub fn advertised_host(&self) -> String {
        match &self.advertise_host {
            Some(host) => host.clone(),
            None if self.listen.ip().is_unspecified() => "127.0.0.1".to_string(),
            None => self.listen.ip().to_string(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
