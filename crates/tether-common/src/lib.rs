//! Shared utilities for Tether: configuration, logging, error types.
//!
//! This crate provides common infrastructure used across all Tether components.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;

pub use config::{CipherChoice, NodeConfig};
pub use error::{Error, Result};

/// Install the global `fmt` subscriber. `RUST_LOG` overrides the `info`
/// default.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// As [`init_tracing`], with `default_level` used when `RUST_LOG` is unset.
pub fn init_tracing_with_default(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
