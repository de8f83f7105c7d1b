//! Tether CLI: key generation and running a peer.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tether_common::{CipherChoice, NodeConfig};
use tether_core::StatusCode;
use tether_crypto::IdentityKeypair;
use tether_node::{Node, SessionController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Tether: authenticated key exchange and encrypted messaging between two peers")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new Ed25519 identity keypair
    Keygen {
        /// Output file path (without extension)
        #[arg(short, long, default_value = "tether")]
        output: String,
    },

    /// Show Tether ID from a public key file
    ShowId {
        /// Public key file path
        #[arg(short, long)]
        key: String,
    },

    /// Run a peer: serve Kex/Message, send stdin lines, print inbound messages
    Run(RunArgs),

    /// Show version information
    Version,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// JSON config file; flags override its values
    #[arg(long, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address for the RPC server
    #[arg(long, env = "TETHER_LISTEN")]
    listen: Option<SocketAddr>,

    /// Host advertised to peers in handshake messages
    #[arg(long, env = "TETHER_ADVERTISE")]
    advertise: Option<String>,

    /// Port advertised to peers (defaults to the bound port)
    #[arg(long, env = "TETHER_ADVERTISE_PORT")]
    advertise_port: Option<u16>,

    /// Peer to connect to at startup (host:port)
    #[arg(long)]
    connect: Option<String>,

    /// Private key file from `tether keygen`; a throwaway identity is used
    /// when omitted
    #[arg(long, env = "TETHER_IDENTITY")]
    identity: Option<PathBuf>,

    /// Outbound cipher: chacha20-poly1305 or chacha20
    #[arg(long)]
    cipher: Option<CipherChoice>,

    /// Permit the chacha20 outbound cipher, which has no integrity protection
    #[arg(long)]
    allow_unauthenticated: bool,

    /// Inbound calls handled concurrently
    #[arg(long, env = "TETHER_WORKERS")]
    workers: Option<usize>,
}

impl RunArgs {
    fn node_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => NodeConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(host) = &self.advertise {
            config.advertise_host = Some(host.clone());
        }
        if self.advertise_port.is_some() {
            config.advertise_port = self.advertise_port;
        }
        if let Some(cipher) = self.cipher {
            config.cipher = cipher;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.allow_unauthenticated_cipher |= self.allow_unauthenticated;

        config.validate()?;
        Ok(config)
    }

    fn identity(&self) -> Result<IdentityKeypair> {
        match &self.identity {
            Some(path) => IdentityKeypair::load(path)
                .with_context(|| format!("loading identity {}", path.display())),
            None => {
                warn!("no --identity given, using a throwaway identity");
                Ok(IdentityKeypair::generate())
            }
        }
    }
}

fn parse_host_port(target: &str) -> Result<(String, u16)> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected host:port, got {target:?}"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(anyhow!("missing host in {target:?}"));
    }
    let port = port
        .parse()
        .with_context(|| format!("invalid port in {target:?}"))?;
    Ok((host.to_string(), port))
}

async fn connect(controller: &SessionController, target: &str) -> Result<()> {
    let (host, port) = parse_host_port(target)?;
    match controller.connect(&host, port).await {
        StatusCode::Success => {
            if let Some(info) = controller.session_info() {
                println!(
                    "connected to {} ({}), key fingerprint {}",
                    info.peer_id,
                    info.peer_address,
                    hex::encode(&info.key_fingerprint[..8])
                );
            }
            Ok(())
        }
        status => Err(anyhow!("handshake with {target} failed: {status}")),
    }
}

fn drain(controller: &SessionController) {
    while let Some(message) = controller.pop_message() {
        println!("< {message}");
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.node_config()?;
    let identity = args.identity()?;

    let node = Node::start(&config, identity).await?;
    let controller = node.controller().clone();
    println!("tether id: {}", controller.tether_id());
    println!("listening: {}", node.local_addr());

    if let Some(target) = &args.connect {
        connect(&controller, target).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim_end();

                if let Some(target) = line.strip_prefix("/connect ") {
                    if let Err(e) = connect(&controller, target.trim()).await {
                        eprintln!("{e:#}");
                    }
                } else if line == "/disconnect" {
                    controller.disconnect();
                } else if line == "/quit" {
                    break;
                } else if !line.is_empty() {
                    let status = controller.send_message(line).await;
                    if !status.is_success() {
                        eprintln!("send failed: {status}");
                    }
                }
            }
            _ = tick.tick() => drain(&controller),
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    drain(&controller);
    node.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    tether_common::init_tracing();

    let args = Args::parse();

    match args.command {
        Command::Keygen { output } => {
            println!("Generating Ed25519 keypair...");

            let keypair = IdentityKeypair::generate();
            let tether_id = keypair.tether_id();

            let private_path = format!("{}.key", output);
            let public_path = format!("{}.pub", output);

            keypair.save(&private_path, &public_path)?;

            println!("Private key: {}", private_path);
            println!("Public key:  {}", public_path);
            println!("Tether ID:   {}", tether_id);
        }
        Command::ShowId { key } => {
            let public = IdentityKeypair::load_public(&key)?;
            println!("{}", public.tether_id());
        }
        Command::Run(run_args) => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(run(run_args))?;
        }
        Command::Version => {
            println!("tether {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
