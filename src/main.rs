//! GameStream relay
//!
//! Presents itself to streaming clients as the streaming host and forwards
//! everything to the real one.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                   RELAY                      │
//!   Client               │  ┌────────────┐   ┌───────┐   ┌───────────┐  │   Host
//!   HTTPS 47984 ─────────┼─▶│ http server│──▶│ proxy │──▶│host client│──┼─▶ HTTPS 47984
//!   HTTP  47989 ─────────┼─▶│ (server id)│   │rewrite│   │(client id)│  │   (HTTP 47989
//!                        │  └────────────┘   └───────┘   └───────────┘  │    on 401)
//!                        │                                              │
//!   TCP 35043/47995/48010┼─▶ tcp relay ─────────────────────────────────┼─▶ same ports
//!   UDP 47998-48010 ─────┼─▶ udp relay (learns client) ─────────────────┼─▶ same ports
//!                        └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use gamestream_relay::config::{read_config, validate_config, ConfigError, RelayConfig};
use gamestream_relay::host::{HostClient, RemoteSession};
use gamestream_relay::identity::{IdentityRole, IdentityStore};
use gamestream_relay::lifecycle::{self, signals};
use gamestream_relay::net::tls::{self, TrustPolicy};
use gamestream_relay::observability::{logging, metrics};
use gamestream_relay::pairing::{self, PairingError};
use gamestream_relay::proxy::{ProxyHandler, ReportedAddresses};

/// Relay a GameStream host through this machine.
#[derive(Debug, Parser)]
#[command(name = "gamestream-relay", version, about)]
struct Cli {
    /// Host name or IP address of the streaming host.
    remote_host: String,

    /// Address reported to clients as the host's local IP.
    internal_addr: String,

    /// Address reported to clients as the host's external IP.
    external_addr: String,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start even if the host has not paired with this relay.
    #[arg(long)]
    allow_unpaired: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => RelayConfig::default(),
    };
    config.remote.address = cli.remote_host.clone();
    config.reported.local_address = cli.internal_addr.clone();
    config.reported.external_address = cli.external_addr.clone();
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gamestream-relay starting");

    if let Some(addr) = config.observability.metrics_address {
        metrics::init_metrics(addr)?;
    }

    let remote = lifecycle::resolve(&config.remote.address).await?;
    let reported = ReportedAddresses {
        local: lifecycle::resolve(&config.reported.local_address).await?.to_string(),
        external: lifecycle::resolve(&config.reported.external_address).await?.to_string(),
    };
    tracing::info!(
        remote = %remote,
        reported_local = %reported.local,
        reported_external = %reported.external,
        "Configuration loaded"
    );

    // Load both identities now so a corrupt file fails startup, not the first handshake.
    let server_identity = load_identity(IdentityStore::new(
        IdentityRole::Server,
        &config.identity.server_cert,
        &config.identity.server_key,
    ))
    .await?;
    let client_identity = load_identity(IdentityStore::new(
        IdentityRole::Client,
        &config.identity.client_cert,
        &config.identity.client_key,
    ))
    .await?;

    let trust = match &config.remote.pinned_cert {
        Some(path) => TrustPolicy::Pinned(tls::load_pinned_certificate(path)?),
        None => TrustPolicy::AcceptAnyCertificate,
    };

    let session = RemoteSession::new(remote, config.remote.https_port, config.remote.http_port, &config.timeouts)?;
    let host = HostClient::new(session, client_identity, trust);

    match pairing::require_paired(&host).await {
        Ok(()) => tracing::info!("Paired with host"),
        Err(e) if cli.allow_unpaired => {
            tracing::warn!(error = %e, "Continuing without pairing");
        }
        Err(PairingError::NotPaired) => {
            tracing::error!(
                client_cert = %config.identity.client_cert.display(),
                "Host has not paired with this relay; pair it first or pass --allow-unpaired"
            );
            return Err(PairingError::NotPaired.into());
        }
        Err(e) => return Err(e.into()),
    }

    let acceptor = tls::acceptor(server_identity.as_ref())?;
    let handler = Arc::new(ProxyHandler::new(host, reported));
    let launched = lifecycle::launch(&config, remote, acceptor, handler).await?;
    tracing::info!(mode = ?launched.mode, "Relay running");

    signals::shutdown_signal().await?;
    launched.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Load or generate an identity off the async runtime.
async fn load_identity(store: IdentityStore) -> Result<Arc<IdentityStore>, Box<dyn std::error::Error>> {
    let store = Arc::new(store);
    let loader = Arc::clone(&store);
    tokio::task::spawn_blocking(move || loader.identity()).await??;
    Ok(store)
}
