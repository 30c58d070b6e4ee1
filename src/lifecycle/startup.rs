//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve the host and reported addresses
//! - Bind the HTTPS/HTTP proxy servers and every TCP/UDP relay
//! - Fall back to side-by-side ports when a local host owns the primary ones
//!
//! # Design Decisions
//! - Everything is bound before anything is spawned, so a failed primary
//!   bind releases every port it took
//! - Side-by-side mode runs only the proxy servers; the media ports belong
//!   to the local host

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::config::RelayConfig;
use crate::http::{EmbeddedServer, RequestHandler, ServerError};
use crate::relay::{RelayError, TcpRelay, UdpRelay};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("could not resolve {host:?}: {reason}")]
    Resolve { host: String, reason: String },
}

impl StartupError {
    pub fn is_addr_in_use(&self) -> bool {
        match self {
            StartupError::Server(e) => e.is_addr_in_use(),
            StartupError::Relay(e) => e.is_addr_in_use(),
            StartupError::Resolve { .. } => false,
        }
    }
}

/// Which port set the relay ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
    /// Well-known ports, with media relays.
    Primary,
    /// Alternate control ports, no media relays.
    SideBySide,
}

/// Everything [`launch`] started.
pub struct Launched {
    pub mode: PortMode,
    pub https_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub tcp_relays: Vec<SocketAddr>,
    pub udp_relays: Vec<SocketAddr>,
    pub tasks: Vec<JoinHandle<Result<(), StartupError>>>,
}

impl Launched {
    /// Stop every server and relay task.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

struct Bound {
    https: EmbeddedServer,
    http: EmbeddedServer,
    tcp: Vec<TcpRelay>,
    udp: Vec<UdpRelay>,
}

/// Resolve a host name or IP literal to its first address.
pub async fn resolve(host: &str) -> Result<IpAddr, StartupError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let resolve_error = |reason: String| StartupError::Resolve {
        host: host.to_string(),
        reason,
    };
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| resolve_error(e.to_string()))?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| resolve_error("no addresses".to_string()))
}

/// Bind and spawn the proxy servers and relays.
pub async fn launch<H: RequestHandler>(
    config: &RelayConfig,
    remote: IpAddr,
    tls: TlsAcceptor,
    handler: Arc<H>,
) -> Result<Launched, StartupError> {
    let bound = match bind_primary(config, remote, tls.clone()).await {
        Ok(bound) => bound,
        Err(e) if e.is_addr_in_use() => {
            tracing::warn!(
                error = %e,
                https_port = config.listener.sxs_https_port,
                http_port = config.listener.sxs_http_port,
                "Primary ports are taken; starting side-by-side without media relays"
            );
            return launch_side_by_side(config, tls, handler).await;
        }
        Err(e) => return Err(e),
    };

    let mut launched = Launched {
        mode: PortMode::Primary,
        https_addr: bound.https.local_addr(),
        http_addr: bound.http.local_addr(),
        tcp_relays: bound.tcp.iter().map(TcpRelay::local_addr).collect(),
        udp_relays: bound.udp.iter().map(UdpRelay::local_addr).collect(),
        tasks: Vec::new(),
    };

    launched.tasks.push(spawn_server(bound.https, Arc::clone(&handler)));
    launched.tasks.push(spawn_server(bound.http, handler));
    for relay in bound.tcp {
        launched.tasks.push(tokio::spawn(async move { relay.run().await.map_err(StartupError::from) }));
    }
    for relay in bound.udp {
        launched.tasks.push(tokio::spawn(async move { relay.run().await.map_err(StartupError::from) }));
    }

    tracing::info!(
        https = %launched.https_addr,
        http = %launched.http_addr,
        tcp_relays = launched.tcp_relays.len(),
        udp_relays = launched.udp_relays.len(),
        "Relay started"
    );
    Ok(launched)
}

async fn bind_primary(config: &RelayConfig, remote: IpAddr, tls: TlsAcceptor) -> Result<Bound, StartupError> {
    let listener = &config.listener;
    let bind = |port| SocketAddr::new(listener.bind_ip, port);

    let https = EmbeddedServer::bind("https", bind(listener.https_port), Some(tls), listener.max_connections).await?;
    let http = EmbeddedServer::bind("http", bind(listener.http_port), None, listener.max_connections).await?;

    let mut tcp = Vec::with_capacity(config.relay.tcp_ports.len());
    for &port in &config.relay.tcp_ports {
        let relay = TcpRelay::bind(bind(port), SocketAddr::new(remote, port), config.relay.connect_timeout()).await?;
        tcp.push(relay);
    }

    let mut udp = Vec::with_capacity(config.relay.udp_ports.len());
    for &port in &config.relay.udp_ports {
        udp.push(UdpRelay::bind(bind(port), SocketAddr::new(remote, port)).await?);
    }

    Ok(Bound { https, http, tcp, udp })
}

async fn launch_side_by_side<H: RequestHandler>(
    config: &RelayConfig,
    tls: TlsAcceptor,
    handler: Arc<H>,
) -> Result<Launched, StartupError> {
    let listener = &config.listener;
    let bind = |port| SocketAddr::new(listener.bind_ip, port);

    let https = EmbeddedServer::bind("https", bind(listener.sxs_https_port), Some(tls), listener.max_connections).await?;
    let http = EmbeddedServer::bind("http", bind(listener.sxs_http_port), None, listener.max_connections).await?;

    let launched = Launched {
        mode: PortMode::SideBySide,
        https_addr: https.local_addr(),
        http_addr: http.local_addr(),
        tcp_relays: Vec::new(),
        udp_relays: Vec::new(),
        tasks: vec![spawn_server(https, Arc::clone(&handler)), spawn_server(http, handler)],
    };

    tracing::info!(https = %launched.https_addr, http = %launched.http_addr, "Relay started side-by-side");
    Ok(launched)
}

fn spawn_server<H: RequestHandler>(server: EmbeddedServer, handler: Arc<H>) -> JoinHandle<Result<(), StartupError>> {
    tokio::spawn(async move { server.run(handler).await.map_err(StartupError::from) })
}
