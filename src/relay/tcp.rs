//! TCP relay.
//!
//! # Responsibilities
//! - Accept client connections on a local port
//! - Open one outbound connection to the host per client, with a timeout
//! - Pump bytes both ways until either side closes or fails

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{self, Listener, ListenerError};
use crate::observability::metrics;
use crate::relay::{RelayError, BUFFER_SIZE};

/// A bound TCP relay from one local port to one host endpoint.
pub struct TcpRelay {
    listener: Listener,
    remote: SocketAddr,
    connect_timeout: Duration,
    local_addr: SocketAddr,
}

impl TcpRelay {
    pub async fn bind(local: SocketAddr, remote: SocketAddr, connect_timeout: Duration) -> Result<Self, RelayError> {
        let listener = Listener::bind(local, None).await?;
        let local_addr = listener.local_addr().map_err(RelayError::LocalAddr)?;

        tracing::info!(local = %local_addr, remote = %remote, "TCP relay listening");

        Ok(Self {
            listener,
            remote,
            connect_timeout,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn spawn(self) -> JoinHandle<Result<(), RelayError>> {
        tokio::spawn(self.run())
    }

    /// Accept forever. Only a non-transient accept error ends the loop.
    pub async fn run(self) -> Result<(), RelayError> {
        let port = self.local_addr.port();
        let tracker = ConnectionTracker::new("tcp_relay");

        loop {
            let (inbound, peer, _permit) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(ListenerError::Accept(e)) if listener::is_transient(&e) => {
                    tracing::debug!(port, error = %e, "Transient accept error");
                    continue;
                }
                Err(e) => {
                    tracing::error!(port, error = %e, "TCP relay accept loop stopped");
                    return Err(e.into());
                }
            };

            metrics::record_tcp_connection(port);
            let guard = tracker.track();
            tokio::spawn(relay_connection(inbound, peer, self.remote, self.connect_timeout, guard));
        }
    }
}

/// Bind and start relaying in one step. Returns the bound address.
pub async fn start_relay(
    local: SocketAddr,
    remote: SocketAddr,
    connect_timeout: Duration,
) -> Result<(SocketAddr, JoinHandle<Result<(), RelayError>>), RelayError> {
    let relay = TcpRelay::bind(local, remote, connect_timeout).await?;
    let local_addr = relay.local_addr();
    Ok((local_addr, relay.spawn()))
}

async fn relay_connection(
    inbound: TcpStream,
    peer: SocketAddr,
    remote: SocketAddr,
    connect_timeout: Duration,
    guard: ConnectionGuard,
) {
    let id = guard.id();
    let port = inbound.local_addr().map(|a| a.port()).unwrap_or_default();

    let outbound = match tokio::time::timeout(connect_timeout, TcpStream::connect(remote)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::warn!(connection_id = %id, remote = %remote, error = %e, "Host connect failed; dropping client");
            return;
        }
        Err(_) => {
            tracing::warn!(
                connection_id = %id,
                remote = %remote,
                timeout_ms = connect_timeout.as_millis() as u64,
                "Host connect timed out; dropping client"
            );
            return;
        }
    };

    for stream in [&inbound, &outbound] {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(connection_id = %id, error = %e, "Failed to set TCP_NODELAY");
        }
    }

    tracing::debug!(connection_id = %id, peer_addr = %peer, remote = %remote, "TCP relay paired");

    let (client_read, client_write) = inbound.into_split();
    let (host_read, host_write) = outbound.into_split();
    let closed = CancellationToken::new();

    let upstream = tokio::spawn(pump(client_read, host_write, closed.clone(), port, "upstream"));
    let downstream = tokio::spawn(pump(host_read, client_write, closed, port, "downstream"));
    let (up, down) = tokio::join!(upstream, downstream);

    tracing::debug!(
        connection_id = %id,
        bytes_up = up.unwrap_or_default(),
        bytes_down = down.unwrap_or_default(),
        "TCP relay closed"
    );
    drop(guard);
}

/// Copy `reader` to `writer` chunk by chunk until EOF, an error, or the
/// partner pump finishing. Returns the bytes copied.
async fn pump(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    closed: CancellationToken,
    port: u16,
    direction: &'static str,
) -> u64 {
    let mut buf = [0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            _ = closed.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(port, direction, error = %e, "Relay read failed");
                    break;
                }
            },
        };

        let written = tokio::select! {
            _ = closed.cancelled() => break,
            written = writer.write_all(&buf[..n]) => written,
        };
        if let Err(e) = written {
            tracing::debug!(port, direction, error = %e, "Relay write failed");
            break;
        }

        total += n as u64;
        metrics::record_bytes("tcp", port, direction, n);
    }

    closed.cancel();
    let _ = writer.shutdown().await;
    total
}
