//! UDP relay with client address learning.

use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::net::listener;
use crate::observability::metrics;
use crate::relay::{RelayError, BUFFER_SIZE};

/// Where a datagram goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    ToRemote,
    ToClient(SocketAddr),
    /// From the host before any client has spoken.
    Drop,
}

/// Remote endpoint plus the most recent non-remote sender.
///
/// Supports one client per port: any new sender replaces the previous one.
#[derive(Debug, Clone)]
pub struct UdpSession {
    remote: SocketAddr,
    client: Option<SocketAddr>,
}

impl UdpSession {
    pub fn new(remote: SocketAddr) -> Self {
        Self { remote, client: None }
    }

    pub fn client(&self) -> Option<SocketAddr> {
        self.client
    }

    /// Decide where a datagram from `from` goes, learning `from` if it is not the host.
    pub fn route(&mut self, from: SocketAddr) -> Route {
        if from == self.remote {
            return match self.client {
                Some(client) => Route::ToClient(client),
                None => Route::Drop,
            };
        }

        if self.client != Some(from) {
            tracing::debug!(previous = ?self.client, client = %from, "Learned UDP client");
            self.client = Some(from);
        }
        Route::ToRemote
    }
}

/// A bound UDP relay from one local port to one host endpoint.
pub struct UdpRelay {
    socket: UdpSocket,
    session: UdpSession,
    local_addr: SocketAddr,
}

impl UdpRelay {
    pub async fn bind(local: SocketAddr, remote: SocketAddr) -> Result<Self, RelayError> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| RelayError::UdpBind { addr: local, source })?;
        let local_addr = socket.local_addr().map_err(RelayError::LocalAddr)?;

        tracing::info!(local = %local_addr, remote = %remote, "UDP relay listening");

        Ok(Self {
            socket,
            session: UdpSession::new(remote),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn spawn(self) -> JoinHandle<Result<(), RelayError>> {
        tokio::spawn(self.run())
    }

    /// Relay until an unrecoverable receive error. Send failures only lose that datagram.
    pub async fn run(mut self) -> Result<(), RelayError> {
        let port = self.local_addr.port();
        let remote = self.session.remote;
        let mut buf = [0u8; BUFFER_SIZE];

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) if listener::is_transient(&e) => {
                    tracing::debug!(port, error = %e, "Transient UDP receive error");
                    continue;
                }
                Err(source) => {
                    tracing::error!(port, error = %source, "UDP relay stopped");
                    return Err(RelayError::Socket { port, source });
                }
            };

            let (target, direction) = match self.session.route(from) {
                Route::ToRemote => (remote, "upstream"),
                Route::ToClient(client) => (client, "downstream"),
                Route::Drop => {
                    tracing::warn!(port, bytes = len, "Dropping host datagram; no client yet");
                    metrics::record_udp_dropped(port);
                    continue;
                }
            };

            match self.socket.send_to(&buf[..len], target).await {
                Ok(_) => metrics::record_bytes("udp", port, direction, len),
                Err(e) => tracing::debug!(port, target = %target, error = %e, "UDP send failed"),
            }
        }
    }
}

/// Bind and start relaying in one step. Returns the bound address.
pub async fn start_relay(
    local: SocketAddr,
    remote: SocketAddr,
) -> Result<(SocketAddr, JoinHandle<Result<(), RelayError>>), RelayError> {
    let relay = UdpRelay::bind(local, remote).await?;
    let local_addr = relay.local_addr();
    Ok((local_addr, relay.spawn()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn host_datagram_before_any_client_is_dropped() {
        let mut session = UdpSession::new(addr("10.0.0.5:47998"));
        assert_eq!(session.route(addr("10.0.0.5:47998")), Route::Drop);
        assert_eq!(session.client(), None);
    }

    #[test]
    fn first_sender_is_learned() {
        let host = addr("10.0.0.5:47998");
        let client = addr("192.168.1.50:50000");
        let mut session = UdpSession::new(host);

        assert_eq!(session.route(client), Route::ToRemote);
        assert_eq!(session.route(host), Route::ToClient(client));
    }

    #[test]
    fn new_sender_takes_over() {
        let host = addr("10.0.0.5:47998");
        let mut session = UdpSession::new(host);

        session.route(addr("192.168.1.50:50000"));
        session.route(addr("192.168.1.51:50001"));
        assert_eq!(session.route(host), Route::ToClient(addr("192.168.1.51:50001")));
    }

    #[test]
    fn same_ip_other_port_is_not_the_host() {
        let host = addr("10.0.0.5:47998");
        let mut session = UdpSession::new(host);

        assert_eq!(session.route(addr("10.0.0.5:47999")), Route::ToRemote);
        assert_eq!(session.client(), Some(addr("10.0.0.5:47999")));
    }
}
