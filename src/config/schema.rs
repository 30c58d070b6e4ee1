//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults matching the host's well-known ports.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// The real streaming host.
    pub remote: RemoteConfig,

    /// Addresses written into `/serverinfo` responses.
    pub reported: ReportedConfig,

    /// Identity file locations.
    pub identity: IdentityConfig,

    /// Control-port listeners.
    pub listener: ListenerConfig,

    /// Media and control relays.
    pub relay: RelayPortsConfig,

    /// Host request timeouts.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// The real streaming host.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Host name or IP address. Usually supplied on the command line.
    pub address: String,

    /// HTTPS control port.
    pub https_port: u16,

    /// Plain HTTP control port.
    pub http_port: u16,

    /// PEM certificate the host must present. When absent any certificate is accepted.
    pub pinned_cert: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            https_port: 47984,
            http_port: 47989,
            pinned_cert: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportedConfig {
    /// Replaces `LocalIP`.
    pub local_address: String,

    /// Replaces `ExternalIP`.
    pub external_address: String,
}

/// Identity file locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Certificate presented to streaming clients.
    pub server_cert: PathBuf,
    pub server_key: PathBuf,

    /// Certificate presented to the real host.
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            server_cert: PathBuf::from("gfe-server.crt"),
            server_key: PathBuf::from("gfe-server.key"),
            client_cert: PathBuf::from("client.crt"),
            client_key: PathBuf::from("client.key"),
        }
    }
}

/// Control-port listeners.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address every listener and relay binds to.
    pub bind_ip: IpAddr,

    pub https_port: u16,
    pub http_port: u16,

    /// Side-by-side ports, used when a local host already owns the primary ones.
    pub sxs_https_port: u16,
    pub sxs_http_port: u16,

    /// Maximum concurrent connections per server. Absent means unbounded.
    pub max_connections: Option<usize>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            https_port: 47984,
            http_port: 47989,
            sxs_https_port: 37984,
            sxs_http_port: 37989,
            max_connections: None,
        }
    }
}

/// Media and control relays.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayPortsConfig {
    /// Remote input, control, RTSP handshake.
    pub tcp_ports: Vec<u16>,

    /// Control, RTSP handshake, video, audio, microphone.
    pub udp_ports: Vec<u16>,

    /// Outbound connect timeout for TCP relays.
    pub connect_timeout_ms: u64,
}

impl RelayPortsConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for RelayPortsConfig {
    fn default() -> Self {
        Self {
            tcp_ports: vec![35043, 47995, 48010],
            udp_ports: vec![47999, 48010, 47998, 48000, 48002],
            connect_timeout_ms: 5000,
        }
    }
}

/// Host request timeouts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout for host requests.
    pub connect_ms: u64,

    /// Read timeout for host requests that do not wait on user action.
    pub read_ms: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 3000,
            read_ms: 5000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Prometheus scrape endpoint. Disabled when absent.
    pub metrics_address: Option<SocketAddr>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_address: None,
        }
    }
}
