//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports non-zero)
//! - Detect port collisions between listeners and relays
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs after command-line overrides are applied

use std::collections::HashSet;

use crate::config::schema::RelayConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.remote.address.trim().is_empty() {
        errors.push(ValidationError::new("remote.address", "remote host is required"));
    }
    if config.remote.https_port == 0 || config.remote.http_port == 0 {
        errors.push(ValidationError::new("remote", "host ports must be non-zero"));
    }
    if config.reported.local_address.trim().is_empty() {
        errors.push(ValidationError::new("reported.local_address", "must not be empty"));
    }
    if config.reported.external_address.trim().is_empty() {
        errors.push(ValidationError::new("reported.external_address", "must not be empty"));
    }

    let listener = &config.listener;
    if listener.https_port == listener.http_port {
        errors.push(ValidationError::new("listener", "HTTPS and HTTP ports must differ"));
    }
    if listener.sxs_https_port == listener.sxs_http_port {
        errors.push(ValidationError::new("listener", "side-by-side HTTPS and HTTP ports must differ"));
    }
    if listener.max_connections == Some(0) {
        errors.push(ValidationError::new("listener.max_connections", "must be at least 1"));
    }

    check_ports(&mut errors, "relay.tcp_ports", &config.relay.tcp_ports);
    check_ports(&mut errors, "relay.udp_ports", &config.relay.udp_ports);
    for port in [listener.https_port, listener.http_port] {
        if config.relay.tcp_ports.contains(&port) {
            errors.push(ValidationError::new(
                "relay.tcp_ports",
                format!("port {port} is already used by a control listener"),
            ));
        }
    }

    if config.relay.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("relay.connect_timeout_ms", "must be positive"));
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::new("timeouts.connect_ms", "must be positive"));
    }
    if config.timeouts.read_ms == 0 {
        errors.push(ValidationError::new("timeouts.read_ms", "must be positive"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_ports(errors: &mut Vec<ValidationError>, field: &'static str, ports: &[u16]) {
    let mut seen = HashSet::new();
    for &port in ports {
        if port == 0 {
            errors.push(ValidationError::new(field, "ports must be non-zero"));
        } else if !seen.insert(port) {
            errors.push(ValidationError::new(field, format!("port {port} listed twice")));
        }
    }
}
