//! Requests as seen by a [`RequestHandler`](crate::http::RequestHandler).
//!
//! # Responsibilities
//! - Split the request target into path and decoded query parameters
//! - Rebuild `path?query` for forwarding
//!
//! # Design Decisions
//! - Parameters are a sorted map: unique keys, last occurrence wins
//! - Values are percent-decoded as UTF-8, `+` as space; a key without `=` gets an empty value
//! - The path is kept exactly as received

use axum::http::{Method, Uri};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use url::form_urlencoded;

use crate::net::connection::ConnectionId;

/// Decoded query parameters.
pub type Params = BTreeMap<String, String>;

/// One inbound request, reduced to what a handler needs.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub method: Method,
    pub path: String,
    pub params: Params,
    pub peer: SocketAddr,
    pub connection: ConnectionId,
}

impl HandlerRequest {
    pub fn new(method: Method, uri: &Uri, peer: SocketAddr, connection: ConnectionId) -> Self {
        Self {
            method,
            path: uri.path().to_string(),
            params: uri.query().map(parse_query).unwrap_or_default(),
            peer,
            connection,
        }
    }

    /// Path followed by the re-encoded parameters, if any.
    pub fn path_and_query(&self) -> String {
        if self.params.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, encode_query(&self.params))
        }
    }
}

/// Decode a query string into a parameter map.
pub fn parse_query(query: &str) -> Params {
    form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}

/// Encode parameters in key order.
pub fn encode_query(params: &Params) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}
