//! HTTPS/HTTP client for the host's control ports.
//!
//! # Responsibilities
//! - Issue GET requests over mutual TLS (or plain HTTP for the fallback)
//! - Map HTTP and transport failures onto [`HostError`]
//! - Retrieve `/serverinfo`, downgrading to HTTP on a 401
//! - Read pairing state and version fields out of server info

use reqwest::StatusCode;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::config::TimeoutConfig;
use crate::host::{xml, HostError, UNIQUE_ID};
use crate::identity::IdentityProvider;
use crate::net::tls::{self, TrustPolicy};
use crate::pairing::PairState;

/// Where and how to reach one host. Immutable once built.
#[derive(Debug, Clone)]
pub struct RemoteSession {
    https_base: Url,
    http_base: Url,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl RemoteSession {
    pub fn new(host: IpAddr, https_port: u16, http_port: u16, timeouts: &TimeoutConfig) -> Result<Self, HostError> {
        Ok(Self {
            https_base: base_url("https", SocketAddr::new(host, https_port))?,
            http_base: base_url("http", SocketAddr::new(host, http_port))?,
            connect_timeout: timeouts.connect(),
            read_timeout: timeouts.read(),
        })
    }

    pub fn https_base(&self) -> &Url {
        &self.https_base
    }

    pub fn http_base(&self) -> &Url {
        &self.http_base
    }
}

fn base_url(scheme: &str, addr: SocketAddr) -> Result<Url, HostError> {
    // SocketAddr's Display brackets IPv6 literals.
    let raw = format!("{scheme}://{addr}");
    Url::parse(&raw).map_err(|_| HostError::InvalidPath(raw))
}

/// Client for one host, presenting one client identity.
///
/// No connection is reused between requests; each request builds its TLS
/// context from the identity provider's current state.
#[derive(Clone)]
pub struct HostClient {
    session: RemoteSession,
    identity: Arc<dyn IdentityProvider>,
    trust: TrustPolicy,
}

impl HostClient {
    pub fn new(session: RemoteSession, identity: Arc<dyn IdentityProvider>, trust: TrustPolicy) -> Self {
        Self {
            session,
            identity,
            trust,
        }
    }

    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    /// Resolve a path (with optional query) against the HTTPS base.
    pub fn https_url(&self, path_and_query: &str) -> Result<Url, HostError> {
        join(&self.session.https_base, path_and_query)
    }

    /// Resolve a path (with optional query) against the plain HTTP base.
    pub fn http_url(&self, path_and_query: &str) -> Result<Url, HostError> {
        join(&self.session.http_base, path_and_query)
    }

    /// GET `url` and return the body as text.
    ///
    /// `read_timeout` should be false for requests that wait on something
    /// outside the host, such as a user typing a PIN.
    pub async fn request_text(&self, url: Url, read_timeout: bool) -> Result<String, HostError> {
        let response = self.execute(&url, read_timeout).await?;
        response.text().await.map_err(|e| transport_error(&url, e))
    }

    /// GET `url` and return the raw body.
    pub async fn request_bytes(&self, url: Url, read_timeout: bool) -> Result<Vec<u8>, HostError> {
        let response = self.execute(&url, read_timeout).await?;
        let body = response.bytes().await.map_err(|e| transport_error(&url, e))?;
        Ok(body.to_vec())
    }

    /// Forward a client request to the HTTPS port verbatim, without a read timeout.
    pub async fn forward_text(&self, path_and_query: &str) -> Result<String, HostError> {
        self.request_text(self.https_url(path_and_query)?, false).await
    }

    /// Binary variant of [`forward_text`](Self::forward_text).
    pub async fn forward_bytes(&self, path_and_query: &str) -> Result<Vec<u8>, HostError> {
        self.request_bytes(self.https_url(path_and_query)?, false).await
    }

    /// Fetch `/serverinfo`.
    ///
    /// A 401, whether from a rejected host certificate or from the XML
    /// envelope, retries once over plain HTTP and returns that response
    /// as-is.
    pub async fn get_server_info(&self) -> Result<String, HostError> {
        let url = self.https_url(&format!("/serverinfo?{}", identifying_query()))?;

        let attempt = match self.request_text(url, true).await {
            Ok(info) => xml::verify_response_status(&info).map(|()| info),
            Err(e) => Err(e),
        };

        match attempt {
            Err(HostError::Status { code: 401, message }) => {
                tracing::info!(reason = %message, "Host refused HTTPS server info; retrying over HTTP");
                self.request_text(self.http_url("/serverinfo")?, true).await
            }
            other => other,
        }
    }

    /// Fetch server info and read the pairing state out of it.
    pub async fn get_pair_state(&self) -> Result<PairState, HostError> {
        pair_state(&self.get_server_info().await?)
    }

    async fn execute(&self, url: &Url, read_timeout: bool) -> Result<reqwest::Response, HostError> {
        let client = self.build_client(url, read_timeout)?;

        tracing::debug!(url = %redacted(url), read_timeout, "Host request");
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(HostError::NotFound {
                url: redacted(url),
            });
        }
        Err(HostError::Status {
            code: i32::from(status.as_u16()),
            message: status.canonical_reason().unwrap_or_default().to_string(),
        })
    }

    fn build_client(&self, url: &Url, read_timeout: bool) -> Result<reqwest::Client, HostError> {
        let mut builder = reqwest::Client::builder()
            .no_proxy()
            .pool_max_idle_per_host(0)
            .connect_timeout(self.session.connect_timeout);

        if read_timeout {
            builder = builder.read_timeout(self.session.read_timeout);
        }
        if url.scheme() == "https" {
            let config = tls::client_config(self.identity.as_ref(), &self.trust)?;
            builder = builder.use_preconfigured_tls(config);
        }

        builder.build().map_err(|source| build_error(url, source))
    }
}

/// `uniqueid=...&uuid=...` sent with every server info request.
pub fn identifying_query() -> String {
    format!("uniqueid={UNIQUE_ID}&uuid={}", Uuid::new_v4())
}

/// `PairStatus` of "1" means paired; any other value means not paired.
pub fn pair_state(server_info: &str) -> Result<PairState, HostError> {
    if xml::require_text(server_info, "PairStatus")? == "1" {
        Ok(PairState::Paired)
    } else {
        Ok(PairState::NotPaired)
    }
}

/// The `appversion` field.
pub fn server_version(server_info: &str) -> Result<String, HostError> {
    xml::require_text(server_info, "appversion")
}

/// `appversion` split into its four numeric components.
pub fn server_app_version_quad(server_info: &str) -> Result<[i32; 4], HostError> {
    let version = server_version(server_info)?;
    parse_version_quad(&version)
}

pub fn server_major_version(server_info: &str) -> Result<i32, HostError> {
    Ok(server_app_version_quad(server_info)?[0])
}

fn parse_version_quad(version: &str) -> Result<[i32; 4], HostError> {
    let malformed = || HostError::MalformedVersion(version.to_string());

    let parts = version
        .split('.')
        .map(|part| part.parse::<i32>().map_err(|_| malformed()))
        .collect::<Result<Vec<_>, _>>()?;

    <[i32; 4]>::try_from(parts).map_err(|_| malformed())
}

fn join(base: &Url, path_and_query: &str) -> Result<Url, HostError> {
    if !path_and_query.starts_with('/') {
        return Err(HostError::InvalidPath(path_and_query.to_string()));
    }
    base.join(path_and_query)
        .map_err(|_| HostError::InvalidPath(path_and_query.to_string()))
}

fn transport_error(url: &Url, err: reqwest::Error) -> HostError {
    if tls::is_certificate_error(&err) {
        return HostError::Status {
            code: 401,
            message: "Server certificate mismatch".to_string(),
        };
    }
    if err.is_timeout() {
        return HostError::Timeout { url: redacted(url) };
    }
    HostError::Transport {
        url: redacted(url),
        source: err.without_url(),
    }
}

fn build_error(url: &Url, source: reqwest::Error) -> HostError {
    HostError::ClientBuild {
        url: redacted(url),
        source,
    }
}

/// URL without its query, which may carry pairing secrets.
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    const INFO: &str = r#"<root status_code="200"><appversion>7.1.431.0</appversion><PairStatus>1</PairStatus></root>"#;

    #[test]
    fn reads_pair_state() {
        assert_eq!(pair_state(INFO).unwrap(), PairState::Paired);

        let unpaired = r#"<root status_code="200"><PairStatus>0</PairStatus></root>"#;
        assert_eq!(pair_state(unpaired).unwrap(), PairState::NotPaired);

        let missing = r#"<root status_code="200"></root>"#;
        assert!(matches!(pair_state(missing), Err(HostError::MissingField(_))));
    }

    #[test]
    fn parses_version_quad() {
        assert_eq!(server_app_version_quad(INFO).unwrap(), [7, 1, 431, 0]);
        assert_eq!(server_major_version(INFO).unwrap(), 7);
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["7.1.431", "7.1.431.0.1", "7.x.431.0", ""] {
            assert!(
                matches!(parse_version_quad(bad), Err(HostError::MalformedVersion(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn builds_base_urls() {
        let timeouts = TimeoutConfig::default();
        let v4 = RemoteSession::new("10.0.0.5".parse().unwrap(), 47984, 47989, &timeouts).unwrap();
        assert_eq!(v4.https_base().as_str(), "https://10.0.0.5:47984/");
        assert_eq!(v4.http_base().as_str(), "http://10.0.0.5:47989/");

        let v6 = RemoteSession::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 47984, 47989, &timeouts).unwrap();
        assert_eq!(v6.https_base().as_str(), "https://[::1]:47984/");
    }

    #[test]
    fn identifying_query_uses_fixed_unique_id() {
        let query = identifying_query();
        assert!(query.starts_with("uniqueid=0123456789ABCDEF&uuid="));
        assert_ne!(query, identifying_query());
    }

    #[test]
    fn redacts_query() {
        let url = Url::parse("https://10.0.0.5:47984/pair?salt=abc").unwrap();
        assert_eq!(redacted(&url), "https://10.0.0.5:47984/pair");
    }

    #[test]
    fn client_build_errors_name_the_request() {
        let url = Url::parse("https://10.0.0.5:47984/serverinfo?uniqueid=0123456789ABCDEF").unwrap();
        let source = reqwest::Proxy::http("http://[::bad").unwrap_err();

        let message = build_error(&url, source).to_string();
        assert!(message.contains("https://10.0.0.5:47984/serverinfo"), "{message}");
        assert!(!message.contains("uniqueid"), "{message}");
    }
}
