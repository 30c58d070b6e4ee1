//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use gamestream_relay::config::TimeoutConfig;
use gamestream_relay::host::{HostClient, RemoteSession};
use gamestream_relay::http::{self, HandlerRequest, Reply, RequestHandler};
use gamestream_relay::identity::{IdentityRole, IdentityStore};
use gamestream_relay::net::tls::{self, TrustPolicy};

pub const SERVER_INFO: &str = concat!(
    r#"<root status_code="200"><hostname>Shield</hostname>"#,
    "<uniqueid>0123456789ABCDEF</uniqueid><LocalIP>10.0.0.5</LocalIP>",
    "<ExternalIP>1.2.3.4</ExternalIP><PairStatus>1</PairStatus></root>"
);

pub const UNPAIRED_INFO: &str = concat!(
    r#"<root status_code="200"><hostname>Shield</hostname>"#,
    "<uniqueid>0123456789ABCDEF</uniqueid><PairStatus>0</PairStatus></root>"
);

pub fn localhost() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// A freshly generated identity in its own temp directory.
pub struct TestIdentity {
    pub store: Arc<IdentityStore>,
    _dir: TempDir,
}

pub fn identity(role: IdentityRole) -> TestIdentity {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(IdentityStore::new(role, dir.path().join("id.crt"), dir.path().join("id.key")));
    store.identity().unwrap();
    TestIdentity { store, _dir: dir }
}

/// Log of `scheme path?query` for every request a stub received.
pub type RequestLog = Arc<Mutex<Vec<String>>>;

struct Recording<F> {
    scheme: &'static str,
    log: RequestLog,
    respond: F,
}

impl<F> RequestHandler for Recording<F>
where
    F: Fn(&HandlerRequest) -> Reply + Send + Sync + 'static,
{
    async fn handle(&self, request: HandlerRequest) -> Reply {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} {}", self.scheme, request.path_and_query()));
        (self.respond)(&request)
    }
}

/// A fake streaming host: an HTTPS port with its own identity and an HTTP port.
pub struct StubHost {
    pub https_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub requests: RequestLog,
    pub identity: TestIdentity,
}

impl StubHost {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub async fn start_stub_host<A, B>(https: A, http: B) -> StubHost
where
    A: Fn(&HandlerRequest) -> Reply + Send + Sync + 'static,
    B: Fn(&HandlerRequest) -> Reply + Send + Sync + 'static,
{
    let identity = identity(IdentityRole::Server);
    let requests = RequestLog::default();

    let acceptor = tls::acceptor(identity.store.as_ref()).unwrap();
    let https_handler = Recording {
        scheme: "https",
        log: Arc::clone(&requests),
        respond: https,
    };
    let (https_addr, _) = http::start("stub-https", localhost(), Some(acceptor), Arc::new(https_handler))
        .await
        .unwrap();

    let http_handler = Recording {
        scheme: "http",
        log: Arc::clone(&requests),
        respond: http,
    };
    let (http_addr, _) = http::start("stub-http", localhost(), None, Arc::new(http_handler))
        .await
        .unwrap();

    StubHost {
        https_addr,
        http_addr,
        requests,
        identity,
    }
}

/// A host client pointed at `stub`, presenting a fresh client identity.
pub fn host_client(stub: &StubHost, client: &TestIdentity, trust: TrustPolicy) -> HostClient {
    let timeouts = TimeoutConfig {
        connect_ms: 2000,
        read_ms: 2000,
    };
    let session = RemoteSession::new(
        stub.https_addr.ip(),
        stub.https_addr.port(),
        stub.http_addr.port(),
        &timeouts,
    )
    .unwrap();
    HostClient::new(session, client.store.clone(), trust)
}

/// Test-side HTTP client that accepts the relay's self-signed certificate.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
