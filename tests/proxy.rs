//! End-to-end proxy behavior: client -> relay front end -> stub host.

use axum::http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;

use gamestream_relay::config::TimeoutConfig;
use gamestream_relay::host::{HostClient, RemoteSession};
use gamestream_relay::http::{self, HandlerRequest, Reply};
use gamestream_relay::identity::IdentityRole;
use gamestream_relay::net::tls::{self, TrustPolicy};
use gamestream_relay::proxy::{ProxyHandler, ReportedAddresses};

mod common;

fn reported() -> ReportedAddresses {
    ReportedAddresses {
        local: "192.168.1.2".to_string(),
        external: "203.0.113.9".to_string(),
    }
}

/// Start a plain-HTTP relay front end forwarding to `host`.
async fn start_relay(host: HostClient) -> SocketAddr {
    let handler = Arc::new(ProxyHandler::new(host, reported()));
    let (addr, _) = http::start("relay-http", common::localhost(), None, handler)
        .await
        .unwrap();
    addr
}

#[tokio::test]
async fn server_info_is_rewritten() {
    let stub = common::start_stub_host(|_| Reply::text(common::SERVER_INFO), |_| Reply::text("")).await;
    let client_id = common::identity(IdentityRole::Client);
    let relay = start_relay(common::host_client(&stub, &client_id, TrustPolicy::default())).await;

    let response = common::test_client()
        .get(format!("http://{relay}/serverinfo?uniqueid=CLIENT1&uuid=abc"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/plain");
    let body = response.text().await.unwrap();
    assert!(body.contains("<hostname>Shield (Open)</hostname>"));
    assert!(body.contains("<uniqueid>a123456789ABCDEF</uniqueid>"));
    assert!(body.contains("<LocalIP>192.168.1.2</LocalIP>"));
    assert!(body.contains("<ExternalIP>203.0.113.9</ExternalIP>"));
    assert!(body.contains("<PairStatus>1</PairStatus>"));

    assert_eq!(
        stub.requests(),
        vec!["https /serverinfo?uniqueid=CLIENT1&uuid=abc".to_string()]
    );
}

#[tokio::test]
async fn app_assets_pass_through_as_png() {
    let png: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x00, 0x01, 0xfe, 0xff];
    let body = png.clone();
    let stub = common::start_stub_host(move |_| Reply::png(body.clone()), |_| Reply::text("")).await;
    let client_id = common::identity(IdentityRole::Client);
    let relay = start_relay(common::host_client(&stub, &client_id, TrustPolicy::default())).await;

    let response = common::test_client()
        .get(format!("http://{relay}/appasset?appid=7&AssetType=2&AssetIdx=0"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.bytes().await.unwrap().to_vec(), png);
}

#[tokio::test]
async fn other_requests_pass_through_unmodified() {
    let applist = r#"<root status_code="200"><App><AppTitle>Desktop</AppTitle><ID>1</ID></App></root>"#;
    let stub = common::start_stub_host(move |_| Reply::text(applist), |_| Reply::text("")).await;
    let client_id = common::identity(IdentityRole::Client);
    let relay = start_relay(common::host_client(&stub, &client_id, TrustPolicy::default())).await;

    let response = common::test_client()
        .get(format!("http://{relay}/applist?uniqueid=CLIENT1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), applist);
    assert_eq!(stub.requests(), vec!["https /applist?uniqueid=CLIENT1".to_string()]);
}

#[tokio::test]
async fn host_not_found_becomes_404() {
    let stub = common::start_stub_host(
        |_| Reply::error(StatusCode::NOT_FOUND, "no such page"),
        |_| Reply::text(""),
    )
    .await;
    let client_id = common::identity(IdentityRole::Client);
    let relay = start_relay(common::host_client(&stub, &client_id, TrustPolicy::default())).await;

    let response = common::test_client()
        .get(format!("http://{relay}/nothing"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreachable_host_becomes_502() {
    let client_id = common::identity(IdentityRole::Client);
    let dead = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let session = RemoteSession::new(dead.ip(), dead.port(), dead.port(), &TimeoutConfig::default()).unwrap();
    let relay = start_relay(HostClient::new(session, client_id.store.clone(), TrustPolicy::default())).await;

    let response = common::test_client()
        .get(format!("http://{relay}/serverinfo"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn https_front_end_presents_server_identity() {
    let stub = common::start_stub_host(|_| Reply::text(common::SERVER_INFO), |_| Reply::text("")).await;
    let client_id = common::identity(IdentityRole::Client);
    let server_id = common::identity(IdentityRole::Server);

    let handler = Arc::new(ProxyHandler::new(
        common::host_client(&stub, &client_id, TrustPolicy::default()),
        reported(),
    ));
    let acceptor = tls::acceptor(server_id.store.as_ref()).unwrap();
    let (relay, _) = http::start("relay-https", common::localhost(), Some(acceptor), handler)
        .await
        .unwrap();

    let response = common::test_client()
        .get(format!("https://{relay}/serverinfo"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("Shield (Open)"));
}

#[tokio::test]
async fn broken_connections_do_not_stop_the_server() {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    let server_id = common::identity(IdentityRole::Server);
    let acceptor = tls::acceptor(server_id.store.as_ref()).unwrap();
    let handler = Arc::new(|_: HandlerRequest| async { Reply::text("alive") });
    let (addr, task) = http::start("relay-https", common::localhost(), Some(acceptor), handler)
        .await
        .unwrap();

    for _ in 0..3 {
        // Not a TLS ClientHello.
        let mut garbage = TcpStream::connect(addr).await.unwrap();
        garbage.write_all(b"GARBAGE\r\n\r\n").await.unwrap();
        drop(garbage);

        // Connect and hang up before any handshake.
        drop(TcpStream::connect(addr).await.unwrap());
    }

    let response = common::test_client()
        .get(format!("https://{addr}/serverinfo"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "alive");
    assert!(!task.is_finished());
}
