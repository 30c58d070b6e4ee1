//! Port selection at startup.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use gamestream_relay::config::RelayConfig;
use gamestream_relay::http::{HandlerRequest, Reply};
use gamestream_relay::identity::IdentityRole;
use gamestream_relay::lifecycle::{self, PortMode};
use gamestream_relay::net::tls;

mod common;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Every port ephemeral, one relay of each kind.
fn ephemeral_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_ip = LOOPBACK;
    config.listener.https_port = 0;
    config.listener.http_port = 0;
    config.listener.sxs_https_port = 0;
    config.listener.sxs_http_port = 0;
    config.relay.tcp_ports = vec![0];
    config.relay.udp_ports = vec![0];
    config
}

async fn answer(_: HandlerRequest) -> Reply {
    Reply::text("relay")
}

#[tokio::test]
async fn primary_ports_start_everything() {
    let server_id = common::identity(IdentityRole::Server);
    let acceptor = tls::acceptor(server_id.store.as_ref()).unwrap();

    let launched = lifecycle::launch(&ephemeral_config(), LOOPBACK, acceptor, Arc::new(answer))
        .await
        .unwrap();

    assert_eq!(launched.mode, PortMode::Primary);
    assert_eq!(launched.tcp_relays.len(), 1);
    assert_eq!(launched.udp_relays.len(), 1);
    assert_eq!(launched.tasks.len(), 4);

    let client = common::test_client();
    let http = client
        .get(format!("http://{}/serverinfo", launched.http_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(http.text().await.unwrap(), "relay");
    let https = client
        .get(format!("https://{}/serverinfo", launched.https_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(https.text().await.unwrap(), "relay");

    launched.abort();
}

#[tokio::test]
async fn taken_media_port_falls_back_to_side_by_side() {
    let occupied = std::net::TcpListener::bind((LOOPBACK, 0)).unwrap();
    let mut config = ephemeral_config();
    config.relay.tcp_ports = vec![occupied.local_addr().unwrap().port()];

    let server_id = common::identity(IdentityRole::Server);
    let acceptor = tls::acceptor(server_id.store.as_ref()).unwrap();

    let launched = lifecycle::launch(&config, LOOPBACK, acceptor, Arc::new(answer))
        .await
        .unwrap();

    assert_eq!(launched.mode, PortMode::SideBySide);
    assert!(launched.tcp_relays.is_empty());
    assert!(launched.udp_relays.is_empty());
    assert_eq!(launched.tasks.len(), 2);

    let response = common::test_client()
        .get(format!("http://{}/serverinfo", launched.http_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "relay");

    launched.abort();
}

#[tokio::test]
async fn other_bind_failures_are_fatal() {
    let mut config = ephemeral_config();
    // Not an address of this machine.
    config.listener.bind_ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

    let server_id = common::identity(IdentityRole::Server);
    let acceptor = tls::acceptor(server_id.store.as_ref()).unwrap();

    let err = lifecycle::launch(&config, LOOPBACK, acceptor, Arc::new(answer))
        .await
        .err()
        .unwrap();
    assert!(!err.is_addr_in_use());
}
