mod helpers;

use std::sync::Arc;
use std::time::Duration;

use veil_proxy_lib::{Client, ClientConfig};

fn local_client() -> Client {
    Client::new(
        "127.0.0.1:0".parse().unwrap(),
        Duration::from_secs(30),
        Duration::from_secs(30),
    )
}

fn two_server_config() -> ClientConfig {
    // Verification is disabled so handle construction stays independent of
    // the platform trust store; these tests never dial.
    let mut a = helpers::server_info("origin-a.example", 443);
    a.weight = 25;
    a.insecure_skip_verify = true;
    let mut b = helpers::server_info("origin-b.example", 443);
    b.weight = 75;
    b.qos = 5;
    b.insecure_skip_verify = true;
    ClientConfig {
        servers: vec![a, b],
        should_dump_headers: false,
    }
}

#[test]
fn total_weight_matches_sum_of_weights() {
    let client = local_client();
    client.configure(two_server_config()).unwrap();
    let servers = client.servers();
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0].weight(), 25);
    assert_eq!(servers[1].weight(), 75);
    assert_eq!(client.total_weight(), 100);
}

#[test]
fn weight_and_qos_defaults_are_applied() {
    let client = local_client();
    let mut info = helpers::server_info("origin.example", 443);
    info.insecure_skip_verify = true;
    let cfg = ClientConfig {
        servers: vec![info],
        should_dump_headers: false,
    };
    client.configure(cfg).unwrap();
    let servers = client.servers();
    assert_eq!(servers[0].weight(), 100);
    assert_eq!(servers[0].qos(), 0);
    assert_eq!(client.total_weight(), 100);
}

#[test]
fn server_order_matches_configuration_order() {
    let client = local_client();
    client.configure(two_server_config()).unwrap();
    let servers = client.servers();
    assert_eq!(servers[0].tunnel().upstream_host(), "origin-a.example");
    assert_eq!(servers[1].tunnel().upstream_host(), "origin-b.example");
}

#[test]
fn reconfigure_with_equal_config_keeps_handles() {
    let client = local_client();
    let cfg = two_server_config();
    client.configure(cfg.clone()).unwrap();
    let before = client.servers();

    client.configure(cfg).unwrap();
    let after = client.servers();

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert!(Arc::ptr_eq(b, a));
    }
}

#[test]
fn reconfigure_with_changed_config_rebuilds_handles() {
    let client = local_client();
    let mut cfg = two_server_config();
    client.configure(cfg.clone()).unwrap();
    let before = client.servers();

    cfg.servers[0].weight = 40;
    client.configure(cfg).unwrap();
    let after = client.servers();

    assert!(!Arc::ptr_eq(&before[0], &after[0]));
    assert_eq!(client.total_weight(), 115);
}

#[test]
fn invalid_root_ca_aborts_reconfiguration() {
    let pki = helpers::generate_pki(&["front.example"]);
    let mut good = two_server_config();
    for server in &mut good.servers {
        server.insecure_skip_verify = false;
        server.root_ca = Some(pki.ca_pem.clone());
    }

    let client = local_client();
    client.configure(good.clone()).unwrap();
    let before = client.servers();

    let mut bad = good;
    bad.servers[0].root_ca = Some("not a pem".to_string());
    assert!(client.configure(bad).is_err());

    // The previous configuration stays installed, untouched.
    let after = client.servers();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert!(Arc::ptr_eq(b, a));
    }
    assert_eq!(client.total_weight(), 100);
}

#[test]
fn tunnel_hook_uses_supplied_configs_in_order() {
    let client = local_client();
    let tunnels = vec![
        helpers::dummy_tunnel("alpha.example"),
        helpers::dummy_tunnel("beta.example"),
    ];
    client
        .configure_with_tunnels(two_server_config(), Some(tunnels))
        .unwrap();
    let servers = client.servers();
    assert_eq!(servers[0].tunnel().upstream_host(), "alpha.example");
    assert_eq!(servers[1].tunnel().upstream_host(), "beta.example");
}

#[test]
fn tunnel_hook_count_mismatch_is_rejected() {
    let client = local_client();
    let tunnels = vec![helpers::dummy_tunnel("alpha.example")];
    assert!(client
        .configure_with_tunnels(two_server_config(), Some(tunnels))
        .is_err());
    assert!(client.servers().is_empty());
}
