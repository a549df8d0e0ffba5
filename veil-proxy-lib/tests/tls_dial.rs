mod helpers;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::rustls::server::Acceptor;
use tokio_rustls::{LazyConfigAcceptor, TlsAcceptor};
use veil_proxy_lib::TlsDialer;

/// TLS server that accepts handshakes with the given PKI until dropped.
async fn spawn_tls_server(pki: &helpers::TestPki) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(helpers::server_tls_config(
        pki.cert.clone(),
        pki.key.clone_key(),
    )));
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let _ = acceptor.accept(stream).await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn certificate_valid_for_the_masquerade_host_is_accepted() {
    // Cert is valid for "localhost" (the masquerade), not for the origin.
    let pki = helpers::generate_pki(&["localhost"]);
    let addr = spawn_tls_server(&pki).await;

    let mut info = helpers::server_info("origin.example", addr.port());
    info.masquerade_as = Some("localhost".to_string());
    info.root_ca = Some(pki.ca_pem.clone());

    let dialer = TlsDialer::new(&info).unwrap();
    dialer
        .dial("origin.example:443")
        .await
        .expect("masquerade-valid certificate accepted");
}

#[tokio::test]
async fn certificate_valid_only_for_the_origin_is_rejected() {
    let pki = helpers::generate_pki(&["origin.example"]);
    let addr = spawn_tls_server(&pki).await;

    let mut info = helpers::server_info("origin.example", addr.port());
    info.masquerade_as = Some("localhost".to_string());
    info.root_ca = Some(pki.ca_pem.clone());

    let dialer = TlsDialer::new(&info).unwrap();
    assert!(dialer.dial("origin.example:443").await.is_err());
}

#[tokio::test]
async fn untrusted_ca_is_rejected() {
    let server_pki = helpers::generate_pki(&["localhost"]);
    let other_pki = helpers::generate_pki(&["localhost"]);
    let addr = spawn_tls_server(&server_pki).await;

    let mut info = helpers::server_info("localhost", addr.port());
    info.root_ca = Some(other_pki.ca_pem.clone());

    let dialer = TlsDialer::new(&info).unwrap();
    assert!(dialer.dial("localhost:443").await.is_err());
}

#[tokio::test]
async fn insecure_skip_verify_accepts_any_certificate() {
    let pki = helpers::generate_pki(&["elsewhere.example"]);
    let addr = spawn_tls_server(&pki).await;

    let mut info = helpers::server_info("origin.example", addr.port());
    info.masquerade_as = Some("localhost".to_string());
    info.insecure_skip_verify = true;

    let dialer = TlsDialer::new(&info).unwrap();
    dialer
        .dial("origin.example:443")
        .await
        .expect("verification disabled");
}

#[tokio::test]
async fn client_hello_carries_no_sni() {
    let pki = helpers::generate_pki(&["localhost"]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = Arc::new(helpers::server_tls_config(
        pki.cert.clone(),
        pki.key.clone_key(),
    ));
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        match LazyConfigAcceptor::new(Acceptor::default(), stream).await {
            Ok(start) => {
                let sni = start.client_hello().server_name().map(str::to_owned);
                let _ = tx.send(sni);
                let _ = start.into_stream(config).await;
            }
            Err(_) => {
                let _ = tx.send(Some("handshake failed".to_string()));
            }
        }
    });

    let mut info = helpers::server_info("localhost", port);
    info.root_ca = Some(pki.ca_pem.clone());
    let dialer = TlsDialer::new(&info).unwrap();
    dialer.dial("origin.example:443").await.unwrap();

    assert_eq!(rx.await.unwrap(), None);
}

#[tokio::test]
async fn dial_deadline_bounds_unreachable_fronts() {
    // RFC 5737 TEST-NET-1 drops SYNs; depending on the local network stack
    // the dial either hits the configured deadline or fails outright. It
    // must never hang past the deadline.
    let mut info = helpers::server_info("192.0.2.1", 443);
    info.dial_timeout_ms = 200;
    info.insecure_skip_verify = true;

    let dialer = TlsDialer::new(&info).unwrap();
    let result =
        tokio::time::timeout(std::time::Duration::from_secs(5), dialer.dial("origin.example:443"))
            .await;
    match result {
        Ok(Err(_)) => {}
        Ok(Ok(_)) => panic!("dial unexpectedly succeeded"),
        Err(_) => panic!("dial ran past its deadline"),
    }
}
