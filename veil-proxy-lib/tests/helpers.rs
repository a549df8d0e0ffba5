//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, Issuer, KeyPair};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use veil_proxy_lib::ServerInfo;
use veil_tunnel::{BoxedStream, TunnelConfig};

/// A CA plus one leaf certificate signed by it.
pub struct TestPki {
    pub ca_pem: String,
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
}

/// Generate a CA and a leaf certificate valid for `names`.
pub fn generate_pki(names: &[&str]) -> TestPki {
    let ca_key = KeyPair::generate().expect("generate CA key");
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "veil test ca");
    let ca_cert = ca_params.clone().self_signed(&ca_key).expect("self-sign CA");
    let ca_pem = ca_cert.pem();
    let issuer = Issuer::from_params(&ca_params, &ca_key);

    let leaf_key = KeyPair::generate().expect("generate leaf key");
    let leaf_params =
        CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
            .expect("leaf params");
    let leaf = leaf_params.signed_by(&leaf_key, &issuer).expect("sign leaf");

    TestPki {
        ca_pem,
        cert: CertificateDer::from(leaf.der().to_vec()),
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der())),
    }
}

/// rustls server config serving the given certificate.
pub fn server_tls_config(
    cert: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
) -> tokio_rustls::rustls::ServerConfig {
    tokio_rustls::rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .expect("server config")
}

pub fn server_info(host: &str, port: u16) -> ServerInfo {
    ServerInfo {
        host: host.to_string(),
        port,
        masquerade_as: None,
        root_ca: None,
        insecure_skip_verify: false,
        dial_timeout_ms: 0,
        keep_alive_ms: 0,
        weight: 0,
        qos: 0,
    }
}

/// Tunnel config whose proxy dialer always fails; selection-only tests never
/// dial.
pub fn dummy_tunnel(host: &str) -> TunnelConfig {
    TunnelConfig {
        dial_proxy: Arc::new(|_addr| {
            Box::pin(async {
                Err::<BoxedStream, _>(std::io::Error::other("dialing disabled in this test"))
            })
        }),
        upstream_host: host.to_string(),
    }
}
