use std::io::{self, BufReader, Cursor};
use std::sync::Arc;
use std::time::Duration;

use rustls_pki_types::{CertificateDer, ServerName};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::Resumption;
use tokio_rustls::rustls::{ClientConfig as TlsClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::ServerInfo;
use crate::error::{ProxyError, Result};
use crate::tls::verify::{FrontVerifier, InsecureVerifier};

/// TLS sessions cached per dialer so repeated dials to the same front can
/// resume instead of doing full handshakes.
pub const SESSION_CACHE_SIZE: usize = 1000;

/// Dialer that opens fronted TLS connections to one upstream.
///
/// Every dial connects to the fixed front endpoint; the address handed in by
/// the tunnel layer names the logical destination and is ignored here. The
/// ClientHello carries no SNI extension: the front CDN cross-checks SNI
/// against the tunnelled Host header, and that header names the real origin
/// rather than the front. Certificate verification still runs against the
/// front hostname.
pub struct TlsDialer {
    front_addr: String,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    dial_timeout: Duration,
    keep_alive: Duration,
}

impl TlsDialer {
    pub fn new(info: &ServerInfo) -> Result<Self> {
        let front = info.front_host();
        let server_name = ServerName::try_from(front.to_string())
            .map_err(|_| ProxyError::Tls(format!("invalid front host name: {front}")))?;

        let mut tls = if info.insecure_skip_verify {
            TlsClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
                .with_no_client_auth()
        } else {
            let roots = Arc::new(trust_roots(info.root_ca.as_deref())?);
            TlsClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(FrontVerifier::new(roots, front)?))
                .with_no_client_auth()
        };
        tls.enable_sni = false;
        tls.resumption = Resumption::in_memory_sessions(SESSION_CACHE_SIZE);

        Ok(Self {
            front_addr: info.front_addr(),
            server_name,
            connector: TlsConnector::from(Arc::new(tls)),
            dial_timeout: info.dial_timeout(),
            keep_alive: info.keep_alive(),
        })
    }

    /// Open an authenticated stream to the front endpoint. `addr` names the
    /// logical destination requested by the tunnel layer; the connection
    /// always goes to the configured front.
    pub async fn dial(&self, addr: &str) -> io::Result<TlsStream<TcpStream>> {
        debug!(front = %self.front_addr, dest = %addr, "dialing front");
        let tcp = timeout(self.dial_timeout, TcpStream::connect(&self.front_addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("dial {} timed out", self.front_addr),
                )
            })??;
        tcp.set_nodelay(true)?;
        let keepalive = TcpKeepalive::new()
            .with_time(self.keep_alive)
            .with_interval(self.keep_alive);
        SockRef::from(&tcp).set_tcp_keepalive(&keepalive)?;

        self.connector.connect(self.server_name.clone(), tcp).await
    }
}

/// Parse a PEM bundle into DER certificates, rejecting empty input.
pub fn parse_root_ca(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(Cursor::new(pem.as_bytes()));
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ProxyError::Config(format!("invalid root CA PEM: {e}")))?;
    if certs.is_empty() {
        return Err(ProxyError::Config(
            "root CA PEM contains no certificate".to_string(),
        ));
    }
    Ok(certs)
}

fn trust_roots(root_ca: Option<&str>) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match root_ca {
        Some(pem) => {
            let (added, _) = roots.add_parsable_certificates(parse_root_ca(pem)?);
            if added == 0 {
                return Err(ProxyError::Config(
                    "root CA PEM contains no usable certificate".to_string(),
                ));
            }
        }
        None => {
            for cert in rustls_native_certs::load_native_certs().certs {
                let _ = roots.add(cert);
            }
        }
    }
    Ok(roots)
}
