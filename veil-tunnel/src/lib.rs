#![forbid(unsafe_code)]

//! HTTP-encapsulated byte tunnels.
//!
//! A [`Tunnel`] turns a transport obtained from a caller-supplied dialer into
//! a full-duplex byte channel to an arbitrary TCP endpoint. The bytes ride
//! inside an HTTP exchange addressed to the configured upstream host: the
//! request body carries the client-to-upstream direction, the response body
//! carries the reverse, and the logical destination travels in the
//! [`DEST_HEADER`] request header. The proxy half of the exchange lives in
//! [`server`].

mod body;
mod intercept;
pub mod server;
mod stream;

pub use body::ChannelBody;
pub use intercept::intercept;
pub use stream::TunnelStream;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use http::{header, Method, Request};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;
use tracing::debug;

/// Request header carrying the logical destination address through the
/// encapsulation.
pub const DEST_HEADER: &str = "x-veil-dest";

/// Bidirectional byte stream usable as the transport under a tunnel.
pub trait ProxyStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ProxyStream for T {}

pub type BoxedStream = Box<dyn ProxyStream>;

/// Opens a transport to the upstream proxy. The argument is the logical
/// destination the tunnel wants to reach; implementations typically ignore
/// it and connect to a fixed endpoint.
pub type DialProxyFn =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = io::Result<BoxedStream>> + Send>> + Send + Sync>;

#[derive(Clone)]
pub struct TunnelConfig {
    /// Opens the transport the encapsulated exchange rides on.
    pub dial_proxy: DialProxyFn,
    /// Host every encapsulation request is addressed to.
    pub upstream_host: String,
}

/// Factory for encapsulated byte channels over one upstream proxy.
#[derive(Clone)]
pub struct Tunnel {
    config: TunnelConfig,
}

impl Tunnel {
    pub fn new(config: TunnelConfig) -> Self {
        Self { config }
    }

    pub fn upstream_host(&self) -> &str {
        &self.config.upstream_host
    }

    /// Open a byte channel to `addr` through the upstream proxy.
    ///
    /// Fails when the transport cannot be opened, the HTTP exchange cannot
    /// be established, or the proxy refuses the destination.
    pub async fn dial(&self, addr: &str) -> io::Result<TunnelStream> {
        let transport = (self.config.dial_proxy)(addr.to_string()).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(transport))
            .await
            .map_err(io::Error::other)?;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                debug!(%err, "tunnel transport closed");
            }
        });

        let (tx, rx) = mpsc::channel(32);
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("http://{}/", self.config.upstream_host))
            .header(header::HOST, self.config.upstream_host.as_str())
            .header(DEST_HEADER, addr)
            .body(ChannelBody::new(rx))
            .map_err(io::Error::other)?;

        let resp = sender.send_request(req).await.map_err(io::Error::other)?;
        if !resp.status().is_success() {
            return Err(io::Error::other(format!(
                "upstream proxy refused tunnel to {addr}: {}",
                resp.status()
            )));
        }
        Ok(TunnelStream::new(PollSender::new(tx), resp.into_body()))
    }
}
