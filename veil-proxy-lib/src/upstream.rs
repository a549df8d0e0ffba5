use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::Uri;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use veil_tunnel::{BoxedStream, DialProxyFn, Tunnel, TunnelConfig, TunnelStream};

use crate::config::ServerInfo;
use crate::error::Result;
use crate::tls::TlsDialer;

/// Per-upstream bundle: tunnel dialer, forwarding client, selection metadata.
///
/// Handles are immutable once installed. The configurator builds a fresh set
/// on every change; requests already dispatched to a retired handle keep
/// using it until they finish.
pub struct ServerHandle {
    weight: u32,
    qos: u32,
    tunnel: Tunnel,
    client: HttpClient<TunnelConnector, Incoming>,
}

impl ServerHandle {
    /// Build a handle whose tunnel rides fronted TLS to `info`'s endpoint.
    pub fn new(info: &ServerInfo) -> Result<Self> {
        let dialer = Arc::new(TlsDialer::new(info)?);
        let dial_proxy: DialProxyFn = Arc::new(move |addr: String| {
            let dialer = Arc::clone(&dialer);
            Box::pin(async move {
                let stream = dialer.dial(&addr).await?;
                Ok(Box::new(stream) as BoxedStream)
            })
        });
        Ok(Self::with_tunnel_config(
            info,
            TunnelConfig {
                dial_proxy,
                upstream_host: info.host.clone(),
            },
        ))
    }

    /// Build a handle around an externally supplied tunnel configuration.
    pub fn with_tunnel_config(info: &ServerInfo, config: TunnelConfig) -> Self {
        let tunnel = Tunnel::new(config);
        // One connection per request: some upstreams advertise keepalive and
        // then close immediately, which would surface as a spurious error on
        // the next pooled use.
        let client = HttpClient::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(TunnelConnector {
                tunnel: tunnel.clone(),
            });
        Self {
            weight: info.effective_weight(),
            qos: info.qos,
            tunnel,
            client,
        }
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn qos(&self) -> u32 {
        self.qos
    }

    pub fn tunnel(&self) -> &Tunnel {
        &self.tunnel
    }

    pub(crate) fn http_client(&self) -> &HttpClient<TunnelConnector, Incoming> {
        &self.client
    }
}

/// Connector that opens upstream connections through the handle's tunnel.
#[derive(Clone)]
pub struct TunnelConnector {
    tunnel: Tunnel,
}

impl tower_service::Service<Uri> for TunnelConnector {
    type Response = TokioIo<TunnelIo>;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = io::Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let tunnel = self.tunnel.clone();
        Box::pin(async move {
            let host = dst
                .host()
                .ok_or_else(|| io::Error::other(format!("no host in {dst}")))?;
            let port = dst.port_u16().unwrap_or(80);
            let addr = format!("{host}:{port}");
            let stream = tunnel.dial(&addr).await?;
            Ok(TokioIo::new(TunnelIo(stream)))
        })
    }
}

/// Newtype giving tunnel streams the connection metadata hyper's pool wants.
pub struct TunnelIo(TunnelStream);

impl Connection for TunnelIo {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl AsyncRead for TunnelIo {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for TunnelIo {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}
