use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use veil_tunnel::TunnelConfig;

use crate::config::ClientConfig;
use crate::error::{ProxyError, Result};
use crate::load_balancing;
use crate::proxy::dispatch::{dispatch, target_qos};
use crate::proxy::http_result::{synthetic_error_response, HttpError, RespBody};
use crate::proxy::timed_stream::TimedStream;
use crate::upstream::ServerHandle;

/// Local proxy client: accepts browser traffic on a loopback listener and
/// relays it through the configured upstream servers.
pub struct Client {
    addr: SocketAddr,
    read_timeout: Duration,
    write_timeout: Duration,
    state: RwLock<State>,
}

/// Installed configuration, guarded as one unit: a reader sees `cfg`,
/// `servers` and `total_weight` from the same generation.
#[derive(Default)]
struct State {
    cfg: Option<ClientConfig>,
    servers: Vec<Arc<ServerHandle>>,
    total_weight: u64,
}

impl Client {
    pub fn new(addr: SocketAddr, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            addr,
            read_timeout,
            write_timeout,
            state: RwLock::new(State::default()),
        }
    }

    /// Install a new server set atomically.
    ///
    /// A configuration equal to the installed one is a no-op: the existing
    /// handles stay, and with them any dialer state such as cached TLS
    /// sessions. A build failure (for example a malformed root CA) aborts
    /// the whole installation and keeps the previous server set.
    pub fn configure(&self, cfg: ClientConfig) -> Result<()> {
        self.configure_with_tunnels(cfg, None)
    }

    /// Like [`Client::configure`], but each handle uses the corresponding
    /// pre-built tunnel configuration instead of one derived from its
    /// `ServerInfo`. The list must align with `cfg.servers`.
    pub fn configure_with_tunnels(
        &self,
        cfg: ClientConfig,
        tunnels: Option<Vec<TunnelConfig>>,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.cfg.as_ref() == Some(&cfg) {
            debug!("configuration unchanged, keeping existing servers");
            return Ok(());
        }

        let servers = match tunnels {
            Some(tunnels) => {
                if tunnels.len() != cfg.servers.len() {
                    return Err(ProxyError::Config(
                        "tunnel configuration count does not match server count".to_string(),
                    ));
                }
                cfg.servers
                    .iter()
                    .zip(tunnels)
                    .map(|(info, tunnel)| Arc::new(ServerHandle::with_tunnel_config(info, tunnel)))
                    .collect::<Vec<_>>()
            }
            None => cfg
                .servers
                .iter()
                .map(|info| ServerHandle::new(info).map(Arc::new))
                .collect::<Result<Vec<_>>>()?,
        };
        let total_weight = servers.iter().map(|s| u64::from(s.weight())).sum::<u64>();

        info!(servers = servers.len(), total_weight, "installing configuration");
        state.servers = servers;
        state.total_weight = total_weight;
        state.cfg = Some(cfg);
        Ok(())
    }

    /// Snapshot of the installed handles, in configuration order.
    pub fn servers(&self) -> Vec<Arc<ServerHandle>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .servers
            .clone()
    }

    pub fn total_weight(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .total_weight
    }

    /// Pick one upstream for a request demanding at least `min_qos`,
    /// together with the header-dump flag of the same configuration
    /// generation. The handle is cloned out so the lock is never held
    /// across I/O.
    fn pick_server(&self, min_qos: u32) -> Option<(Arc<ServerHandle>, bool)> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let dump_headers = state
            .cfg
            .as_ref()
            .is_some_and(|c| c.should_dump_headers);
        load_balancing::pick(&state.servers, state.total_weight, min_qos)
            .cloned()
            .map(|handle| (handle, dump_headers))
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn listen_and_serve(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await.map_err(ProxyError::Io)?;
        info!(addr = %self.addr, "listening");
        self.serve(listener).await
    }

    /// Serve inbound proxy connections from an existing listener.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let builder = ConnBuilder::new(TokioExecutor::new());
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept error");
                    continue;
                }
            };

            let client = Arc::clone(&self);
            let builder = builder.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(TimedStream::new(
                    stream,
                    client.read_timeout,
                    client.write_timeout,
                ));
                let svc = service_fn({
                    let client = Arc::clone(&client);
                    move |req: Request<Incoming>| {
                        let client = Arc::clone(&client);
                        async move { Ok::<_, hyper::Error>(client.handle(req).await) }
                    }
                });
                if let Err(err) = builder.serve_connection_with_upgrades(io, svc).await {
                    debug!(?peer, error = %err, "serve_connection error");
                }
            });
        }
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<RespBody> {
        let min_qos = target_qos(req.headers());
        let Some((handle, dump_headers)) = self.pick_server(min_qos) else {
            warn!("no servers configured, rejecting request");
            return synthetic_error_response(HttpError::NoUpstreamServers.into());
        };
        dispatch(req, handle, dump_headers).await
    }
}
