use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::{upgrade, Request};
use hyper_util::rt::TokioIo;
use tracing::{debug, warn};

use crate::Tunnel;

type RespBody = BoxBody<Bytes, hyper::Error>;

/// Take over an inbound CONNECT request: accept the hijack, open a fresh
/// tunnel stream to the requested authority, and splice bytes until either
/// side closes.
///
/// The `200 OK` is returned before the tunnel is dialed; a dial failure
/// surfaces to the local client as a closed socket.
pub fn intercept(tunnel: &Tunnel, req: Request<Incoming>) -> Response<RespBody> {
    let Some(authority) = req.uri().authority().map(|a| a.to_string()) else {
        warn!(uri = %req.uri(), "CONNECT without authority");
        return status_response(StatusCode::BAD_REQUEST);
    };

    let tunnel = tunnel.clone();
    tokio::spawn(async move {
        let upgraded = match upgrade::on(req).await {
            Ok(upgraded) => upgraded,
            Err(err) => {
                warn!(%err, "CONNECT upgrade failed");
                return;
            }
        };
        let mut upstream = match tunnel.dial(&authority).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, addr = %authority, "tunnel dial failed");
                return;
            }
        };
        let mut downstream = TokioIo::new(upgraded);
        match tokio::io::copy_bidirectional(&mut downstream, &mut upstream).await {
            Ok((up, down)) => debug!(addr = %authority, up, down, "tunnel closed"),
            Err(err) => debug!(%err, addr = %authority, "tunnel ended with error"),
        }
    });

    status_response(StatusCode::OK)
}

fn status_response(status: StatusCode) -> Response<RespBody> {
    let mut resp = Response::new(Empty::<Bytes>::new().map_err(|never| match never {}).boxed());
    *resp.status_mut() = status;
    resp
}
