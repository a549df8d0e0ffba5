//! Proxy-server half of the encapsulation: accepts tunnel exchanges, opens
//! the real outbound connection, and splices bytes both ways.

use std::convert::Infallible;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{ChannelBody, DEST_HEADER};

/// Serve tunnel exchanges on `listener` until it fails.
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let svc = service_fn(|req| async { Ok::<_, Infallible>(exchange(req).await) });
            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), svc)
                .await
            {
                debug!(%err, %peer, "tunnel connection ended");
            }
        });
    }
}

/// Handle one encapsulated exchange: connect to the destination named in the
/// request, feed it the request body, and stream its output back as the
/// response body.
pub async fn exchange(req: Request<Incoming>) -> Response<ChannelBody> {
    let Some(dest) = req
        .headers()
        .get(DEST_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
    else {
        return status_response(StatusCode::BAD_REQUEST);
    };

    let outbound = match TcpStream::connect(&dest).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%err, %dest, "outbound connect failed");
            return status_response(StatusCode::BAD_GATEWAY);
        }
    };
    let (mut rd, mut wr) = outbound.into_split();

    let mut body = req.into_body();
    tokio::spawn(async move {
        while let Some(frame) = body.frame().await {
            let Ok(frame) = frame else { break };
            if let Ok(data) = frame.into_data() {
                if wr.write_all(&data).await.is_err() {
                    break;
                }
            }
        }
        let _ = wr.shutdown().await;
    });

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            match rd.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    Response::new(ChannelBody::new(rx))
}

fn status_response(status: StatusCode) -> Response<ChannelBody> {
    let mut resp = Response::new(ChannelBody::closed());
    *resp.status_mut() = status;
    resp
}
