use std::sync::Arc;

use http::header::HOST;
use http::{HeaderMap, Method, StatusCode, Uri};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use tracing::{error, info};

use crate::proxy::http_result::{synthetic_error_response, HttpError, HttpResult, RespBody};
use crate::upstream::ServerHandle;

/// Request header naming the minimum QoS the caller will accept.
pub const QOS_HEADER: &str = "x-flashlight-qos";

/// Parse the QoS floor requested by the client. Missing or malformed values
/// mean no floor.
pub fn target_qos(headers: &HeaderMap) -> u32 {
    headers
        .get(QOS_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Classify one inbound request and hand it to the selected upstream:
/// CONNECT is hijacked into a raw tunnel, everything else is reverse-proxied.
pub(crate) async fn dispatch(
    req: Request<Incoming>,
    handle: Arc<ServerHandle>,
    dump_headers: bool,
) -> Response<RespBody> {
    if req.method() == Method::CONNECT {
        return veil_tunnel::intercept(handle.tunnel(), req);
    }

    if dump_headers {
        info!(
            method = %req.method(),
            uri = %req.uri(),
            headers = %format_header_block(req.headers()),
            "request headers"
        );
    }

    match forward(req, &handle).await {
        Ok(resp) => {
            if dump_headers {
                info!(
                    status = %resp.status(),
                    headers = %format_header_block(resp.headers()),
                    "response headers"
                );
            }
            resp
        }
        Err(err) => {
            error!(%err, "request failed");
            synthetic_error_response(StatusCode::from(err))
        }
    }
}

/// Forward the request verbatim through the handle's tunnel-backed client.
/// Origin-form URIs (from clients not speaking proxy-style requests) are
/// rebuilt from the Host header first.
async fn forward(
    mut req: Request<Incoming>,
    handle: &ServerHandle,
) -> HttpResult<Response<RespBody>> {
    if req.uri().authority().is_none() {
        let host = req
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .ok_or(HttpError::InvalidHostInRequestHeader)?;
        let uri = format!(
            "http://{}{}",
            host,
            req.uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/")
        )
        .parse::<Uri>()
        .map_err(|e| HttpError::InvalidUri(e.to_string()))?;
        *req.uri_mut() = uri;
    }

    match handle.http_client().request(req).await {
        Ok(resp) => Ok(resp.map(|b| b.boxed())),
        Err(e) => Err(HttpError::FailedToGetResponseFromUpstream(e.to_string())),
    }
}

fn format_header_block(headers: &HeaderMap) -> String {
    let mut block = String::new();
    for (name, value) in headers {
        block.push_str(name.as_str());
        block.push_str(": ");
        block.push_str(value.to_str().unwrap_or("<binary>"));
        block.push('\n');
    }
    block
}
