use bytes::Bytes;
use http::StatusCode;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::Response;
use thiserror::Error;

/// HTTP result type, T is typically a hyper::Response.
/// HttpError is used to generate a synthetic error response.
pub(crate) type HttpResult<T> = std::result::Result<T, HttpError>;

pub(crate) type RespBody = BoxBody<Bytes, hyper::Error>;

/// Describes things that can go wrong while dispatching a request
#[derive(Debug, Error, Clone)]
pub enum HttpError {
    #[error("Invalid host in request header")]
    InvalidHostInRequestHeader,

    #[error("No upstream servers configured")]
    NoUpstreamServers,

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Failed to get response from upstream: {0}")]
    FailedToGetResponseFromUpstream(String),
}

impl From<HttpError> for StatusCode {
    fn from(e: HttpError) -> StatusCode {
        match e {
            HttpError::InvalidHostInRequestHeader => StatusCode::BAD_REQUEST,
            HttpError::NoUpstreamServers => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::InvalidUri(_) => StatusCode::BAD_REQUEST,
            HttpError::FailedToGetResponseFromUpstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Build an empty response carrying a 4xx or 5xx status code.
pub(crate) fn synthetic_error_response(status: StatusCode) -> Response<RespBody> {
    let mut resp = Response::new(empty_body());
    *resp.status_mut() = status;
    resp
}

fn empty_body() -> RespBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}
