mod dispatch;
mod http_result;
mod server;
mod timed_stream;

pub use dispatch::{target_qos, QOS_HEADER};
pub use http_result::HttpError;
pub use server::Client;
