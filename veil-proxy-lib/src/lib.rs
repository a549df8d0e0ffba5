#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod load_balancing;
pub mod proxy;
pub mod tls;
pub mod upstream;

pub use config::{load_from_path, ClientConfig, Config, ServerInfo};
pub use error::{ProxyError, Result};
pub use proxy::{target_qos, Client, QOS_HEADER};
pub use tls::TlsDialer;
pub use upstream::ServerHandle;
