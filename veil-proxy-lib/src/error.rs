use thiserror::Error;

/// Failures surfaced by the fronting client core
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("fronted TLS: {0}")]
    Tls(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("http exchange: {0}")]
    Http(String),

    #[error("no upstream servers configured")]
    NoServers,
}

pub type Result<T> = std::result::Result<T, ProxyError>;
