use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// One upstream proxy endpoint reachable through a fronted TLS connection.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerInfo {
    /// Real origin host the upstream proxy is addressed as.
    /// This name goes into the HTTP Host header inside the tunnel.
    pub host: String,
    /// TCP port of the front endpoint.
    pub port: u16,
    /// Host used for DNS resolution and certificate verification.
    /// When unset or empty, `host` is used for both.
    #[serde(default)]
    pub masquerade_as: Option<String>,
    /// PEM-encoded certificate; when present it forms the sole trust anchor
    /// for server verification.
    #[serde(default)]
    pub root_ca: Option<String>,
    /// Disable certificate verification entirely. Testing only.
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// TCP dial deadline in milliseconds. 0 means 5000.
    #[serde(default)]
    pub dial_timeout_ms: u64,
    /// TCP keepalive probe interval in milliseconds. 0 means 70000.
    #[serde(default)]
    pub keep_alive_ms: u64,
    /// Selection weight. 0 means 100.
    #[serde(default)]
    pub weight: u32,
    /// Quality of service; higher is better.
    #[serde(default)]
    pub qos: u32,
}

impl ServerInfo {
    /// Name the TLS connection is resolved and verified against.
    pub fn front_host(&self) -> &str {
        match &self.masquerade_as {
            Some(masquerade) if !masquerade.is_empty() => masquerade,
            _ => &self.host,
        }
    }

    /// `host:port` of the front endpoint.
    pub fn front_addr(&self) -> String {
        format!("{}:{}", self.front_host(), self.port)
    }

    pub fn dial_timeout(&self) -> Duration {
        match self.dial_timeout_ms {
            0 => Duration::from_millis(5000),
            ms => Duration::from_millis(ms),
        }
    }

    pub fn keep_alive(&self) -> Duration {
        match self.keep_alive_ms {
            0 => Duration::from_millis(70_000),
            ms => Duration::from_millis(ms),
        }
    }

    pub fn effective_weight(&self) -> u32 {
        match self.weight {
            0 => 100,
            weight => weight,
        }
    }
}

/// Server set handed to the client configurator.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ClientConfig {
    /// Upstream proxies, in selection-walk order.
    #[serde(default)]
    pub servers: Vec<ServerInfo>,
    /// Log request and response header blocks for every proxied request.
    #[serde(default)]
    pub should_dump_headers: bool,
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port to listen on
    /// Example: "127.0.0.1:8787"
    pub listen: SocketAddr,
    /// Read timeout for local connections, in milliseconds. 0 disables.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Write timeout for local connections, in milliseconds. 0 disables.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Upstream proxies, in selection-walk order.
    /// At least one server is required.
    pub servers: Vec<ServerInfo>,
    /// Log request and response header blocks for every proxied request.
    #[serde(default)]
    pub should_dump_headers: bool,
}

fn default_read_timeout_ms() -> u64 {
    90_000
}

fn default_write_timeout_ms() -> u64 {
    90_000
}

impl Config {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// The reconfigurable portion of this configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            servers: self.servers.clone(),
            should_dump_headers: self.should_dump_headers,
        }
    }
}
