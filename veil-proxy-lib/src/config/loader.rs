use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{ProxyError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| ProxyError::Config(format!("Failed to read config file: {e}")))?;
    let cfg: Config = toml::from_str(&txt)
        .map_err(|e| ProxyError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.servers.is_empty() {
        return Err(ProxyError::NoServers);
    }

    for server in &cfg.servers {
        if server.host.is_empty() {
            return Err(ProxyError::Config("Server host must not be empty".to_string()));
        }
        if server.port == 0 {
            return Err(ProxyError::Config(format!(
                "Server {} has no front port",
                server.host
            )));
        }
        if let Some(pem) = &server.root_ca {
            crate::tls::parse_root_ca(pem)
                .map_err(|e| ProxyError::Config(format!("Server {}: {e}", server.host)))?;
        }
    }

    Ok(())
}
