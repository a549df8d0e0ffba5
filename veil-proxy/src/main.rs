#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use veil_proxy_lib::{load_from_path, Client};

#[derive(Parser, Debug)]
#[command(author, version, about = "Veil client proxy (domain-fronted circumvention)")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "veil.toml")]
    config: PathBuf,

    /// Override the listen address from the configuration file
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let mut cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    if let Some(listen) = cli.listen {
        cfg.listen = listen;
    }
    info!(listen = %cfg.listen, servers = cfg.servers.len(), "configuration loaded");

    let client = Arc::new(Client::new(
        cfg.listen,
        cfg.read_timeout(),
        cfg.write_timeout(),
    ));
    if let Err(err) = client.configure(cfg.client_config()) {
        error!(%err, "failed to configure upstream servers");
        std::process::exit(1);
    }

    tokio::select! {
        res = Arc::clone(&client).listen_and_serve() => {
            if let Err(err) = res {
                error!(%err, "proxy exited with error");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
