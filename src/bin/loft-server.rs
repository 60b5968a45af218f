use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use loft::{FsBucketStore, LoftServer, config::ServerConfig, config::TlsConfig};

#[derive(Parser)]
#[command(author, version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Address to listen on
    #[arg(short, long)]
    addr: Option<String>,
    /// Directory holding the buckets
    #[arg(short, long)]
    bucket_path: Option<PathBuf>,
    /// PEM certificate; enables tls together with --tls-key
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    /// PEM private key
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,
    /// Per-read timeout on client connections, in seconds
    #[arg(long)]
    read_timeout: Option<u64>,
    /// Log every request
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Start from the config file, if any, and let flags override it.
    fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("Error reading config file {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(addr) = self.addr {
            config.listen_addr = addr;
        }
        if let Some(path) = self.bucket_path {
            config.bucket_path = path;
        }
        if let (Some(cert_path), Some(key_path)) = (self.tls_cert, self.tls_key) {
            config.tls = Some(TlsConfig {
                cert_path,
                key_path,
            });
        }
        if self.read_timeout.is_some() {
            config.read_timeout_secs = self.read_timeout;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    info!("CARGO_PKG_VERSION: {}", env!("CARGO_PKG_VERSION"));
    let config = args.into_config()?;
    info!(
        "Starting server on {}, storing buckets in {}",
        config.listen_addr,
        config.bucket_path.display()
    );

    let store = FsBucketStore::open(&config.bucket_path)?;
    let server = LoftServer::bind(&config, store)
        .with_context(|| format!("failed to start listener on {}", config.listen_addr))?;
    server.run()?;
    Ok(())
}
