use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loft::config::{ClientConfig, ClientTlsConfig};
use loft::{BucketId, LoftClient};

#[derive(Parser, Debug)]
#[command(author, version)]
struct Cli {
    #[command(flatten)]
    opts: CommandOpts,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct CommandOpts {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Server address
    #[arg(short, long, global = true)]
    addr: Option<String>,
    /// Trusted PEM certificate; enables tls
    #[arg(long, global = true)]
    tls_ca: Option<PathBuf>,
    /// Name to verify in the server certificate
    #[arg(long, global = true)]
    server_name: Option<String>,
    /// Log protocol traffic
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reserve a bucket and print its identifier
    Create { size: i64 },
    /// Upload a local file into a bucket
    Upload { id: BucketId, file: PathBuf },
    /// Download a bucket into a local file
    Download { id: BucketId, file: PathBuf },
}

impl CommandOpts {
    fn into_config(self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("Error reading config file {}", path.display()))?,
            None => ClientConfig::default(),
        };
        if let Some(addr) = self.addr {
            config.server_addr = addr;
        }
        if let Some(ca_path) = self.tls_ca {
            config.tls = Some(ClientTlsConfig {
                ca_path,
                server_name: None,
            });
        }
        if let (Some(tls), Some(name)) = (config.tls.as_mut(), self.server_name) {
            tls.server_name = Some(name);
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.opts.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = cli.opts.into_config()?;
    let mut client = LoftClient::connect(&config)
        .with_context(|| format!("cannot connect to {}", config.server_addr))?;

    match cli.command {
        Commands::Create { size } => {
            let id = client.create(size)?;
            println!("{id}");
        }
        Commands::Upload { id, file } => {
            let sent = client
                .upload(&id, &file)
                .with_context(|| format!("upload of {} failed", file.display()))?;
            eprintln!("uploaded {sent} bytes to {id}");
        }
        Commands::Download { id, file } => {
            let received = client
                .download(&id, &file)
                .with_context(|| format!("download into {} failed", file.display()))?;
            eprintln!("downloaded {received} bytes from {id}");
        }
    }
    client.close()?;
    Ok(())
}
