use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use lightsocks::cipher::Cipher;
use lightsocks::config::{self, Config, PartialConfig};
use lightsocks::error::AppError;
use lightsocks::key::Key;
use lightsocks::relay::local;

/// Local relay: speaks SOCKS5 to a client, forwards an obfuscated
/// stream to a lightsocks server.
#[derive(Parser, Debug)]
#[command(name = "lslocal", version, about)]
struct Cli {
    /// Load config from a JSON file.
    #[arg(short = 'c', long = "config")]
    config_file: Option<PathBuf>,

    /// Load config from a `http://host:port/#key` URL.
    #[arg(short = 'u', long = "url")]
    config_url: Option<String>,

    /// Remote server host.
    #[arg(short = 's', long = "server-addr")]
    server_addr: Option<String>,

    /// Remote server port.
    #[arg(short = 'p', long = "server-port")]
    server_port: Option<u16>,

    /// Local bind address.
    #[arg(short = 'b', long = "local-addr")]
    local_addr: Option<String>,

    /// Local bind port.
    #[arg(short = 'l', long = "local-port")]
    local_port: Option<u16>,

    /// base64url-encoded key.
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Write the resolved config to this path before starting.
    #[arg(long = "save")]
    save: Option<PathBuf>,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn resolve_config(cli: &Cli) -> Result<Config, AppError> {
    let mut resolved = config::local_defaults();

    if let Some(path) = &cli.config_file {
        let file_config = Config::load_from_file(path)?;
        resolved = resolved.merge(&PartialConfig::from(&file_config));
    }

    if let Some(url) = &cli.config_url {
        let url_config = Config::from_url(url)?;
        resolved = resolved.merge(&PartialConfig::from(&url_config));
    }

    let flags = PartialConfig {
        server_addr: cli.server_addr.clone(),
        server_port: cli.server_port,
        local_addr: cli.local_addr.clone(),
        local_port: cli.local_port,
        password: cli.key.clone(),
    };
    resolved = resolved.merge(&flags);

    if resolved.password.is_empty() {
        return Err(AppError::InvalidKey);
    }
    resolved.key()?;
    if resolved.server_addr.is_empty() {
        return Err(AppError::InvalidConfigFile(
            "no server address given (-s, a config file, or a config URL)".into(),
        ));
    }

    Ok(resolved)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &cli.save {
        if let Err(e) = config.save_to_file(path) {
            error!(error = %e, "failed to save config");
            return ExitCode::FAILURE;
        }
    }

    let key = match config.key() {
        Ok(k) => k,
        Err(e) => {
            error!(error = %e, "invalid key");
            return ExitCode::FAILURE;
        }
    };
    let cipher = Arc::new(Cipher::new(&key));

    let server_addr: SocketAddr = match format!("{}:{}", config.server_addr, config.server_port).parse() {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "invalid server address");
            return ExitCode::FAILURE;
        }
    };

    let local_addr = format!("{}:{}", config.local_addr, config.local_port);

    tokio::select! {
        result = local::run(&local_addr, server_addr, cipher, None) => {
            if let Err(e) = result {
                error!(error = %e, "local relay stopped");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    ExitCode::SUCCESS
}
