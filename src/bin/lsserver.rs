use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use lightsocks::cipher::Cipher;
use lightsocks::config::{self, Config, PartialConfig};
use lightsocks::error::AppError;
use lightsocks::relay::server;

/// Server relay: terminates an obfuscated lightsocks tunnel, runs the
/// SOCKS5 CONNECT state machine against the real destination.
#[derive(Parser, Debug)]
#[command(name = "lsserver", version, about)]
struct Cli {
    /// Load config from a JSON file.
    #[arg(short = 'c', long = "config")]
    config_file: Option<PathBuf>,

    /// Bind address.
    #[arg(short = 's', long = "server-addr")]
    server_addr: Option<String>,

    /// Bind port.
    #[arg(short = 'p', long = "server-port")]
    server_port: Option<u16>,

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
    let mut resolved = config::server_defaults();

    if let Some(path) = &cli.config_file {
        let file_config = Config::load_from_file(path)?;
        resolved = resolved.merge(&PartialConfig::from(&file_config));
    }

    let flags = PartialConfig {
        server_addr: cli.server_addr.clone(),
        server_port: cli.server_port,
        local_addr: None,
        local_port: None,
        password: cli.key.clone(),
    };
    resolved = resolved.merge(&flags);

    if resolved.password.is_empty() {
        return Err(AppError::InvalidKey);
    }
    resolved.key()?;

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

    let bind_addr = format!("{}:{}", config.server_addr, config.server_port);

    tokio::select! {
        result = server::run(&bind_addr, cipher, None) => {
            if let Err(e) = result {
                error!(error = %e, "server relay stopped");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    ExitCode::SUCCESS
}
