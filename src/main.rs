//! Herald CLI
//!
//! - `herald start [PORT]` runs the broadcast server
//! - `herald connect [PORT]` opens an interactive client
//! - `herald config` prints a default configuration file

use clap::{Parser, Subcommand};
use herald::config::{generate_default_config, Config, LoggingConfig};
use herald::server::{shutdown_signal, Server};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "herald")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time WebSocket broadcast hub")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the broadcast server
    Start {
        /// Port to listen on (overrides the config file)
        port: Option<u16>,
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,
    },

    /// Connect to a server and chat from the terminal
    Connect {
        /// Server port (default: the configured port)
        port: Option<u16>,
        /// Server host
        #[arg(long, default_value = "localhost")]
        host: String,
    },

    /// Print a default configuration file
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    match cli.command {
        Commands::Start { port, host } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            init_tracing(&config.logging);

            tracing::info!("Starting Herald v{}", env!("CARGO_PKG_VERSION"));
            let server = Server::start(&config).await?;

            shutdown_signal().await;

            let report = server.shutdown().await;
            tracing::info!(
                closed_connections = report.closed_connections,
                drained = report.drained,
                "Herald stopped"
            );
        }

        Commands::Connect { port, host } => {
            init_tracing(&config.logging);

            let port = port.unwrap_or(config.server.port);
            let url = format!("ws://{}:{}{}", host, port, config.server.route);
            let code = match herald::client::run_interactive(&url).await {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            };
            // The blocking stdin reader would keep the runtime alive
            std::process::exit(code);
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    println!("Wrote default config to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("herald={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_port_is_optional() {
        let cli = Cli::try_parse_from(["herald", "connect"]).unwrap();
        match cli.command {
            Commands::Connect { port, host } => {
                assert_eq!(port, None);
                assert_eq!(host, "localhost");
            }
            _ => panic!("expected connect"),
        }
        assert_eq!(Config::default().server.port, 1234);
    }

    #[test]
    fn test_connect_port_argument() {
        let cli = Cli::try_parse_from(["herald", "connect", "4000", "--host", "10.0.0.5"]).unwrap();
        match cli.command {
            Commands::Connect { port, host } => {
                assert_eq!(port, Some(4000));
                assert_eq!(host, "10.0.0.5");
            }
            _ => panic!("expected connect"),
        }
    }

    #[test]
    fn test_start_port_is_optional() {
        let cli = Cli::try_parse_from(["herald", "start"]).unwrap();
        assert!(matches!(cli.command, Commands::Start { port: None, .. }));
    }
}
