#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::uninlined_format_args
)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use travelbuddy::{Config, doctor, gateway};

/// `TravelBuddy` - travel facts, chat and itineraries behind Google sign-in.
#[derive(Parser, Debug)]
#[command(name = "travelbuddy")]
#[command(author = "TravelBuddy contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Travel companion web app powered by Gemini.", long_about = None)]
struct Cli {
    /// Config file (default: ~/.travelbuddy/config.toml, or TRAVELBUDDY_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web app
    Serve {
        /// Port to listen on (default: 5000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default: 127.0.0.1)
        #[arg(long)]
        host: Option<String>,
    },

    /// Check configuration, credentials and the PDF converter
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real environment variables win.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match dotenv {
        Ok(path) => tracing::debug!("loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("ignoring unreadable .env file: {e}"),
    }

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(host) = host {
                config.gateway.host = host;
            }
            let host = config.gateway.host.clone();
            let port = config.gateway.port;
            gateway::run_gateway(&host, port, config).await
        }
        Commands::Doctor => doctor::run(&config),
    }
}
