//! Dockhand CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;
mod suite;

use commands::Commands;
use config::DockhandConfig;

#[derive(Parser)]
#[command(name = "dockhand")]
#[command(author, version, about = "Ephemeral container dependencies for integration tests", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./dockhand.{yaml,toml,json} if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs and the run report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dockhand=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = DockhandConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { command } => handlers::run(&config, command, cli.json).await,
        Commands::Descriptor { show_secret } => {
            handlers::descriptor(&config, show_secret)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ping => {
            handlers::ping().await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
