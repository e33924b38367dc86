//! `stackdemo` binary: loads config, binds the listener, and serves until
//! SIGINT or SIGTERM.

use std::process::ExitCode;

use clap::Parser;
use stackdemo_server::cli::Cli;
use stackdemo_server::config::AppConfig;
use stackdemo_server::network::{run_until_signal, shutdown_signal, NetworkModule};
use stackdemo_server::{logging, Application};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.log_format) {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = format!("{e:#}"), "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(&cli.config_path())?;

    let app = if cli.in_memory {
        info!("Using in-memory stores");
        Application::in_memory(&config)?
    } else {
        Application::connect(&config).await?
    };

    let mut module = NetworkModule::new(config.network(), app.services());
    let port = match module.start().await {
        Ok(port) => port,
        Err(e) => {
            app.shutdown().await;
            return Err(e);
        }
    };
    info!("Listening to port {port}");

    let served = run_until_signal(module, shutdown_signal()).await;
    app.shutdown().await;
    served
}
