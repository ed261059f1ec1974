use std::process::ExitCode;

use artmind::config::{AppConfig, setup_logging};
use artmind::constants::ARTIFACTS_ROUTE;
use clap::Parser;
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = artmind::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return ExitCode::FAILURE;
    }

    let default_public_base = format!(
        "http://{}:{}{}",
        cli.listen_address, cli.port, ARTIFACTS_ROUTE
    );
    let config = match AppConfig::from_options(&cli.providers, &default_public_base) {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let services = match config.build().await {
        Ok(services) => services,
        Err(err) => {
            error!("Startup error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = artmind::web::setup_server(&cli.listen_address, cli.port, services).await {
        error!("Application error: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
