use tcpcomm::cli::ServerArgs;
use tcpcomm::error::AppError;
use tcpcomm::logger::initialize as LoggerInitialize;

use comm_core::error::CoreError;
use comm_core::server::{start_server, trigger_on_signal};

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // .env must be loaded before clap reads the environment
    let env_file = dotenvy::dotenv().ok();
    let args = ServerArgs::parse();

    match run(args, env_file).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::Logger { message, location }) => {
            eprintln!("[FATAL] {message} {location}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Failed to run TCP server: `{}`", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: ServerArgs, env_file: Option<PathBuf>) -> Result<(), AppError> {
    LoggerInitialize(args.log_dir.as_deref())?;

    if let Some(path) = env_file {
        debug!("Loaded environment from {}", path.display());
    }

    let config = args.server_config()?;
    let handle = start_server(&config).await.map_err(CoreError::from)?;

    trigger_on_signal(handle.trigger());

    info!(
        "Server successfully started and accepting connections on {}",
        handle.local_addr()
    );

    let report = handle.wait().await.map_err(CoreError::from)?;
    info!(
        "Server stopped: {} clients disconnected, {} failed",
        report.disconnected, report.failed
    );

    Ok(())
}
