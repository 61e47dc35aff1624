use tcpcomm::cli::ClientArgs;
use tcpcomm::error::AppError;
use tcpcomm::logger::initialize as LoggerInitialize;

use comm_core::client::{ClientExit, connect, run_client};
use comm_core::error::CoreError;

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use log::{debug, error, info};
use tokio::io::{BufReader, stdin};

#[tokio::main]
async fn main() {
    // .env must be loaded before clap reads the environment
    let env_file = dotenvy::dotenv().ok();
    let args = ClientArgs::parse();

    let code = match run(args, env_file).await {
        Ok(exit) => {
            info!("Client stopped ({:?})", exit);
            0
        }
        Err(AppError::Logger { message, location }) => {
            eprintln!("[FATAL] {message} {location}");
            1
        }
        Err(e) => {
            error!("{}", e);
            1
        }
    };

    // Exit without dropping the runtime: the blocking stdin reader would keep it alive.
    exit(code);
}

async fn run(args: ClientArgs, env_file: Option<PathBuf>) -> Result<ClientExit, AppError> {
    LoggerInitialize(args.log_dir.as_deref())?;

    if let Some(path) = env_file {
        debug!("Loaded environment from {}", path.display());
    }

    let config = args.client_config()?;
    let stream = connect(&config).await.map_err(CoreError::from)?;

    let exit = run_client(stream, BufReader::new(stdin()))
        .await
        .map_err(CoreError::from)?;

    Ok(exit)
}
