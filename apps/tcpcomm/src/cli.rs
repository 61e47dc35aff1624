//! Command-line flags for both binaries.
//!
//! Every flag can also come from the environment (a `.env` file is loaded
//! first by the binaries). Server flags override values from `--config`.

use comm_core::config::{ClientConfig, ServerConfig};
use comm_core::error::config::ConfigError;

use common::{DEFAULT_HOST, DEFAULT_PORT};

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "tcpcomm-server",
    version,
    about = "Accepts TCP clients, records their messages and stops them all on shutdown"
)]
pub struct ServerArgs {
    /// Host to listen on (default: localhost)
    #[arg(long, env = "TCPCOMM_HOST")]
    pub host: Option<String>,

    /// Port to listen on (default: 3333, 0 picks a free port)
    #[arg(short, long, env = "TCPCOMM_PORT")]
    pub port: Option<u16>,

    /// TOML file with server settings
    #[arg(short, long, env = "TCPCOMM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for tcpcomm.log (stderr only when omitted)
    #[arg(long, env = "TCPCOMM_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl ServerArgs {
    /// Resolve the effective server config: file (or defaults), then flags.
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "tcpcomm-client",
    version,
    about = "Sends `SEND:message` lines from stdin to a tcpcomm server; `STOP:` quits"
)]
pub struct ClientArgs {
    /// Server host to connect to
    #[arg(long, env = "TCPCOMM_SERVER_HOST", default_value = DEFAULT_HOST)]
    pub server_host: String,

    /// Server port to connect to
    #[arg(long, env = "TCPCOMM_SERVER_PORT", default_value_t = DEFAULT_PORT)]
    pub server_port: u16,

    /// Directory for tcpcomm.log (stderr only when omitted)
    #[arg(long, env = "TCPCOMM_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl ClientArgs {
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let config = ClientConfig {
            host: self.server_host.clone(),
            port: self.server_port,
        };
        config.validate()?;
        Ok(config)
    }
}
