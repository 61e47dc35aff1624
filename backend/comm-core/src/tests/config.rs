// Unit tests for server/client configuration

use crate::config::{ClientConfig, ServerConfig};
use crate::error::config::ConfigError;

use common::{DEFAULT_HOST, DEFAULT_PORT, READ_BUFFER_SIZE};

use std::fs::write;
use std::time::Duration;

use tempfile::TempDir;

#[test]
fn given_defaults_when_created_then_match_wire_defaults() {
    let config = ServerConfig::default();

    assert_eq!(config.host, DEFAULT_HOST);
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.read_buffer_size, READ_BUFFER_SIZE);
    assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
    assert!(config.validate().is_ok());
    assert_eq!(config.address(), "localhost:3333");
}

/// **VALUE**: A missing config file is not fatal.
///
/// **BUG THIS CATCHES**: Would catch `load()` erroring on first run, before anyone
/// has written a config file.
#[test]
fn given_missing_file_when_loaded_then_returns_defaults() {
    // GIVEN: An empty directory
    let dir = TempDir::new().unwrap();

    // WHEN: Loading a file that does not exist
    let config = ServerConfig::load(&dir.path().join("tcpcomm.toml"));

    // THEN: Defaults are returned
    assert_eq!(config.unwrap(), ServerConfig::default());
}

#[test]
fn given_partial_toml_when_loaded_then_missing_keys_use_defaults() {
    // GIVEN: A file that only sets the port and grace period
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tcpcomm.toml");
    write(&path, "port = 4000\nshutdown_grace_ms = 250\n").unwrap();

    // WHEN: Loading it
    let config = ServerConfig::load(&path).unwrap();

    // THEN: Set keys win, the rest fall back
    assert_eq!(config.port, 4000);
    assert_eq!(config.shutdown_grace(), Duration::from_millis(250));
    assert_eq!(config.host, DEFAULT_HOST);
    assert_eq!(config.read_buffer_size, READ_BUFFER_SIZE);
}

#[test]
fn given_malformed_toml_when_loaded_then_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tcpcomm.toml");
    write(&path, "port = \"not a number\"\n").unwrap();

    let result = ServerConfig::load(&path);

    assert!(
        matches!(result, Err(ConfigError::ParseError { .. })),
        "Expected parse error, got {result:?}"
    );
}

#[test]
fn given_out_of_range_values_when_loaded_then_validation_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tcpcomm.toml");
    write(&path, "read_buffer_size = 0\n").unwrap();

    let result = ServerConfig::load(&path);

    assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
}

#[test]
fn given_invalid_server_values_when_validated_then_each_is_rejected() {
    let cases = [
        ServerConfig {
            host: String::from("  "),
            ..Default::default()
        },
        ServerConfig {
            read_buffer_size: 1024 * 1024,
            ..Default::default()
        },
        ServerConfig {
            shutdown_grace_ms: 0,
            ..Default::default()
        },
        ServerConfig {
            accept_retry_max_elapsed_ms: 0,
            ..Default::default()
        },
    ];

    for config in cases {
        assert!(
            matches!(config.validate(), Err(ConfigError::ValidationError { .. })),
            "Should reject {config:?}"
        );
    }
}

#[test]
fn given_client_port_zero_when_validated_then_rejected() {
    let config = ClientConfig {
        port: 0,
        ..Default::default()
    };

    assert!(config.validate().is_err());
    assert!(ClientConfig::default().validate().is_ok());
}
