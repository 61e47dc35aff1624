// Unit tests for logger module initialization logic
// Tests focus on thread-safety and error handling

use crate::error::AppError;
use crate::logger::{LOG_FILE_NAME, build_dispatch, initialize};

use std::path::PathBuf;

use serial_test::serial;
use tempfile::TempDir;

/// **VALUE**: Verifies that calling initialize() multiple times doesn't panic or fail.
///
/// **WHY THIS MATTERS**: Both binaries and the tests initialize logging. If a second
/// call panics (fern refuses to set a global logger twice) the process dies at startup.
///
/// **BUG THIS CATCHES**: Would catch if the Once or AtomicBool guards are removed.
#[test]
#[serial]
fn given_logger_initialized_when_called_again_then_returns_ok() {
    // GIVEN: A valid temporary directory
    let temp_dir = TempDir::new().unwrap();

    // WHEN: Calling initialize twice
    let result1 = initialize(Some(temp_dir.path()));
    let result2 = initialize(Some(temp_dir.path()));

    // THEN: Both should return Ok (second one logs warning but doesn't error)
    assert!(result1.is_ok(), "First initialization should succeed");
    assert!(
        result2.is_ok(),
        "Second initialization should succeed (idempotent)"
    );
}

/// **VALUE**: Verifies that an unwritable log directory is reported, not panicked on.
///
/// **BUG THIS CATCHES**: Would catch `fern::log_file()` being unwrapped, which turns a
/// bad `--log-dir` into a crash instead of a clear startup error.
#[test]
#[serial]
fn given_invalid_log_dir_when_building_dispatch_then_returns_logger_error() {
    // GIVEN: A path that cannot hold a file
    let invalid_dir = PathBuf::from("/dev/null/invalid-path");

    // WHEN: Building the dispatch
    let result = build_dispatch(Some(&invalid_dir));

    // THEN: Logger error naming the file
    match result {
        Err(AppError::Logger { message, .. }) => assert!(message.contains(LOG_FILE_NAME)),
        Err(other) => panic!("Expected Logger error, got {other:?}"),
        Ok(_) => panic!("Expected Logger error, got a dispatch"),
    }
}

#[test]
#[serial]
fn given_log_dir_when_building_dispatch_then_creates_log_file() {
    let temp_dir = TempDir::new().unwrap();

    let result = build_dispatch(Some(temp_dir.path()));

    assert!(result.is_ok());
    assert!(temp_dir.path().join(LOG_FILE_NAME).exists());
}

#[test]
#[serial]
fn given_no_log_dir_when_building_dispatch_then_succeeds() {
    assert!(build_dispatch(None).is_ok());
}
