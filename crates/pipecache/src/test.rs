//! Helpers shared by the crate's tests.
//!
//! Call [`setup`] at the top of every test so console output is captured
//! by the test runner. Hold the handle returned by [`tempdir`] for the
//! whole test; dropping it deletes the directory.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// Sets up the test environment.
///
/// Initializes a logger capturing this crate's traces; all other logs
/// are muted.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("pipecache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory, deleted when the guard drops.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}
