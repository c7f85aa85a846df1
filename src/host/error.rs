use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Build did not produce {}", .0.display())]
    BuildFailed(PathBuf),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to allocate a local port: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Failed to accept the test host connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("Test host exited before connecting: {0}")]
    HostExited(String),

    #[error("Test host did not connect within {0:?}")]
    ConnectTimeout(Duration),
}
