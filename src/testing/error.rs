use thiserror::Error;

use crate::host::error::LaunchError;
use crate::protocol::error::ChannelError;

#[derive(Debug, Error)]
pub enum TestError {
    #[error("Unknown test framework: {0}")]
    UnknownTestFramework(String),

    #[error("Expected protocol version {expected}, but was {actual}")]
    ProtocolVersionMismatch { expected: i32, actual: i32 },

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Operation cancelled")]
    Cancelled,
}
