use thiserror::Error;

use crate::protocol::message::MessageType;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to read from test host: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write to test host: {0}")]
    Write(#[source] std::io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Connection to test host closed")]
    ConnectionClosed,

    #[error("Invalid payload for {message_type}: {source}")]
    InvalidPayload {
        message_type: MessageType,
        #[source]
        source: serde_json::Error,
    },
}

/// I/O failures surfaced by the frame decoder are read failures; the channel
/// reclassifies them on the send path
impl From<std::io::Error> for ChannelError {
    fn from(e: std::io::Error) -> Self {
        Self::Read(e)
    }
}
