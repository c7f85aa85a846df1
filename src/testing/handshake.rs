//! Protocol version negotiation, run before any other command

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error};

use crate::config::PROTOCOL_VERSION;
use crate::protocol::channel::MessageChannel;
use crate::protocol::message::MessageType;
use crate::testing::error::TestError;

pub async fn negotiate_version<S>(channel: &mut MessageChannel<S>) -> Result<(), TestError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    channel
        .send(MessageType::VersionCheck, PROTOCOL_VERSION)
        .await?;

    let message = channel.receive().await?;
    let version: i32 = message.payload()?;

    if version != PROTOCOL_VERSION {
        error!(
            expected = PROTOCOL_VERSION,
            actual = version,
            "Test host protocol version mismatch"
        );
        return Err(TestError::ProtocolVersionMismatch {
            expected: PROTOCOL_VERSION,
            actual: version,
        });
    }

    debug!(version, "Protocol version negotiated");
    Ok(())
}
