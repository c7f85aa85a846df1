//! Discovery session: `TestDiscovery.Start` until `TestDiscovery.Completed`

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::channel::{MessageChannel, Received};
use crate::protocol::error::ChannelError;
use crate::protocol::message::MessageType;
use crate::protocol::payloads::{DiscoveryRequest, TestCase};

/// Discovers tests in `sources` whose display name starts with `method_name`.
///
/// Matches keep discovery order, duplicates included. Cancellation or a
/// closed stream before completion yields an empty list rather than an error.
pub async fn discover_tests<S>(
    channel: &mut MessageChannel<S>,
    sources: &[String],
    method_name: &str,
    cancel: &CancellationToken,
) -> Result<Vec<TestCase>, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    channel
        .send(MessageType::StartDiscovery, DiscoveryRequest { sources })
        .await?;

    let mut test_cases = Vec::new();

    loop {
        let message = match channel.try_receive(cancel).await? {
            Received::Message(message) => message,
            Received::Cancelled => {
                info!("Discovery cancelled, reporting no tests");
                return Ok(Vec::new());
            }
            Received::Closed => {
                warn!("Test host closed the connection during discovery");
                return Ok(Vec::new());
            }
        };

        match message.message_type {
            MessageType::TestCasesFound => {
                let found: Vec<TestCase> = message.payload()?;
                debug!(found = found.len(), "Test cases found");
                test_cases.extend(
                    found
                        .into_iter()
                        .filter(|test_case| test_case.display_name.starts_with(method_name)),
                );
            }
            MessageType::DiscoveryComplete => break,
            MessageType::TestMessage => {}
            other => debug!("Ignoring {} during discovery", other),
        }
    }

    info!(
        matched = test_cases.len(),
        filter = method_name,
        "Discovery complete"
    );
    Ok(test_cases)
}
