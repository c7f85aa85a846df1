//! Debug-launch sessions: start-info requests and the custom host launch
//! callback

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::EventEmitter;
use crate::protocol::channel::{MessageChannel, Received};
use crate::protocol::error::ChannelError;
use crate::protocol::message::MessageType;
use crate::protocol::payloads::{
    LaunchCallback, StartInfoRequest, TestCase, TestProcessStartInfo,
};
use crate::testing::error::TestError;
use crate::testing::relay_test_message;

/// Asks the host how it would launch `test_cases` under a debugger.
///
/// Diagnostic messages are relayed while waiting; the first other message is
/// taken as the reply.
pub async fn request_start_info<S>(
    channel: &mut MessageChannel<S>,
    test_cases: &[TestCase],
    emitter: &dyn EventEmitter,
    cancel: &CancellationToken,
) -> Result<TestProcessStartInfo, TestError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    channel
        .send(
            MessageType::GetTestRunnerProcessStartInfoForRunSelected,
            StartInfoRequest {
                test_cases,
                debugging_enabled: true,
            },
        )
        .await?;

    loop {
        let message = match channel.try_receive(cancel).await? {
            Received::Message(message) => message,
            Received::Cancelled => return Err(TestError::Cancelled),
            Received::Closed => return Err(ChannelError::ConnectionClosed.into()),
        };

        if message.message_type == MessageType::TestMessage {
            relay_test_message(&message, emitter);
            continue;
        }

        debug!(message_type = %message.message_type, "Start info reply received");
        let start_info: TestProcessStartInfo = message.payload()?;
        info!(
            executable = %start_info.file_name,
            working_directory = %start_info.working_directory,
            "Test runner start info received"
        );
        return Ok(start_info);
    }
}

/// Tells the host a debugger attached to `host_process_id` and relays
/// diagnostics until the run completes.
///
/// Only a failed send is an error; cancellation or losing the host ends the
/// wait quietly.
pub async fn debug_launch<S>(
    channel: &mut MessageChannel<S>,
    host_process_id: u32,
    emitter: &dyn EventEmitter,
    cancel: &CancellationToken,
) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    channel
        .send(
            MessageType::CustomTestHostLaunchCallback,
            LaunchCallback { host_process_id },
        )
        .await?;
    info!(host_process_id, "Debug launch acknowledged");

    loop {
        let message = match channel.try_receive(cancel).await {
            Ok(Received::Message(message)) => message,
            Ok(Received::Cancelled) => {
                info!("Debug launch cancelled");
                return Ok(());
            }
            Ok(Received::Closed) => {
                warn!("Test host closed the connection during debug launch");
                return Ok(());
            }
            Err(e) => {
                warn!("Debug launch stopped: {}", e);
                return Ok(());
            }
        };

        match message.message_type {
            MessageType::TestMessage => relay_test_message(&message, emitter),
            MessageType::ExecutionComplete => {
                info!("Debugged test run complete");
                return Ok(());
            }
            other => debug!("Ignoring {} during debug launch", other),
        }
    }
}
