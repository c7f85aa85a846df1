//! Framed message channel over the host's control connection

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::codec::FrameCodec;
use crate::protocol::error::ChannelError;
use crate::protocol::message::{Message, MessageType};

/// Result of a cancellable receive.
///
/// Cancellation and a clean end of stream are ordinary outcomes here; only
/// I/O failures and malformed frames surface as [`ChannelError`].
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Message(Message),
    Cancelled,
    Closed,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OutgoingMessage<'a, T: Serialize> {
    message_type: &'a MessageType,
    payload: &'a T,
}

/// Bidirectional message transport to a test host.
///
/// Partial frames stay in the [`Framed`] read buffer, so dropping a pending
/// receive (e.g. on cancellation) never loses bytes.
pub struct MessageChannel<S> {
    framed: Framed<S, FrameCodec>,
}

impl<S> MessageChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }

    /// Serializes and writes one message
    pub async fn send<T: Serialize>(
        &mut self,
        message_type: MessageType,
        payload: T,
    ) -> Result<(), ChannelError> {
        let body = serde_json::to_vec(&OutgoingMessage {
            message_type: &message_type,
            payload: &payload,
        })
        .map_err(|source| ChannelError::InvalidPayload {
            message_type: message_type.clone(),
            source,
        })?;
        let len = body.len();

        self.framed
            .send(Bytes::from(body))
            .await
            .map_err(write_error)?;

        debug!(message_type = %message_type, bytes = len, "Sent message");
        Ok(())
    }

    /// Waits for the next message; end of stream is an error here
    pub async fn receive(&mut self) -> Result<Message, ChannelError> {
        self.read_message()
            .await?
            .ok_or(ChannelError::ConnectionClosed)
    }

    /// Waits for the next message unless `cancel` fires first
    pub async fn try_receive(&mut self, cancel: &CancellationToken) -> Result<Received, ChannelError> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => Ok(Received::Cancelled),
            message = self.read_message() => Ok(match message? {
                Some(message) => Received::Message(message),
                None => Received::Closed,
            }),
        }
    }

    /// Flushes and shuts down the write half; the peer observes end of stream
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        SinkExt::<Bytes>::close(&mut self.framed)
            .await
            .map_err(write_error)
    }

    async fn read_message(&mut self) -> Result<Option<Message>, ChannelError> {
        let Some(frame) = self.framed.next().await else {
            return Ok(None);
        };
        let frame = frame.inspect_err(|e| warn!("Failed to read from test host: {}", e))?;

        let message: Message = serde_json::from_slice(&frame)
            .map_err(|e| ChannelError::MalformedFrame(e.to_string()))?;
        debug!(message_type = %message.message_type, bytes = frame.len(), "Received message");
        Ok(Some(message))
    }
}

/// Socket errors on the sink side are write failures
fn write_error(e: ChannelError) -> ChannelError {
    match e {
        ChannelError::Read(source) => ChannelError::Write(source),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec;
    use bytes::BytesMut;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, duplex};

    fn pair() -> (
        MessageChannel<tokio::io::DuplexStream>,
        MessageChannel<tokio::io::DuplexStream>,
    ) {
        let (a, b) = duplex(64 * 1024);
        (MessageChannel::new(a), MessageChannel::new(b))
    }

    #[tokio::test]
    async fn send_and_receive_preserve_order() {
        let (mut orchestrator, mut host) = pair();

        orchestrator
            .send(MessageType::VersionCheck, 1)
            .await
            .unwrap();
        orchestrator
            .send(MessageType::StartDiscovery, json!({"Sources": ["a.dll"]}))
            .await
            .unwrap();

        let first = host.receive().await.unwrap();
        let second = host.receive().await.unwrap();

        assert_eq!(first, Message::new(MessageType::VersionCheck, json!(1)));
        assert_eq!(second.message_type, MessageType::StartDiscovery);
        assert_eq!(second.payload["Sources"][0], "a.dll");
    }

    #[tokio::test]
    async fn receive_reports_closed_connection() {
        let (mut orchestrator, host) = pair();
        drop(host);

        let result = orchestrator.receive().await;

        assert!(matches!(result, Err(ChannelError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn try_receive_reports_end_of_stream_as_closed() {
        let (mut orchestrator, host) = pair();
        drop(host);

        let received = orchestrator
            .try_receive(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(received, Received::Closed);
    }

    #[tokio::test]
    async fn try_receive_returns_cancelled_without_error() {
        let (mut orchestrator, _host) = pair();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let received = orchestrator.try_receive(&cancel).await.unwrap();

        assert_eq!(received, Received::Cancelled);
    }

    #[tokio::test]
    async fn cancelled_receive_keeps_partial_frame() {
        let (orchestrator_end, mut host_end) = duplex(1024);
        let mut orchestrator = MessageChannel::new(orchestrator_end);

        let mut frame = BytesMut::new();
        codec::encode_frame(br#"{"MessageType":"TestDiscovery.Completed"}"#, &mut frame).unwrap();
        let (head, tail) = frame.split_at(10);

        host_end.write_all(head).await.unwrap();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        assert_eq!(
            orchestrator.try_receive(&cancel).await.unwrap(),
            Received::Cancelled
        );

        host_end.write_all(tail).await.unwrap();
        let message = orchestrator.receive().await.unwrap();

        assert_eq!(message.message_type, MessageType::DiscoveryComplete);
    }

    #[tokio::test]
    async fn truncated_frame_is_malformed() {
        let (orchestrator_end, mut host_end) = duplex(1024);
        let mut orchestrator = MessageChannel::new(orchestrator_end);

        // Announces 32 bytes, delivers 3
        host_end.write_all(&[0x20, b'{', b'"', b'M']).await.unwrap();
        drop(host_end);

        let result = orchestrator.try_receive(&CancellationToken::new()).await;

        assert!(matches!(result, Err(ChannelError::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn non_json_frame_is_malformed() {
        let (orchestrator_end, mut host_end) = duplex(1024);
        let mut orchestrator = MessageChannel::new(orchestrator_end);

        let mut frame = BytesMut::new();
        codec::encode_frame(b"not json", &mut frame).unwrap();
        host_end.write_all(&frame).await.unwrap();

        let result = orchestrator.receive().await;

        assert!(matches!(result, Err(ChannelError::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn send_fails_after_peer_is_gone() {
        let (mut orchestrator, host) = pair();
        drop(host);

        let result = orchestrator.send(MessageType::VersionCheck, 1).await;

        assert!(matches!(result, Err(ChannelError::Write(_))));
    }

    #[tokio::test]
    async fn close_signals_end_of_stream_to_peer() {
        let (mut orchestrator, mut host) = pair();

        orchestrator.close().await.unwrap();

        assert!(matches!(
            host.receive().await,
            Err(ChannelError::ConnectionClosed)
        ));
    }
}
