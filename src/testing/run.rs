//! Run session: `TestExecution.RunSelectedTestCasesDefaultHost` until
//! `TestExecution.Completed`

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::events::{EventEmitter, TestEvent};
use crate::protocol::channel::MessageChannel;
use crate::protocol::error::ChannelError;
use crate::protocol::message::MessageType;
use crate::protocol::payloads::{
    RunSelectedRequest, TestCase, TestMessageLevel, TestResult, TestRunChangedPayload,
    TestRunCompletePayload,
};
use crate::testing::aggregator::aggregate;
use crate::testing::relay_test_message;
use crate::testing::types::RunVerdict;

/// Runs `test_cases` and aggregates the reported results.
///
/// Only a failure to send the run command is an error. Once the run has
/// started, losing the host yields a failed verdict over the results seen so
/// far, plus an error event.
pub async fn run_selected<S>(
    channel: &mut MessageChannel<S>,
    test_cases: &[TestCase],
    emitter: &dyn EventEmitter,
) -> Result<RunVerdict, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    channel
        .send(
            MessageType::TestRunSelectedTestCasesDefaultHost,
            RunSelectedRequest { test_cases },
        )
        .await?;
    info!(selected = test_cases.len(), "Test run started");

    let mut batches: Vec<Vec<TestResult>> = Vec::new();
    match pump_results(channel, emitter, &mut batches).await {
        Ok(()) => {
            let verdict = aggregate(&batches);
            info!(
                results = verdict.results.len(),
                pass = verdict.pass,
                "Test run complete"
            );
            Ok(verdict)
        }
        Err(e) => {
            error!("Test run aborted: {}", e);
            emitter.emit(TestEvent::test_message(
                TestMessageLevel::Error,
                format!("Test run aborted: {}", e),
            ));
            let mut verdict = aggregate(&batches);
            verdict.pass = false;
            Ok(verdict)
        }
    }
}

async fn pump_results<S>(
    channel: &mut MessageChannel<S>,
    emitter: &dyn EventEmitter,
    batches: &mut Vec<Vec<TestResult>>,
) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = channel.receive().await?;

        match message.message_type {
            MessageType::TestMessage => relay_test_message(&message, emitter),
            MessageType::TestRunStatsChange => {
                let changed: TestRunChangedPayload = message.payload()?;
                debug!(count = changed.new_test_results.len(), "Test results received");
                batches.push(changed.new_test_results);
            }
            MessageType::ExecutionComplete => {
                match message.payload::<TestRunCompletePayload>() {
                    Ok(TestRunCompletePayload {
                        summary: Some(summary),
                    }) => {
                        info!(%summary, "Host reported run completion");
                        if let Some(reason) = summary.error_message() {
                            warn!("Host reported run error: {}", reason);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Unreadable completion payload: {}", e),
                }
                return Ok(());
            }
            other => debug!("Ignoring {} during test run", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MockEventEmitter, TestMessageEvent};
    use mockall::predicate::eq;
    use serde_json::{Value, json};
    use tokio::io::{DuplexStream, duplex};

    fn channels() -> (MessageChannel<DuplexStream>, MessageChannel<DuplexStream>) {
        let (a, b) = duplex(64 * 1024);
        (MessageChannel::new(a), MessageChannel::new(b))
    }

    fn result(name: &str, outcome: &str) -> Value {
        json!({
            "TestCase": {"FullyQualifiedName": name, "DisplayName": name},
            "Outcome": outcome,
        })
    }

    fn quiet_emitter() -> MockEventEmitter {
        let mut emitter = MockEventEmitter::new();
        emitter.expect_emit().never();
        emitter
    }

    #[tokio::test]
    async fn aggregates_stats_changes_until_completion() {
        let (mut orchestrator, mut host) = channels();
        let selected = vec![
            TestCase::new("Foo.Bar.Test1", "Foo.Bar.Test1"),
            TestCase::new("Foo.Bar.Test2", "Foo.Bar.Test2"),
        ];

        let host_task = tokio::spawn(async move {
            let request = host.receive().await.unwrap();
            host.send(
                MessageType::TestRunStatsChange,
                json!({"NewTestResults": [result("Foo.Bar.Test1", "Passed")]}),
            )
            .await
            .unwrap();
            host.send(MessageType::TestRunStatsChange, json!({"NewTestResults": null}))
                .await
                .unwrap();
            host.send(
                MessageType::TestRunStatsChange,
                json!({"NewTestResults": [result("Foo.Bar.Test2", "Passed")]}),
            )
            .await
            .unwrap();
            host.send(
                MessageType::ExecutionComplete,
                json!({"TestRunCompleteArgs": {"IsCanceled": false, "ElapsedTimeInRunningTests": "00:00:01"}}),
            )
            .await
            .unwrap();
            request
        });

        let emitter = quiet_emitter();
        let verdict = run_selected(&mut orchestrator, &selected, &emitter)
            .await
            .unwrap();

        assert!(verdict.pass);
        let names: Vec<&str> = verdict.results.iter().map(|r| r.method_name.as_str()).collect();
        assert_eq!(names, vec!["Foo.Bar.Test1", "Foo.Bar.Test2"]);

        let request = host_task.await.unwrap();
        assert_eq!(
            request.message_type,
            MessageType::TestRunSelectedTestCasesDefaultHost
        );
        assert_eq!(
            request.payload,
            json!({"TestCases": [
                {"FullyQualifiedName": "Foo.Bar.Test1", "DisplayName": "Foo.Bar.Test1"},
                {"FullyQualifiedName": "Foo.Bar.Test2", "DisplayName": "Foo.Bar.Test2"},
            ]})
        );
    }

    #[tokio::test]
    async fn relays_test_messages_in_order() {
        let (mut orchestrator, mut host) = channels();
        let selected = vec![TestCase::new("A.One", "A.One")];

        tokio::spawn(async move {
            host.receive().await.unwrap();
            host.send(MessageType::TestMessage, json!({"MessageLevel": 0, "Message": "starting"}))
                .await
                .unwrap();
            host.send(MessageType::TestMessage, json!({"MessageLevel": "Warning", "Message": "slow"}))
                .await
                .unwrap();
            host.send(
                MessageType::TestRunStatsChange,
                json!({"NewTestResults": [result("A.One", "Failed")]}),
            )
            .await
            .unwrap();
            host.send(MessageType::ExecutionComplete, json!({}))
                .await
                .unwrap();
        });

        let mut emitter = MockEventEmitter::new();
        let mut sequence = mockall::Sequence::new();
        emitter
            .expect_emit()
            .with(eq(TestEvent::TestMessage(TestMessageEvent {
                message_level: "informational".to_string(),
                message: "starting".to_string(),
            })))
            .times(1)
            .in_sequence(&mut sequence)
            .return_const(());
        emitter
            .expect_emit()
            .with(eq(TestEvent::TestMessage(TestMessageEvent {
                message_level: "warning".to_string(),
                message: "slow".to_string(),
            })))
            .times(1)
            .in_sequence(&mut sequence)
            .return_const(());

        let verdict = run_selected(&mut orchestrator, &selected, &emitter)
            .await
            .unwrap();

        assert!(!verdict.pass);
        assert_eq!(verdict.results[0].outcome, "failed");
    }

    #[tokio::test]
    async fn disconnect_mid_run_fails_the_verdict() {
        let (mut orchestrator, mut host) = channels();
        let selected = vec![
            TestCase::new("A.One", "A.One"),
            TestCase::new("A.Two", "A.Two"),
        ];

        tokio::spawn(async move {
            host.receive().await.unwrap();
            host.send(
                MessageType::TestRunStatsChange,
                json!({"NewTestResults": [result("A.One", "Passed")]}),
            )
            .await
            .unwrap();
        });

        let mut emitter = MockEventEmitter::new();
        emitter
            .expect_emit()
            .withf(|event| {
                let TestEvent::TestMessage(body) = event;
                body.message_level == "error" && body.message.starts_with("Test run aborted")
            })
            .times(1)
            .return_const(());

        let verdict = run_selected(&mut orchestrator, &selected, &emitter)
            .await
            .unwrap();

        assert!(!verdict.pass);
        assert_eq!(verdict.results.len(), 1);
        assert_eq!(verdict.results[0].outcome, "passed");
    }

    #[tokio::test]
    async fn send_failure_is_an_error() {
        let (mut orchestrator, host) = channels();
        drop(host);

        let emitter = quiet_emitter();
        let result = run_selected(
            &mut orchestrator,
            &[TestCase::new("A.One", "A.One")],
            &emitter,
        )
        .await;

        assert!(matches!(result, Err(ChannelError::Write(_))));
    }

    #[tokio::test]
    async fn unknown_messages_do_not_end_the_run() {
        let (mut orchestrator, mut host) = channels();

        tokio::spawn(async move {
            host.receive().await.unwrap();
            host.send(MessageType::Unknown("TestExecution.Heartbeat".to_string()), Value::Null)
                .await
                .unwrap();
            host.send(MessageType::DiscoveryComplete, Value::Null)
                .await
                .unwrap();
            host.send(
                MessageType::TestRunStatsChange,
                json!({"NewTestResults": [result("A.One", "Passed")]}),
            )
            .await
            .unwrap();
            host.send(MessageType::ExecutionComplete, Value::Null)
                .await
                .unwrap();
        });

        let emitter = quiet_emitter();
        let verdict = run_selected(
            &mut orchestrator,
            &[TestCase::new("A.One", "A.One")],
            &emitter,
        )
        .await
        .unwrap();

        assert!(verdict.pass);
        assert_eq!(verdict.results.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_diagnostics_do_not_end_the_run() {
        let (mut orchestrator, mut host) = channels();
        let selected = vec![
            TestCase::new("A.One", "A.One"),
            TestCase::new("A.Two", "A.Two"),
        ];

        tokio::spawn(async move {
            host.receive().await.unwrap();
            host.send(MessageType::TestMessage, json!({"MessageLevel": 0, "Message": null}))
                .await
                .unwrap();
            host.send(MessageType::TestMessage, json!({"MessageLevel": 9, "Message": "?"}))
                .await
                .unwrap();
            host.send(
                MessageType::TestRunStatsChange,
                json!({"NewTestResults": [result("A.One", "Passed"), result("A.Two", "Passed")]}),
            )
            .await
            .unwrap();
            host.send(MessageType::ExecutionComplete, json!({}))
                .await
                .unwrap();
        });

        let mut emitter = MockEventEmitter::new();
        emitter
            .expect_emit()
            .with(eq(TestEvent::TestMessage(TestMessageEvent {
                message_level: "informational".to_string(),
                message: String::new(),
            })))
            .times(1)
            .return_const(());

        let verdict = run_selected(&mut orchestrator, &selected, &emitter)
            .await
            .unwrap();

        assert!(verdict.pass);
        assert_eq!(verdict.results.len(), 2);
    }
}
