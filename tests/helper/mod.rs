//! Shared fixtures: a scripted in-memory test host and a recording emitter
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::io::{DuplexStream, duplex};

use testhost_bridge::events::{EventEmitter, TestEvent, TestMessageEvent};
use testhost_bridge::host::ProjectInfo;
use testhost_bridge::protocol::{ChannelError, Message, MessageChannel, MessageType};
use testhost_bridge::testing::TestManager;

pub const OUTPUT_PATH: &str = "/src/Foo/bin/Debug/net8.0/Foo.Tests.dll";

pub fn project() -> ProjectInfo {
    ProjectInfo::new("/src/Foo", OUTPUT_PATH)
}

/// Host end of an in-memory control connection
pub struct FakeHost {
    channel: MessageChannel<DuplexStream>,
}

impl FakeHost {
    pub async fn next(&mut self) -> Result<Message, ChannelError> {
        self.channel.receive().await
    }

    /// Receives the next message and checks its tag
    pub async fn expect(&mut self, message_type: MessageType) -> Message {
        let message = self.channel.receive().await.unwrap();
        assert_eq!(message.message_type, message_type);
        message
    }

    pub async fn send(&mut self, message_type: MessageType, payload: Value) {
        self.channel.send(message_type, payload).await.unwrap();
    }

    pub async fn answer_version(&mut self, version: i32) {
        self.expect(MessageType::VersionCheck).await;
        self.send(MessageType::VersionCheck, json!(version)).await;
    }

    /// Answers a discovery request with one batch of `names`
    pub async fn discover(&mut self, names: &[&str]) -> Message {
        let request = self.expect(MessageType::StartDiscovery).await;
        let cases: Vec<Value> = names.iter().map(|name| test_case(name)).collect();
        self.send(MessageType::TestCasesFound, Value::Array(cases))
            .await;
        self.send(MessageType::DiscoveryComplete, json!({"TotalTests": names.len()}))
            .await;
        request
    }

    pub async fn log(&mut self, level: i64, message: &str) {
        self.send(
            MessageType::TestMessage,
            json!({"MessageLevel": level, "Message": message}),
        )
        .await;
    }

    pub async fn report(&mut self, results: Vec<Value>) {
        self.send(
            MessageType::TestRunStatsChange,
            json!({"NewTestResults": results}),
        )
        .await;
    }

    pub async fn complete_run(&mut self) {
        self.send(
            MessageType::ExecutionComplete,
            json!({"TestRunCompleteArgs": {"IsCanceled": false, "IsAborted": false}}),
        )
        .await;
    }
}

pub fn connection() -> (MessageChannel<DuplexStream>, FakeHost) {
    let (orchestrator, host) = duplex(256 * 1024);
    (
        MessageChannel::new(orchestrator),
        FakeHost {
            channel: MessageChannel::new(host),
        },
    )
}

/// Connects a manager to a fake host that accepts the handshake
pub async fn start_session(emitter: Arc<dyn EventEmitter>) -> (TestManager<DuplexStream>, FakeHost) {
    let (channel, mut host) = connection();

    let handshake = tokio::spawn(async move {
        host.answer_version(1).await;
        host
    });

    let manager = TestManager::connect(project(), channel, None, emitter)
        .await
        .unwrap();
    (manager, handshake.await.unwrap())
}

/// Test case in the property-bag shape protocol version 1 hosts send
pub fn test_case(name: &str) -> Value {
    json!({
        "Properties": [
            {"Key": {"Id": "TestCase.FullyQualifiedName"}, "Value": name},
            {"Key": {"Id": "TestCase.DisplayName"}, "Value": name},
            {"Key": {"Id": "TestCase.Source"}, "Value": OUTPUT_PATH},
        ]
    })
}

pub fn test_result(name: &str, outcome: &str) -> Value {
    json!({
        "TestCase": test_case(name),
        "Properties": [
            {"Key": {"Id": "TestResult.Outcome"}, "Value": outcome},
            {"Key": {"Id": "TestResult.ErrorMessage"}, "Value": null},
            {"Key": {"Id": "TestResult.ErrorStackTrace"}, "Value": null},
        ]
    })
}

pub fn failed_result(name: &str, error_message: &str, error_stack_trace: &str) -> Value {
    json!({
        "TestCase": test_case(name),
        "Properties": [
            {"Key": {"Id": "TestResult.Outcome"}, "Value": "Failed"},
            {"Key": {"Id": "TestResult.ErrorMessage"}, "Value": error_message},
            {"Key": {"Id": "TestResult.ErrorStackTrace"}, "Value": error_stack_trace},
        ]
    })
}

#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<TestEvent>>,
}

impl RecordingEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<TestMessageEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|TestEvent::TestMessage(event)| event.clone())
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event: TestEvent) {
        self.events.lock().unwrap().push(event);
    }
}
