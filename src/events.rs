//! Diagnostic events surfaced to the caller while a session runs

use serde::Serialize;
use tracing::{info, warn};

use crate::protocol::payloads::TestMessageLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "Event", content = "Body")]
pub enum TestEvent {
    TestMessage(TestMessageEvent),
}

impl TestEvent {
    pub fn test_message(level: TestMessageLevel, message: impl Into<String>) -> Self {
        Self::TestMessage(TestMessageEvent {
            message_level: level.label().to_string(),
            message: message.into(),
        })
    }
}

/// One diagnostic line; the level is always lower-case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestMessageEvent {
    pub message_level: String,
    pub message: String,
}

/// Sink for session events.
///
/// Emitters are shared with the host output relays, so they must be callable
/// from any task.
#[cfg_attr(test, mockall::automock)]
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: TestEvent);
}

/// Writes events to the tracing log only
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEmitter;

impl EventEmitter for TracingEmitter {
    fn emit(&self, event: TestEvent) {
        match event {
            TestEvent::TestMessage(TestMessageEvent {
                message_level,
                message,
            }) => {
                if message_level == TestMessageLevel::Informational.label() {
                    info!(level = %message_level, "{}", message);
                } else {
                    warn!(level = %message_level, "{}", message);
                }
            }
        }
    }
}
