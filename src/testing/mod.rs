//! Test session layer
//! - manager.rs: TestManager, one session per project and host
//! - handshake.rs: Protocol version negotiation
//! - discovery.rs: Discovery with display-name filtering
//! - run.rs: Run-selected session
//! - debug.rs: Start-info requests and debug launches
//! - aggregator.rs: Stats-change batches to a verdict
//! - framework.rs: Supported test frameworks
//! - types.rs: Results returned to callers
//! - error.rs: Session errors

pub mod aggregator;
pub mod debug;
pub mod discovery;
pub mod error;
pub mod framework;
pub mod handshake;
pub mod manager;
pub mod run;
pub mod types;

pub use error::TestError;
pub use framework::TestFramework;
pub use manager::TestManager;
pub use types::{RunVerdict, TestResultSummary, TestStartInfo};

use tracing::warn;

use crate::events::{EventEmitter, TestEvent};
use crate::protocol::message::Message;
use crate::protocol::payloads::TestMessagePayload;

/// Decodes a `TestSession.Message` and forwards it as a diagnostic event.
/// A diagnostic that does not decode is logged and dropped.
pub(crate) fn relay_test_message(message: &Message, emitter: &dyn EventEmitter) {
    match message.payload::<TestMessagePayload>() {
        Ok(TestMessagePayload {
            message_level,
            message,
        }) => emitter.emit(TestEvent::test_message(message_level, message)),
        Err(e) => warn!("Dropping unreadable test message: {}", e),
    }
}
