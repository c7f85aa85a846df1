//! Wire protocol layer
//! - codec.rs: 7-bit length-prefixed framing
//! - message.rs: Message envelope and tag set
//! - payloads.rs: Payload shapes per tag
//! - channel.rs: Framed transport with blocking and cancellable receive
//! - error.rs: Channel errors

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;
pub mod payloads;

pub use channel::{MessageChannel, Received};
pub use error::ChannelError;
pub use message::{Message, MessageType};
pub use payloads::{TestCase, TestMessageLevel, TestOutcome, TestResult};
