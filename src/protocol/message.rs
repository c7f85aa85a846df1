//! Message envelope exchanged with the test host

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::error::ChannelError;

/// Message tags understood by the orchestrator.
///
/// Tags outside this set decode to [`MessageType::Unknown`] so a host that
/// speaks a newer dialect does not break the read loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    VersionCheck,
    StartDiscovery,
    TestCasesFound,
    DiscoveryComplete,
    TestRunSelectedTestCasesDefaultHost,
    TestRunStatsChange,
    ExecutionComplete,
    GetTestRunnerProcessStartInfoForRunSelected,
    CustomTestHostLaunchCallback,
    TestMessage,
    SessionEnd,
    Unknown(String),
}

impl MessageType {
    /// Wire representation of the tag
    pub fn as_str(&self) -> &str {
        match self {
            Self::VersionCheck => "ProtocolVersion",
            Self::StartDiscovery => "TestDiscovery.Start",
            Self::TestCasesFound => "TestDiscovery.TestFound",
            Self::DiscoveryComplete => "TestDiscovery.Completed",
            Self::TestRunSelectedTestCasesDefaultHost => {
                "TestExecution.RunSelectedTestCasesDefaultHost"
            }
            Self::TestRunStatsChange => "TestExecution.StatsChange",
            Self::ExecutionComplete => "TestExecution.Completed",
            Self::GetTestRunnerProcessStartInfoForRunSelected => {
                "TestExecution.GetTestRunnerProcessStartInfoForRunSelected"
            }
            Self::CustomTestHostLaunchCallback => "TestExecution.CustomTestHostLaunchCallback",
            Self::TestMessage => "TestSession.Message",
            Self::SessionEnd => "TestSession.Terminate",
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "ProtocolVersion" => Self::VersionCheck,
            "TestDiscovery.Start" => Self::StartDiscovery,
            "TestDiscovery.TestFound" => Self::TestCasesFound,
            "TestDiscovery.Completed" => Self::DiscoveryComplete,
            "TestExecution.RunSelectedTestCasesDefaultHost" => {
                Self::TestRunSelectedTestCasesDefaultHost
            }
            "TestExecution.StatsChange" => Self::TestRunStatsChange,
            "TestExecution.Completed" => Self::ExecutionComplete,
            "TestExecution.GetTestRunnerProcessStartInfoForRunSelected" => {
                Self::GetTestRunnerProcessStartInfoForRunSelected
            }
            "TestExecution.CustomTestHostLaunchCallback" => Self::CustomTestHostLaunchCallback,
            "TestSession.Message" => Self::TestMessage,
            "TestSession.Terminate" => Self::SessionEnd,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<MessageType> for String {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One framed message: a tag plus a payload whose shape depends on the tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    pub fn new(message_type: MessageType, payload: Value) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    /// Decodes the payload into the shape implied by the tag
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ChannelError> {
        T::deserialize(&self.payload).map_err(|source| ChannelError::InvalidPayload {
            message_type: self.message_type.clone(),
            source,
        })
    }
}
