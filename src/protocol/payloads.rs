//! Payload shapes carried by the test host messages
//!
//! Test cases and results arrive either as flat objects or, from protocol
//! version 1 hosts, as property bags (`{"Properties": [{"Key": {"Id": ..}, "Value": ..}]}`).
//! Both shapes are accepted. Test cases keep the JSON they arrived in and are
//! echoed back to the host unchanged when selected for a run.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Value, json};

/// Outcome reported for one executed test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TestOutcome {
    #[default]
    None,
    Passed,
    Failed,
    Skipped,
    NotFound,
}

impl TestOutcome {
    fn from_number(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Passed),
            2 => Some(Self::Failed),
            3 => Some(Self::Skipped),
            4 => Some(Self::NotFound),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [
            Self::None,
            Self::Passed,
            Self::Failed,
            Self::Skipped,
            Self::NotFound,
        ]
        .into_iter()
        .find(|outcome| outcome.label().eq_ignore_ascii_case(name))
    }

    fn number(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Passed => 1,
            Self::Failed => 2,
            Self::Skipped => 3,
            Self::NotFound => 4,
        }
    }

    /// Lower-case label shown to callers
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::NotFound => "notfound",
        }
    }
}

/// Severity of a diagnostic line emitted by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestMessageLevel {
    Informational,
    Warning,
    Error,
}

impl TestMessageLevel {
    fn from_number(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Informational),
            1 => Some(Self::Warning),
            2 => Some(Self::Error),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [Self::Informational, Self::Warning, Self::Error]
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(name))
    }

    fn number(self) -> i64 {
        match self {
            Self::Informational => 0,
            Self::Warning => 1,
            Self::Error => 2,
        }
    }

    /// Lower-case label shown to callers
    pub fn label(self) -> &'static str {
        match self {
            Self::Informational => "informational",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// .NET serializes enums as numbers unless a string converter is configured
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrName {
    Number(i64),
    Name(String),
}

fn number_or_name<'de, D, T>(
    deserializer: D,
    what: &str,
    from_number: fn(i64) -> Option<T>,
    from_name: fn(&str) -> Option<T>,
) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrName::deserialize(deserializer)? {
        NumberOrName::Number(value) => from_number(value)
            .ok_or_else(|| de::Error::custom(format!("unknown {} {}", what, value))),
        NumberOrName::Name(name) => {
            from_name(&name).ok_or_else(|| de::Error::custom(format!("unknown {} {:?}", what, name)))
        }
    }
}

impl<'de> Deserialize<'de> for TestOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        number_or_name(
            deserializer,
            "test outcome",
            Self::from_number,
            Self::from_name,
        )
    }
}

impl Serialize for TestOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.number())
    }
}

impl<'de> Deserialize<'de> for TestMessageLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        number_or_name(
            deserializer,
            "message level",
            Self::from_number,
            Self::from_name,
        )
    }
}

impl Serialize for TestMessageLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.number())
    }
}

/// Looks a field up by its flat name, falling back to the property bag
fn property<'a>(value: &'a Value, name: &str, property_id: &str) -> Option<&'a Value> {
    if let Some(field) = value.get(name).filter(|field| !field.is_null()) {
        return Some(field);
    }

    value
        .get("Properties")?
        .as_array()?
        .iter()
        .find(|entry| entry.pointer("/Key/Id").and_then(Value::as_str) == Some(property_id))
        .and_then(|entry| entry.get("Value"))
        .filter(|field| !field.is_null())
}

fn string_property(value: &Value, name: &str, property_id: &str) -> Option<String> {
    property(value, name, property_id)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Descriptor of one discoverable test
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub id: Option<String>,
    pub fully_qualified_name: String,
    pub display_name: String,
    pub executor_uri: Option<String>,
    pub source: Option<String>,
    pub code_file_path: Option<String>,
    pub line_number: Option<i64>,
    raw: Value,
}

impl TestCase {
    /// Builds a flat descriptor; the display name doubles as the filter key
    pub fn new(fully_qualified_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        let fully_qualified_name = fully_qualified_name.into();
        let display_name = display_name.into();
        let raw = json!({
            "FullyQualifiedName": fully_qualified_name,
            "DisplayName": display_name,
        });

        Self {
            id: None,
            fully_qualified_name,
            display_name,
            executor_uri: None,
            source: None,
            code_file_path: None,
            line_number: None,
            raw,
        }
    }

    fn from_value(raw: Value) -> Result<Self, String> {
        let fully_qualified_name =
            string_property(&raw, "FullyQualifiedName", "TestCase.FullyQualifiedName")
                .ok_or_else(|| "test case without FullyQualifiedName".to_string())?;
        // vstest falls back to the qualified name when no display name is set
        let display_name = string_property(&raw, "DisplayName", "TestCase.DisplayName")
            .unwrap_or_else(|| fully_qualified_name.clone());

        Ok(Self {
            id: string_property(&raw, "Id", "TestCase.Id"),
            executor_uri: string_property(&raw, "ExecutorUri", "TestCase.ExecutorUri"),
            source: string_property(&raw, "Source", "TestCase.Source"),
            code_file_path: string_property(&raw, "CodeFilePath", "TestCase.CodeFilePath"),
            line_number: property(&raw, "LineNumber", "TestCase.LineNumber").and_then(Value::as_i64),
            fully_qualified_name,
            display_name,
            raw,
        })
    }
}

impl<'de> Deserialize<'de> for TestCase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(raw).map_err(de::Error::custom)
    }
}

impl Serialize for TestCase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

/// Outcome of one executed test as reported in a stats-change batch
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub test_case: TestCase,
    pub outcome: TestOutcome,
    pub error_message: Option<String>,
    pub error_stack_trace: Option<String>,
    pub display_name: Option<String>,
    pub duration: Option<String>,
}

impl TestResult {
    fn from_value(raw: Value) -> Result<Self, String> {
        let test_case = raw
            .get("TestCase")
            .cloned()
            .ok_or_else(|| "test result without TestCase".to_string())
            .and_then(TestCase::from_value)?;

        let outcome = match property(&raw, "Outcome", "TestResult.Outcome") {
            Some(value) => TestOutcome::deserialize(value).map_err(|e| e.to_string())?,
            None => TestOutcome::None,
        };

        Ok(Self {
            test_case,
            outcome,
            error_message: string_property(&raw, "ErrorMessage", "TestResult.ErrorMessage"),
            error_stack_trace: string_property(
                &raw,
                "ErrorStackTrace",
                "TestResult.ErrorStackTrace",
            ),
            display_name: string_property(&raw, "DisplayName", "TestResult.DisplayName"),
            duration: string_property(&raw, "Duration", "TestResult.Duration"),
        })
    }
}

impl<'de> Deserialize<'de> for TestResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(raw).map_err(de::Error::custom)
    }
}

/// `TestDiscovery.Start` request
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiscoveryRequest<'a> {
    pub sources: &'a [String],
}

/// `TestExecution.RunSelectedTestCasesDefaultHost` request
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunSelectedRequest<'a> {
    pub test_cases: &'a [TestCase],
}

/// `TestExecution.GetTestRunnerProcessStartInfoForRunSelected` request
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartInfoRequest<'a> {
    pub test_cases: &'a [TestCase],
    pub debugging_enabled: bool,
}

/// `TestExecution.CustomTestHostLaunchCallback` request
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchCallback {
    pub host_process_id: u32,
}

/// `TestSession.Message` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestMessagePayload {
    pub message_level: TestMessageLevel,
    #[serde(default, deserialize_with = "null_as_empty_string")]
    pub message: String,
}

fn null_as_empty_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// `TestExecution.StatsChange` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestRunChangedPayload {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub new_test_results: Vec<TestResult>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<TestResult>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<TestResult>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `TestExecution.Completed` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestRunCompletePayload {
    #[serde(default, rename = "TestRunCompleteArgs")]
    pub summary: Option<RunSummary>,
}

/// Final statistics of a run, as reported by the host
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RunSummary {
    pub is_canceled: bool,
    pub is_aborted: bool,
    pub error: Option<Value>,
    pub elapsed_time_in_running_tests: Option<String>,
}

impl RunSummary {
    /// Human-readable error, if the host reported one
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::String(message) => Some(message.clone()),
            Value::Object(exception) => exception
                .get("Message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| Some(Value::Object(exception.clone()).to_string())),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "canceled={} aborted={} elapsed={}",
            self.is_canceled,
            self.is_aborted,
            self.elapsed_time_in_running_tests.as_deref().unwrap_or("?")
        )
    }
}

/// Launch command the host wants the caller to run
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TestProcessStartInfo {
    pub file_name: String,
    pub arguments: String,
    pub working_directory: String,
    pub environment_variables: Option<IndexMap<String, String>>,
}
