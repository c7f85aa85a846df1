//! Results returned to callers of a test session

use indexmap::IndexMap;
use serde::Serialize;

use crate::protocol::payloads::{TestProcessStartInfo, TestResult};

/// Externally visible outcome of one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestResultSummary {
    /// Fully qualified name of the test
    pub method_name: String,
    /// Lower-case outcome label, e.g. "passed"
    pub outcome: String,
    pub error_message: Option<String>,
    pub error_stack_trace: Option<String>,
}

impl From<&TestResult> for TestResultSummary {
    fn from(result: &TestResult) -> Self {
        Self {
            method_name: result.test_case.fully_qualified_name.clone(),
            outcome: result.outcome.label().to_string(),
            error_message: result.error_message.clone(),
            error_stack_trace: result.error_stack_trace.clone(),
        }
    }
}

/// Final verdict of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunVerdict {
    /// Per-test outcomes in the order the host reported them
    pub results: Vec<TestResultSummary>,
    /// True unless some test failed
    pub pass: bool,
}

impl RunVerdict {
    /// Verdict of a run that selected no tests
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            pass: true,
        }
    }
}

/// Command the caller should run to execute the selected tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestStartInfo {
    pub executable: String,
    pub arguments: String,
    pub working_directory: String,
    /// Only filled for debug launches
    pub environment_variables: IndexMap<String, String>,
}

impl TestStartInfo {
    /// Start info without the host's environment block
    pub fn without_environment(info: TestProcessStartInfo) -> Self {
        Self {
            environment_variables: IndexMap::new(),
            ..Self::from(info)
        }
    }
}

impl From<TestProcessStartInfo> for TestStartInfo {
    fn from(info: TestProcessStartInfo) -> Self {
        Self {
            executable: info.file_name,
            arguments: info.arguments,
            working_directory: info.working_directory,
            environment_variables: info.environment_variables.unwrap_or_default(),
        }
    }
}
