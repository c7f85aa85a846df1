//! Registry of supported test frameworks

use serde::Serialize;

use crate::testing::error::TestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestFramework {
    /// Name callers select the framework by
    pub name: &'static str,
    pub display_name: &'static str,
    /// Attributes that mark a test method
    pub test_attributes: &'static [&'static str],
}

static FRAMEWORKS: [TestFramework; 3] = [
    TestFramework {
        name: "xunit",
        display_name: "xUnit.net",
        test_attributes: &["Fact", "Theory"],
    },
    TestFramework {
        name: "nunit",
        display_name: "NUnit",
        test_attributes: &["Test", "TestCase", "TestCaseSource"],
    },
    TestFramework {
        name: "mstest",
        display_name: "MSTest",
        test_attributes: &["TestMethod", "DataTestMethod"],
    },
];

impl TestFramework {
    pub fn all() -> &'static [TestFramework] {
        &FRAMEWORKS
    }

    /// Case-insensitive lookup by name
    pub fn get(name: &str) -> Option<&'static TestFramework> {
        FRAMEWORKS
            .iter()
            .find(|framework| framework.name.eq_ignore_ascii_case(name))
    }

    pub fn resolve(name: &str) -> Result<&'static TestFramework, TestError> {
        Self::get(name).ok_or_else(|| TestError::UnknownTestFramework(name.to_string()))
    }
}
