//! Reduces stats-change batches into a run verdict

use crate::protocol::payloads::{TestOutcome, TestResult};
use crate::testing::types::{RunVerdict, TestResultSummary};

/// Flattens `batches` in arrival order; the run passes unless an outcome failed
pub fn aggregate(batches: &[Vec<TestResult>]) -> RunVerdict {
    let results: Vec<TestResultSummary> = batches
        .iter()
        .flatten()
        .map(TestResultSummary::from)
        .collect();

    let pass = !batches
        .iter()
        .flatten()
        .any(|result| result.outcome == TestOutcome::Failed);

    RunVerdict { results, pass }
}
