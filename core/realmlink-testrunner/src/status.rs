//! Test status and its aggregation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one test item: `pending -> running -> success | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
}

impl TestStatus {
    /// Whether the status can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, TestStatus::Success | TestStatus::Failed)
    }

    /// Folds item statuses into a suite status.
    ///
    /// All pending (or no items) is pending; any pending or running item
    /// makes the suite running; otherwise any failure fails it.
    pub fn aggregate(statuses: &[TestStatus]) -> TestStatus {
        if statuses.iter().all(|s| *s == TestStatus::Pending) {
            TestStatus::Pending
        } else if statuses
            .iter()
            .any(|s| matches!(s, TestStatus::Pending | TestStatus::Running))
        {
            TestStatus::Running
        } else if statuses.contains(&TestStatus::Failed) {
            TestStatus::Failed
        } else {
            TestStatus::Success
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Running => "running",
            TestStatus::Success => "success",
            TestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a running suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestProgress {
    pub statuses: Vec<TestStatus>,
    pub aggregate: TestStatus,
}

impl TestProgress {
    /// All items pending.
    pub fn pending(len: usize) -> Self {
        Self::from_statuses(vec![TestStatus::Pending; len])
    }

    pub fn from_statuses(statuses: Vec<TestStatus>) -> Self {
        let aggregate = TestStatus::aggregate(&statuses);
        Self {
            statuses,
            aggregate,
        }
    }
}
