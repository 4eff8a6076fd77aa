use std::fmt;

use serde::Serialize;

use crate::types::types::{TaskOutcome, TaskReport};

/// Substring that marks a remote failure when the phase is derived.
const REMOTE_FAILURE_TEXT: &str = "Failed to download";

/// Overall batch progress after the most recent report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchPhase {
    /// Tasks are still outstanding. Rendered as an empty line.
    InProgress,
    /// Nothing outstanding and the last report was a remote failure.
    PartiallyComplete,
    /// Nothing outstanding and the last report was not a remote failure.
    AllComplete,
}

impl BatchPhase {
    /// Phase after a report, given the outstanding count once it has been
    /// decremented for that report.
    pub fn after_report(outstanding: usize, message: &str) -> Self {
        if outstanding > 0 {
            BatchPhase::InProgress
        } else if message.contains(REMOTE_FAILURE_TEXT) {
            BatchPhase::PartiallyComplete
        } else {
            BatchPhase::AllComplete
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchPhase::InProgress => "",
            BatchPhase::PartiallyComplete => "Partially Complete",
            BatchPhase::AllComplete => "All Complete, Pending Next",
        }
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable copy of the batch state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSnapshot {
    pub valid_count: usize,
    pub outstanding: usize,
    pub succeeded: usize,
    pub remote_failures: usize,
    pub errors: usize,
    pub phase: Option<BatchPhase>,
    pub log: String,
}

/// Counters and activity log shared by every task of a coordinator.
/// Only ever touched under the coordinator's lock.
#[derive(Debug, Default)]
pub struct BatchState {
    valid_count: usize,
    outstanding: usize,
    succeeded: usize,
    remote_failures: usize,
    errors: usize,
    phase: Option<BatchPhase>,
    log: String,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for a whole dispatch round before any of its tasks starts.
    pub fn begin_tasks(&mut self, count: usize) {
        self.valid_count += count;
        self.outstanding += count;
    }

    /// Folds one terminal report into the state and returns the new phase.
    pub fn record(&mut self, report: &TaskReport) -> BatchPhase {
        match self.outstanding.checked_sub(1) {
            Some(n) => self.outstanding = n,
            None => log::warn!(
                "[batch] report from task {} with nothing outstanding",
                report.task_id
            ),
        }

        match report.outcome {
            TaskOutcome::Downloaded => self.succeeded += 1,
            TaskOutcome::RemoteFailure => self.remote_failures += 1,
            TaskOutcome::Error => self.errors += 1,
        }

        let phase = BatchPhase::after_report(self.outstanding, &report.message);
        self.log.push_str(&report.message);
        self.log.push('\n');
        self.log.push_str(phase.as_str());
        self.log.push('\n');
        self.phase = Some(phase);
        phase
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn valid_count(&self) -> usize {
        self.valid_count
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            valid_count: self.valid_count,
            outstanding: self.outstanding,
            succeeded: self.succeeded,
            remote_failures: self.remote_failures,
            errors: self.errors,
            phase: self.phase,
            log: self.log.clone(),
        }
    }
}
