use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Bytes read from the response body per write.
pub const CHUNK_SIZE: usize = 1024;

/// Report marker for a successful fetch.
pub const DOWNLOADED_MARKER: &str = "Downloaded:";
/// Report marker for a non-success response status.
pub const REMOTE_FAILURE_MARKER: &str = "Failed to download:";
/// Report marker for a transport or filesystem failure.
pub const ERROR_MARKER: &str = "Error:";

/// Failure of a single fetch task. The `Display` text is what ends up after
/// `Error: ` in the activity log.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Disk(#[from] std::io::Error),

    #[error("invalid source address: {0}")]
    InvalidUrl(String),

    #[error("not a usable file name: {0}")]
    InvalidFilename(String),

    #[error("no free destination name left for {0}")]
    NameSpaceExhausted(String),
}

/// Errors returned synchronously by the batch coordinator. Nothing is
/// dispatched when one of these is returned.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Please enter a valid URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Please select a download location.")]
    DestinationNotSet,

    #[error("download location does not exist or is not a directory: {0}")]
    DestinationMissing(PathBuf),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Terminal state of a fetch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskOutcome {
    Downloaded,
    RemoteFailure,
    Error,
}

/// One terminal report sent by a fetch task to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task_id: String,
    pub outcome: TaskOutcome,
    pub message: String,
}

impl TaskReport {
    pub fn downloaded(task_id: String, filename: &str) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::Downloaded,
            message: format!("{} {}", DOWNLOADED_MARKER, filename),
        }
    }

    pub fn remote_failure(task_id: String, filename: &str) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::RemoteFailure,
            message: format!("{} {}", REMOTE_FAILURE_MARKER, filename),
        }
    }

    pub fn error(task_id: String, error: &FetchError) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::Error,
            message: format!("{} {}", ERROR_MARKER, error),
        }
    }
}

/// Result of a successful `submit_batch` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReceipt {
    /// Number of fetch tasks started.
    pub dispatched: usize,
    /// Names that failed the suffix check, in input order.
    pub rejected: Vec<String>,
}

/// HTTP client settings shared by every task of a coordinator.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Unset by default: a silent remote can hold a task indefinitely.
    pub connect_timeout: Option<Duration>,
    pub chunk_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("havefits/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: None,
            chunk_size: CHUNK_SIZE,
        }
    }
}
