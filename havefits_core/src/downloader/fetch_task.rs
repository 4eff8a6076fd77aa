use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use url::Url;
use uuid::Uuid;

use crate::downloader::collision_writer::save_stream;
use crate::types::types::{FetchError, TaskReport};

/// Receiver of fetch task reports. The batch coordinator implements this;
/// each task holds it as its only shared reference.
#[async_trait]
pub trait ReportTarget: Send + Sync + 'static {
    /// Called exactly once per task with its terminal report.
    async fn on_task_report(&self, report: TaskReport);

    /// Called for every chunk written to disk.
    fn on_task_progress(&self, _task_id: &str, _filename: &str, _bytes: u64, _total: Option<u64>) {}
}

/// Lifecycle of a fetch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Retrieving,
    Writing,
    DoneOk,
    DoneRemoteFail,
    DoneError,
}

/// What a fetch attempt produced before it is turned into a report.
enum Fetched {
    Saved(PathBuf),
    Refused(StatusCode),
}

/// One item retrieval: GET `source_url`, stream the body into `dest_dir`
/// under a collision-free variant of `filename`, report once.
pub struct FetchTask {
    id: String,
    source_url: String,
    filename: String,
    dest_dir: PathBuf,
    chunk_size: usize,
    client: Client,
    reporter: Arc<dyn ReportTarget>,
    state: TaskState,
}

impl FetchTask {
    pub fn new(
        source_url: String,
        filename: String,
        dest_dir: PathBuf,
        chunk_size: usize,
        client: Client,
        reporter: Arc<dyn ReportTarget>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_url,
            filename,
            dest_dir,
            chunk_size,
            client,
            reporter,
            state: TaskState::Created,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Runs the task on its own tokio task.
    pub fn spawn(self) -> JoinHandle<TaskState> {
        tokio::spawn(self.run())
    }

    /// Retrieves, writes and reports. Whatever happens, exactly one report is
    /// delivered before this returns the terminal state.
    pub async fn run(mut self) -> TaskState {
        let report = match self.fetch().await {
            Ok(Fetched::Saved(path)) => {
                log::info!("[fetch_task] task={}: saved {} as {:?}", self.id, self.filename, path);
                self.transition(TaskState::DoneOk);
                TaskReport::downloaded(self.id.clone(), &self.filename)
            }
            Ok(Fetched::Refused(status)) => {
                log::warn!(
                    "[fetch_task] task={}: {} answered {}",
                    self.id, self.source_url, status
                );
                self.transition(TaskState::DoneRemoteFail);
                TaskReport::remote_failure(self.id.clone(), &self.filename)
            }
            Err(e) => {
                log::error!("[fetch_task] task={}: {} failed: {}", self.id, self.source_url, e);
                self.transition(TaskState::DoneError);
                TaskReport::error(self.id.clone(), &e)
            }
        };

        self.reporter.on_task_report(report).await;
        self.state
    }

    async fn fetch(&mut self) -> Result<Fetched, FetchError> {
        let url = Url::parse(&self.source_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{} ({})", self.source_url, e)))?;

        self.transition(TaskState::Retrieving);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(Fetched::Refused(status));
        }

        // Destination is only created once the remote has said yes.
        self.transition(TaskState::Writing);
        let total = response.content_length();
        let body = StreamReader::new(Box::pin(
            response.bytes_stream().map_err(std::io::Error::other),
        ));

        let reporter = Arc::clone(&self.reporter);
        let task_id = self.id.clone();
        let filename = self.filename.clone();
        let path = save_stream(&self.dest_dir, &self.filename, body, self.chunk_size, |n| {
            reporter.on_task_progress(&task_id, &filename, n, total)
        })
        .await?;

        Ok(Fetched::Saved(path))
    }

    fn transition(&mut self, next: TaskState) {
        log::debug!("[fetch_task] task={}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}
