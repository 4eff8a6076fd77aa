use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::{watch, Mutex, RwLock};

use crate::batch::state::{BatchSnapshot, BatchState};
use crate::downloader::fetch_task::{FetchTask, ReportTarget};
use crate::status::sink::StatusSink;
use crate::types::types::{BatchError, BatchReceipt, FetchConfig, TaskReport};
use crate::validator::{compose_source_url, partition_names, rejected_names_diagnostic, validate_base};

/// Accepts batches, starts one fetch task per valid name and folds their
/// reports into a single activity log for the status sink.
///
/// Cloning gives another handle to the same coordinator. Batches submitted
/// while earlier ones are still running share the same counters and log.
#[derive(Clone)]
pub struct BatchCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    client: Client,
    config: FetchConfig,
    destination: RwLock<Option<PathBuf>>,
    state: Mutex<BatchState>,
    /// Mirrors `BatchState::outstanding` for lock-free observers.
    outstanding_tx: watch::Sender<usize>,
    sink: Arc<dyn StatusSink>,
}

impl BatchCoordinator {
    pub fn new(sink: Arc<dyn StatusSink>) -> Result<Self, BatchError> {
        Self::with_config(sink, FetchConfig::default())
    }

    pub fn with_config(sink: Arc<dyn StatusSink>, config: FetchConfig) -> Result<Self, BatchError> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build()?;
        let (outstanding_tx, _) = watch::channel(0usize);

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                client,
                config,
                destination: RwLock::new(None),
                state: Mutex::new(BatchState::new()),
                outstanding_tx,
                sink,
            }),
        })
    }

    /// Sets the directory downloads are written to. Must happen before the
    /// first `submit_batch`.
    pub async fn set_destination_directory(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        log::info!("[batch] destination directory set to {:?}", path);
        *self.inner.destination.write().await = Some(path);
    }

    pub async fn destination_directory(&self) -> Option<PathBuf> {
        self.inner.destination.read().await.clone()
    }

    /// Screens the input and starts one fetch task per valid name.
    ///
    /// Fails without starting anything when no destination is set or the base
    /// location is malformed. Names with an unaccepted suffix are returned in
    /// the receipt and never fetched; they do not hold back the others.
    pub async fn submit_batch<S: AsRef<str>>(
        &self,
        base: &str,
        names: &[S],
    ) -> Result<BatchReceipt, BatchError> {
        let dest_dir = self
            .destination_directory()
            .await
            .ok_or(BatchError::DestinationNotSet)?;

        if !validate_base(base) {
            return Err(BatchError::InvalidBaseUrl(base.to_string()));
        }

        let is_dir = tokio::fs::metadata(&dest_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(BatchError::DestinationMissing(dest_dir));
        }

        let (valid, rejected) = partition_names(names);
        if let Some(diagnostic) = rejected_names_diagnostic(&rejected) {
            log::warn!("[batch] {}", diagnostic.replace('\n', " "));
        }

        log::info!(
            "[batch] dispatching {} task(s) from {} into {:?}",
            valid.len(),
            base,
            dest_dir
        );

        // Count the whole round before the first spawn, so no report of this
        // round can bring outstanding to zero while siblings are still pending.
        if !valid.is_empty() {
            let mut state = self.inner.state.lock().await;
            state.begin_tasks(valid.len());
            self.inner.outstanding_tx.send_replace(state.outstanding());
        }

        let reporter: Arc<dyn ReportTarget> = self.inner.clone();
        for name in &valid {
            let task = FetchTask::new(
                compose_source_url(base, name),
                name.clone(),
                dest_dir.clone(),
                self.inner.config.chunk_size,
                self.inner.client.clone(),
                Arc::clone(&reporter),
            );

            log::debug!("[batch] task={} -> {}", task.id(), task.source_url());
            // Tasks are never joined or cancelled; they report on their own.
            drop(task.spawn());
        }

        Ok(BatchReceipt {
            dispatched: valid.len(),
            rejected,
        })
    }

    /// Number of tasks started and not yet reported.
    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding_tx.borrow()
    }

    /// Resolves once every started task has reported and the sink has seen
    /// the last update.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.inner.outstanding_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub async fn snapshot(&self) -> BatchSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    /// Current full activity log.
    pub async fn log(&self) -> String {
        self.inner.state.lock().await.log().to_string()
    }
}

#[async_trait]
impl ReportTarget for CoordinatorInner {
    async fn on_task_report(&self, report: TaskReport) {
        let mut state = self.state.lock().await;
        let phase = state.record(&report);
        log::info!(
            "[batch] {} (outstanding={}, phase={:?})",
            report.message,
            state.outstanding(),
            phase
        );

        self.sink.update(state.log()).await;
        self.outstanding_tx.send_replace(state.outstanding());
    }

    fn on_task_progress(&self, task_id: &str, filename: &str, bytes: u64, total: Option<u64>) {
        self.sink.on_progress(task_id, filename, bytes, total);
    }
}
