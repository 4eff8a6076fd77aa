use async_trait::async_trait;

/// The single consumer of batch status.
///
/// `update` receives the full activity log after every completed fetch task,
/// in completion order. Calls come from whatever tokio worker finished the
/// task; implementations that drive a UI must hand the text over to the UI's
/// own thread or event loop (see `ChannelStatusSink`).
///
/// `update` runs while the coordinator holds its state lock, so two calls
/// never overlap and never arrive out of log order. Keep it short.
#[async_trait]
pub trait StatusSink: Send + Sync + 'static {
    /// Called once per completed task with the whole log so far.
    async fn update(&self, full_log: &str);

    /// Called for every chunk written by a task. Unordered across tasks;
    /// `task_id` tells apart tasks fetching the same item name.
    fn on_progress(&self, _task_id: &str, _item: &str, _bytes: u64, _total: Option<u64>) {}
}
