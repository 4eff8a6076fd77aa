use async_trait::async_trait;
use tokio::sync::mpsc;

use super::sink::StatusSink;

/// Message delivered by [`ChannelStatusSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Log(String),
    Progress {
        task_id: String,
        item: String,
        bytes: u64,
        total: Option<u64>,
    },
}

/// Forwards every status call into an unbounded channel, so a consumer on
/// another thread (a UI loop, a terminal renderer) receives them in order
/// without ever running on a fetch worker.
pub struct ChannelStatusSink {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ChannelStatusSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StatusSink for ChannelStatusSink {
    async fn update(&self, full_log: &str) {
        // Only fails once the receiver is gone; nobody is listening then.
        let _ = self.tx.send(StatusUpdate::Log(full_log.to_string()));
    }

    fn on_progress(&self, task_id: &str, item: &str, bytes: u64, total: Option<u64>) {
        let _ = self.tx.send(StatusUpdate::Progress {
            task_id: task_id.to_string(),
            item: item.to_string(),
            bytes,
            total,
        });
    }
}
