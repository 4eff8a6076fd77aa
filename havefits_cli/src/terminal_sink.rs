use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use havefits_core::StatusSink;

/// Renders batch status in the terminal.
///
/// New activity log lines are printed above the bars; one bar per fetch task
/// tracks bytes written and a total bar counts finished items.
pub struct TerminalStatusSink {
    multi: MultiProgress,
    /// task id → byte bar, created on the first chunk
    bars: Mutex<HashMap<String, ProgressBar>>,
    total_bar: ProgressBar,
    /// How much of the full log has already been printed.
    printed: Mutex<usize>,
}

impl TerminalStatusSink {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("Items [{bar:30.green/white}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        let total_bar = multi.add(ProgressBar::new(0));
        total_bar.set_style(style);

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            total_bar,
            printed: Mutex::new(0),
        }
    }

    /// Number of items the total bar counts towards.
    pub fn set_total(&self, items: usize) {
        self.total_bar.set_length(items as u64);
    }

    pub fn finish(&self) {
        if let Ok(bars) = self.bars.lock() {
            for bar in bars.values() {
                bar.finish();
            }
        }
        self.total_bar.finish_with_message("done");
    }

    fn task_bar(&self, task_id: &str, item: &str, total: Option<u64>) -> Option<ProgressBar> {
        let mut bars = self.bars.lock().ok()?;
        let bar = bars.entry(task_id.to_string()).or_insert_with(|| {
            let style = ProgressStyle::with_template(
                "[{bar:30.cyan/blue}] {bytes}/{total_bytes} ({binary_bytes_per_sec}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
            let bar = self
                .multi
                .insert_before(&self.total_bar, ProgressBar::new(total.unwrap_or(0)));
            bar.set_style(style);
            bar.set_message(item.to_string());
            bar
        });
        Some(bar.clone())
    }
}

#[async_trait]
impl StatusSink for TerminalStatusSink {
    async fn update(&self, full_log: &str) {
        let Ok(mut printed) = self.printed.lock() else {
            return;
        };
        let fresh = full_log.get(*printed..).unwrap_or("");
        for line in fresh.lines().filter(|l| !l.is_empty()) {
            let _ = self.multi.println(line);
        }
        *printed = full_log.len();
        self.total_bar.inc(1);
    }

    fn on_progress(&self, task_id: &str, item: &str, bytes: u64, total: Option<u64>) {
        if let Some(bar) = self.task_bar(task_id, item, total) {
            bar.inc(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_item_from_two_tasks_gets_two_bars() {
        let sink = TerminalStatusSink::new();
        sink.on_progress("task-1", "a.fits", 100, Some(100));
        sink.on_progress("task-2", "a.fits", 40, Some(100));
        sink.on_progress("task-2", "a.fits", 60, Some(100));

        let bars = sink.bars.lock().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars["task-1"].position(), 100);
        assert_eq!(bars["task-2"].position(), 100);
    }
}
