use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use havefits_core::validator::rejected_names_diagnostic;
use havefits_core::{
    BatchCoordinator, BatchError, BatchPhase, ChannelStatusSink, StatusSink, StatusUpdate,
};

const MARKERS: [&str; 3] = ["Downloaded:", "Failed to download:", "Error:"];

/// Stores every full-log update in arrival order.
#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<String>>,
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn update(&self, full_log: &str) {
        self.updates.lock().unwrap().push(full_log.to_string());
    }
}

fn coordinator() -> (BatchCoordinator, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let coordinator = BatchCoordinator::new(sink.clone()).unwrap();
    (coordinator, sink)
}

/// Report lines in a full log (every other line; phase lines in between).
fn report_lines(log: &str) -> Vec<&str> {
    log.lines().step_by(2).collect()
}

async fn wait_idle(coordinator: &BatchCoordinator) {
    tokio::time::timeout(Duration::from_secs(10), coordinator.wait_until_idle())
        .await
        .expect("batch should finish");
}

// ---------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------

#[tokio::test]
async fn test_submit_without_destination_rejected() {
    let (coordinator, sink) = coordinator();
    let err = coordinator
        .submit_batch("http://example.org/data/", &["a.fits"])
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::DestinationNotSet));
    assert_eq!(coordinator.outstanding(), 0);
    assert!(sink.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_with_invalid_base_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, sink) = coordinator();
    coordinator.set_destination_directory(dir.path()).await;

    for base in ["", "example.org/data", "file:///data/"] {
        let err = coordinator.submit_batch(base, &["a.fits"]).await.unwrap_err();
        assert!(matches!(err, BatchError::InvalidBaseUrl(_)), "{:?} for {:?}", err, base);
    }
    assert_eq!(coordinator.outstanding(), 0);
    assert!(sink.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_with_missing_destination_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _sink) = coordinator();
    coordinator.set_destination_directory(dir.path().join("absent")).await;

    let err = coordinator
        .submit_batch("http://example.org/", &["a.fits"])
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::DestinationMissing(_)));
}

#[tokio::test]
async fn test_all_names_rejected_dispatches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, sink) = coordinator();
    coordinator.set_destination_directory(dir.path()).await;

    let receipt = coordinator
        .submit_batch("http://example.org/", &["notes.txt", "img.png"])
        .await
        .unwrap();

    assert_eq!(receipt.dispatched, 0);
    assert_eq!(receipt.rejected, vec!["notes.txt", "img.png"]);
    wait_idle(&coordinator).await;
    assert!(sink.updates.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------
// End-to-end batches
// ---------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_duplicate_names_and_rejected_suffix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/a.fits"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"SIMPLE  =  T".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (coordinator, sink) = coordinator();
    coordinator.set_destination_directory(dir.path()).await;

    let base = format!("{}/data/", server.uri());
    let receipt = coordinator
        .submit_batch(&base, &["a.fits", "b.txt", "a.fits"])
        .await
        .unwrap();

    assert_eq!(receipt.dispatched, 2);
    assert_eq!(receipt.rejected, vec!["b.txt"]);
    assert_eq!(
        rejected_names_diagnostic(&receipt.rejected).unwrap(),
        "The following files are not FITS files and will not be downloaded:\nb.txt"
    );

    wait_idle(&coordinator).await;

    assert!(dir.path().join("a.fits").exists());
    assert!(dir.path().join("a Copy 1.fits").exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

    let updates = sink.updates.lock().unwrap();
    assert_eq!(updates.len(), 2);
    assert_eq!(
        updates[1],
        "Downloaded: a.fits\n\nDownloaded: a.fits\nAll Complete, Pending Next\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_every_task_reports_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok.fits"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.fits"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (coordinator, sink) = coordinator();
    coordinator.set_destination_directory(dir.path()).await;

    let mut names = vec!["ok.fits"; 12];
    names.extend(["gone.fits"; 4]);
    let receipt = coordinator.submit_batch(&server.uri(), &names).await.unwrap();
    assert_eq!(receipt.dispatched, 16);

    wait_idle(&coordinator).await;

    let updates = sink.updates.lock().unwrap();
    assert_eq!(updates.len(), 16);
    for (i, update) in updates.iter().enumerate() {
        // Each update is the previous log plus one report.
        let lines = report_lines(update);
        assert_eq!(lines.len(), i + 1);
        if i > 0 {
            assert!(update.starts_with(&updates[i - 1]));
        }
        let last = lines[i];
        assert_eq!(MARKERS.iter().filter(|m| last.starts_with(*m)).count(), 1, "{}", last);
    }

    let snapshot = coordinator.snapshot().await;
    assert_eq!(snapshot.valid_count, 16);
    assert_eq!(snapshot.outstanding, 0);
    assert_eq!(snapshot.succeeded, 12);
    assert_eq!(snapshot.remote_failures, 4);
    assert_eq!(snapshot.errors, 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 12);

    // Only the final report carries a non-empty phase.
    let phases: Vec<&str> = updates[15].lines().skip(1).step_by(2).collect();
    assert!(phases[..15].iter().all(|p| p.is_empty()));
    assert!(!phases[15].is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_last_report_failure_gives_partially_complete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.fits"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 32]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b.fits"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (coordinator, sink) = coordinator();
    coordinator.set_destination_directory(dir.path()).await;

    let base = format!("{}/", server.uri());
    coordinator.submit_batch(&base, &["a.fits", "b.fits"]).await.unwrap();
    wait_idle(&coordinator).await;

    let updates = sink.updates.lock().unwrap();
    assert_eq!(
        updates.last().unwrap(),
        "Downloaded: a.fits\n\nFailed to download: b.fits\nPartially Complete\n"
    );
    assert_eq!(
        coordinator.snapshot().await.phase,
        Some(BatchPhase::PartiallyComplete)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transport_error_isolated_from_siblings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![2u8; 128]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (coordinator, sink) = coordinator();
    coordinator.set_destination_directory(dir.path()).await;

    coordinator
        .submit_batch("http://127.0.0.1:1/", &["dead.fits"])
        .await
        .unwrap();
    coordinator
        .submit_batch(&server.uri(), &["live.fits"])
        .await
        .unwrap();
    wait_idle(&coordinator).await;

    let log = coordinator.log().await;
    assert!(log.contains("Downloaded: live.fits"));
    assert!(report_lines(&log).iter().any(|l| l.starts_with("Error: ")));
    assert_eq!(sink.updates.lock().unwrap().len(), 2);
    assert!(dir.path().join("live.fits").exists());
    assert!(!dir.path().join("dead.fits").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_channel_sink_delivers_in_log_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![3u8; 3000]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (sink, mut rx) = ChannelStatusSink::new();
    let coordinator = BatchCoordinator::new(Arc::new(sink)).unwrap();
    coordinator.set_destination_directory(dir.path()).await;

    coordinator
        .submit_batch(&server.uri(), &["x.fit", "x.fit", "z.fit"])
        .await
        .unwrap();
    wait_idle(&coordinator).await;
    drop(coordinator);

    let mut logs = Vec::new();
    let mut progress_bytes = 0u64;
    let mut bytes_per_task: HashMap<String, (String, u64)> = HashMap::new();
    while let Some(update) = rx.recv().await {
        match update {
            StatusUpdate::Log(text) => logs.push(text),
            StatusUpdate::Progress {
                task_id, item, bytes, ..
            } => {
                progress_bytes += bytes;
                bytes_per_task.entry(task_id).or_insert((item, 0)).1 += bytes;
            }
        }
    }

    assert_eq!(logs.len(), 3);
    assert!(logs.windows(2).all(|w| w[1].starts_with(&w[0])));
    assert!(logs[2].ends_with("All Complete, Pending Next\n"));
    assert_eq!(progress_bytes, 9000);
    // The two x.fit tasks are told apart by task id.
    assert_eq!(bytes_per_task.len(), 3);
    assert!(bytes_per_task.values().all(|(_, bytes)| *bytes == 3000));
    assert_eq!(bytes_per_task.values().filter(|(item, _)| item == "x.fit").count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fast_failures_never_complete_mid_batch() {
    let names = vec!["a.fits"; 64];

    for _ in 0..10 {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, sink) = coordinator();
        coordinator.set_destination_directory(dir.path()).await;

        let receipt = coordinator
            .submit_batch("http://127.0.0.1:1/", &names)
            .await
            .unwrap();
        assert_eq!(receipt.dispatched, 64);
        wait_idle(&coordinator).await;

        let updates = sink.updates.lock().unwrap();
        assert_eq!(updates.len(), 64);
        let phases: Vec<&str> = updates[63].lines().skip(1).step_by(2).collect();
        assert_eq!(phases.len(), 64);
        assert!(
            phases[..63].iter().all(|p| p.is_empty()),
            "completion phase before the last report: {:?}",
            phases.iter().filter(|p| !p.is_empty()).collect::<Vec<_>>()
        );
        assert_eq!(phases[63], "All Complete, Pending Next");
    }
}
