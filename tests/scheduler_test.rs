//! End-to-end scheduler behavior over real album fixtures on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use cuedrop::album::Album;
use cuedrop::assembler::AlbumAssembler;
use cuedrop::convert::IdentityNormalizer;
use cuedrop::ledger::{LedgerError, ProcessedLedger};
use cuedrop::metadata::NoopFetcher;
use cuedrop::processor::{AlbumProcessor, ProcessError};
use cuedrop::scheduler::{ScanScheduler, SchedulerConfig};
use cuedrop::stability::StabilityDetector;

struct MemoryLedger {
    processed: Mutex<HashSet<PathBuf>>,
}

impl MemoryLedger {
    fn new() -> Self {
        MemoryLedger {
            processed: Mutex::new(HashSet::new()),
        }
    }

    fn contains(&self, path: &Path) -> bool {
        self.processed.lock().unwrap().contains(path)
    }
}

#[async_trait]
impl ProcessedLedger for MemoryLedger {
    async fn is_processed(&self, path: &Path) -> Result<bool, LedgerError> {
        Ok(self.processed.lock().unwrap().contains(path))
    }

    async fn mark_processed(&self, path: &Path) -> Result<(), LedgerError> {
        self.processed.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }
}

/// Processor that counts calls, detects overlapping invocations, and can be
/// switched into a failure mode.
struct RecordingProcessor {
    calls: AtomicUsize,
    active: AtomicUsize,
    overlapped: AtomicBool,
    fail: AtomicBool,
}

impl RecordingProcessor {
    fn new() -> Self {
        RecordingProcessor {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AlbumProcessor for RecordingProcessor {
    async fn process(&self, _album: &Album, output_root: &Path) -> Result<(), ProcessError> {
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Long enough that a second scan would have to overlap to sneak in.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(ProcessError::CreateDir {
                path: output_root.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "injected"),
            })
        } else {
            Ok(())
        }
    }
}

fn write_album_fixture(root: &Path, dir_name: &str) -> PathBuf {
    let album_dir = root.join(dir_name);
    std::fs::create_dir_all(&album_dir).unwrap();
    std::fs::write(album_dir.join("album.wav"), b"RIFF").unwrap();
    std::fs::write(
        album_dir.join("album.cue"),
        concat!(
            "FILE \"album.wav\" WAVE\n",
            "  TRACK 01 AUDIO\n",
            "    TITLE \"Opening\"\n",
            "    INDEX 01 00:00:00\n",
            "  TRACK 02 AUDIO\n",
            "    TITLE \"Closing\"\n",
            "    INDEX 01 03:30:00\n",
        ),
    )
    .unwrap();
    album_dir
}

struct Harness {
    scheduler: ScanScheduler,
    ledger: Arc<MemoryLedger>,
    processor: Arc<RecordingProcessor>,
    _output: tempfile::TempDir,
}

fn harness() -> Harness {
    harness_with(
        Duration::from_millis(40),
        StabilityDetector::new(
            Duration::from_millis(15),
            Duration::from_millis(30),
            Duration::from_secs(5),
        ),
    )
}

fn harness_with(debounce_delay: Duration, detector: StabilityDetector) -> Harness {
    let output = tempfile::tempdir().unwrap();
    let ledger = Arc::new(MemoryLedger::new());
    let processor = Arc::new(RecordingProcessor::new());
    let scheduler = ScanScheduler::new(
        SchedulerConfig {
            debounce_delay,
            output_root: output.path().to_path_buf(),
        },
        detector,
        AlbumAssembler::new(Arc::new(IdentityNormalizer)),
        ledger.clone(),
        Arc::new(NoopFetcher),
        processor.clone(),
    );
    Harness {
        scheduler,
        ledger,
        processor,
        _output: output,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test]
async fn burst_of_triggers_produces_one_scan() {
    let drop_root = tempfile::tempdir().unwrap();
    let album = write_album_fixture(drop_root.path(), "Artist - Album (1999)");
    let h = harness();

    for _ in 0..10 {
        h.scheduler.trigger_scan(&album);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    wait_for(|| h.ledger.contains(&album)).await;
    // Give any stray duplicate scan time to surface.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.processor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn processed_directories_are_skipped() {
    let drop_root = tempfile::tempdir().unwrap();
    let album = write_album_fixture(drop_root.path(), "Artist - Album (1999)");
    let h = harness();

    h.ledger.mark_processed(&album).await.unwrap();
    h.scheduler.trigger_scan(&album);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.processor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_processing_is_retried_on_next_trigger() {
    let drop_root = tempfile::tempdir().unwrap();
    let album = write_album_fixture(drop_root.path(), "Artist - Album (1999)");
    let h = harness();

    h.processor.fail.store(true, Ordering::SeqCst);
    h.scheduler.trigger_scan(&album);
    wait_for(|| h.processor.calls.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!h.ledger.contains(&album));

    h.processor.fail.store(false, Ordering::SeqCst);
    h.scheduler.trigger_scan(&album);
    wait_for(|| h.ledger.contains(&album)).await;
    assert_eq!(h.processor.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_directories_never_overlap_downstream() {
    let drop_root = tempfile::tempdir().unwrap();
    let first = write_album_fixture(drop_root.path(), "A - One (2001)");
    let second = write_album_fixture(drop_root.path(), "B - Two (2002)");
    let h = harness();

    h.scheduler.trigger_scan(&first);
    h.scheduler.trigger_scan(&second);

    wait_for(|| h.ledger.contains(&first) && h.ledger.contains(&second)).await;
    assert_eq!(h.processor.calls.load(Ordering::SeqCst), 2);
    assert!(!h.processor.overlapped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn unstable_directory_is_rescheduled_without_processing() {
    let drop_root = tempfile::tempdir().unwrap();
    let album = write_album_fixture(drop_root.path(), "Artist - Album (1999)");
    // Quiet window far longer than the max wait, so the stability check
    // always gives up while the writer below keeps the directory churning.
    let h = harness_with(
        Duration::from_millis(60),
        StabilityDetector::new(
            Duration::from_millis(15),
            Duration::from_millis(500),
            Duration::from_millis(90),
        ),
    );

    let writer = {
        let target = album.join("album.wav");
        tokio::spawn(async move {
            let mut size = 16usize;
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                std::fs::write(&target, vec![0u8; size]).unwrap();
                size += 1;
            }
        })
    };

    h.scheduler.trigger_scan(&album);
    // The armed delay fires (the entry leaves the pending map) and the scan
    // gives up on stability, arming a fresh delay.
    wait_for(|| h.scheduler.pending_scans() == 0).await;
    wait_for(|| h.scheduler.pending_scans() == 1).await;
    writer.abort();

    assert_eq!(h.processor.calls.load(Ordering::SeqCst), 0);
    assert!(!h.ledger.contains(&album));
}

#[tokio::test]
async fn startup_sweep_schedules_unprocessed_directories() {
    let drop_root = tempfile::tempdir().unwrap();
    let fresh = write_album_fixture(drop_root.path(), "A - One (2001)");
    let done = write_album_fixture(drop_root.path(), "B - Two (2002)");
    std::fs::write(drop_root.path().join("stray.txt"), b"ignored").unwrap();
    let h = harness();

    h.ledger.mark_processed(&done).await.unwrap();
    h.scheduler.initial_scan(drop_root.path()).await;

    wait_for(|| h.ledger.contains(&fresh)).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.processor.calls.load(Ordering::SeqCst), 1);
}
