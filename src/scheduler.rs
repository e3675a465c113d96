//! Scan scheduling: debounce, stability gating, and the single scan slot.
//!
//! Every external trigger (live filesystem event or startup sweep) goes
//! through [`ScanScheduler::trigger_scan`], which coalesces bursts per
//! directory into one delayed scan. When the delay fires the scan takes a
//! global slot so that at most one album is stabilized, assembled, and
//! handed downstream at a time; the downstream transcoder is resource-heavy
//! and must not overlap across albums.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::assembler::AlbumAssembler;
use crate::ledger::ProcessedLedger;
use crate::metadata::MetadataFetcher;
use crate::processor::AlbumProcessor;
use crate::stability::{Stability, StabilityDetector};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long after the last trigger a directory's scan fires.
    pub debounce_delay: Duration,
    /// Music library root handed to the downstream processor.
    pub output_root: PathBuf,
}

/// One armed debounce delay. The epoch lets a firing task tell its own
/// entry apart from a replacement.
struct PendingDelay {
    /// Held only for its drop effect: replacing the entry wakes the old
    /// delay task out of its sleep.
    _cancel: oneshot::Sender<()>,
    epoch: u64,
}

struct SchedulerInner {
    config: SchedulerConfig,
    detector: StabilityDetector,
    assembler: AlbumAssembler,
    ledger: Arc<dyn ProcessedLedger>,
    fetcher: Arc<dyn MetadataFetcher>,
    processor: Arc<dyn AlbumProcessor>,
    /// Pending map, locked only to inspect or replace a delay. Never held
    /// across the stability wait or the album build.
    pending: StdMutex<HashMap<PathBuf, PendingDelay>>,
    /// The single scan slot: held for stability wait + ledger check +
    /// assembly + downstream handoff.
    scan_slot: tokio::sync::Mutex<()>,
    epochs: AtomicU64,
}

#[derive(Clone)]
pub struct ScanScheduler {
    inner: Arc<SchedulerInner>,
}

impl ScanScheduler {
    pub fn new(
        config: SchedulerConfig,
        detector: StabilityDetector,
        assembler: AlbumAssembler,
        ledger: Arc<dyn ProcessedLedger>,
        fetcher: Arc<dyn MetadataFetcher>,
        processor: Arc<dyn AlbumProcessor>,
    ) -> Self {
        ScanScheduler {
            inner: Arc::new(SchedulerInner {
                config,
                detector,
                assembler,
                ledger,
                fetcher,
                processor,
                pending: StdMutex::new(HashMap::new()),
                scan_slot: tokio::sync::Mutex::new(()),
                epochs: AtomicU64::new(0),
            }),
        }
    }

    /// Schedule (or re-arm) a delayed scan of `dir`.
    ///
    /// Safe to call concurrently from the watcher and the startup sweep.
    /// Re-arming cancels the previous delay outright, so any burst of
    /// triggers collapses into a single scan.
    pub fn trigger_scan(&self, dir: &Path) {
        let dir = dir.to_path_buf();
        let delay = self.inner.config.debounce_delay;
        let epoch = self.inner.epochs.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        {
            let mut pending = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Replacing an entry drops the old sender, which wakes and ends
            // the old delay task.
            pending.insert(
                dir.clone(),
                PendingDelay {
                    _cancel: cancel_tx,
                    epoch,
                },
            );
        }
        debug!("scheduled scan of {} in {:?}", dir.display(), delay);

        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel_rx => return,
            }
            // Leave the pending set before scanning: a trigger arriving
            // while the scan runs must be able to arm a follow-up pass.
            {
                let mut pending = scheduler
                    .inner
                    .pending
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                match pending.get(&dir) {
                    Some(entry) if entry.epoch == epoch => {
                        pending.remove(&dir);
                    }
                    // Re-armed in the firing window; the replacement owns
                    // the entry now.
                    _ => {}
                }
            }
            scheduler.perform_scan(&dir).await;
        });
    }

    /// Enumerate immediate subdirectories of the drop root once at startup
    /// and schedule every unprocessed one through the normal debounce path.
    pub async fn initial_scan(&self, root: &Path) {
        info!("startup sweep of {} for unprocessed albums", root.display());
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                error!("could not read drop root {}: {}", root.display(), e);
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let processed = match self.inner.ledger.is_processed(&path).await {
                Ok(processed) => processed,
                Err(e) => {
                    warn!("ledger check failed for {}: {}", path.display(), e);
                    false
                }
            };
            if processed {
                debug!("{} already processed, skipping", path.display());
            } else {
                info!("found unprocessed album directory {}", path.display());
                self.trigger_scan(&path);
            }
        }
        info!("startup sweep completed");
    }

    /// Number of directories currently awaiting their debounce delay.
    pub fn pending_scans(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    async fn perform_scan(&self, dir: &Path) {
        let inner = &self.inner;
        let _slot = inner.scan_slot.lock().await;
        info!("performing full scan of {}", dir.display());

        if inner.detector.wait_for_stability(dir).await == Stability::Unstable {
            info!(
                "files in {} are still changing, rescheduling scan",
                dir.display()
            );
            self.trigger_scan(dir);
            return;
        }

        // Checked only after stability: a half-written directory may carry a
        // stale ledger entry from an earlier failed drop.
        match inner.ledger.is_processed(dir).await {
            Ok(true) => {
                info!("{} already processed, skipping", dir.display());
                return;
            }
            Ok(false) => {}
            Err(e) => warn!(
                "ledger check failed for {}: {}; attempting processing anyway",
                dir.display(),
                e
            ),
        }

        let mut album = match inner.assembler.scan_album_directory(dir) {
            Ok(album) => album,
            Err(e) => {
                error!("error scanning album directory {}: {}", dir.display(), e);
                return;
            }
        };
        if album.discs.is_empty() {
            info!(
                "no album data found in {}, not marking as processed",
                dir.display()
            );
            return;
        }
        info!(
            "album '{} - {}' ({}) found with {} disc(s), processing",
            album.artist,
            album.title,
            album.year,
            album.discs.len()
        );

        for disc in &mut album.discs {
            for track in &mut disc.tracks {
                inner.fetcher.enrich(track).await;
            }
        }

        match inner
            .processor
            .process(&album, &inner.config.output_root)
            .await
        {
            Ok(()) => {
                if let Err(e) = inner.ledger.mark_processed(dir).await {
                    error!(
                        "processed {} but failed to record it in the ledger: {}",
                        dir.display(),
                        e
                    );
                } else {
                    info!(
                        "successfully processed album '{} - {}'",
                        album.artist, album.title
                    );
                }
            }
            // Left unmarked: a future trigger or the next startup sweep
            // retries it.
            Err(e) => error!(
                "error processing album '{} - {}': {}",
                album.artist, album.title, e
            ),
        }
    }
}
