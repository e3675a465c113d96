//! File-stability gating.
//!
//! Rips arrive over slow copies and multi-part downloads; the detector polls
//! a directory's relevant files and only declares it stable once every file
//! has kept the same (size, mtime) pair for a full quiet window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Extensions (plus `info.txt`) whose changes keep a directory unstable.
/// An explicit allow-list: anything else may churn freely.
const AUDIO_EXTENSIONS: &[&str] = &["wav", "flac", "mp3", "m4a", "aac", "ogg", "ape", "wv"];
const SIDECAR_EXTENSIONS: &[&str] = &["cue", "json", "jpg", "png"];
const DESCRIPTOR_NAME: &str = "info.txt";

/// Verdict of one stability wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    Unstable,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct FileSample {
    size: u64,
    modified: Option<SystemTime>,
}

/// Polls a directory until its relevant files stop changing.
#[derive(Debug, Clone, Copy)]
pub struct StabilityDetector {
    /// Pause between polls.
    pub poll_interval: Duration,
    /// How long a file must keep the same (size, mtime) to count as quiet.
    pub quiet_duration: Duration,
    /// Ceiling on one whole wait; exceeding it yields [`Stability::Unstable`].
    pub max_wait: Duration,
}

impl StabilityDetector {
    pub fn new(poll_interval: Duration, quiet_duration: Duration, max_wait: Duration) -> Self {
        StabilityDetector {
            poll_interval,
            quiet_duration,
            max_wait,
        }
    }

    /// Wait until every relevant file in `dir` has been quiet for the
    /// configured window, or the max wait elapses.
    pub async fn wait_for_stability(&self, dir: &Path) -> Stability {
        info!(
            "waiting for files in {} to stay quiet for {:?}",
            dir.display(),
            self.quiet_duration
        );
        let started = Instant::now();
        let mut previous: HashMap<PathBuf, FileSample> = HashMap::new();
        let mut quiet_since: HashMap<PathBuf, Instant> = HashMap::new();

        loop {
            let now = Instant::now();
            match self.poll_once(dir, now, &mut previous, &mut quiet_since) {
                Some(Stability::Stable) => return Stability::Stable,
                Some(Stability::Unstable) | None => {}
            }
            if started.elapsed() + self.poll_interval > self.max_wait {
                warn!(
                    "max stability wait exceeded for {}, files still changing",
                    dir.display()
                );
                return Stability::Unstable;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One poll cycle. `Some(Stable)` ends the wait; `None` means a listing
    /// error degraded this poll and the loop should simply retry.
    fn poll_once(
        &self,
        dir: &Path,
        now: Instant,
        previous: &mut HashMap<PathBuf, FileSample>,
        quiet_since: &mut HashMap<PathBuf, Instant>,
    ) -> Option<Stability> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            // The directory itself is gone: there is nothing left to wait
            // for. Report stable and let the scan run into the directory
            // read error, which ends the cycle instead of re-arming it.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("{} vanished while waiting for stability", dir.display());
                return Some(Stability::Stable);
            }
            Err(e) => {
                warn!(
                    "could not list {} for stability check: {}",
                    dir.display(),
                    e
                );
                return None;
            }
        };

        let mut current: HashMap<PathBuf, FileSample> = HashMap::new();
        let mut all_quiet = true;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() || !is_relevant_file(&path) {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(m) => m,
                // Vanished between listing and stat: ignore it.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("could not stat {}: {}", path.display(), e);
                    all_quiet = false;
                    continue;
                }
            };
            let sample = FileSample {
                size: metadata.len(),
                modified: metadata.modified().ok(),
            };

            let changed = previous.get(&path) != Some(&sample);
            if changed {
                // New file, or its (size, mtime) moved: the quiet window
                // restarts now. A first sighting counts as a change so that
                // even an untouched pre-existing file earns one full window.
                quiet_since.insert(path.clone(), now);
                all_quiet = false;
            } else {
                match quiet_since.get(&path) {
                    Some(since) if now.duration_since(*since) >= self.quiet_duration => {}
                    Some(_) => all_quiet = false,
                    None => {
                        quiet_since.insert(path.clone(), now);
                        all_quiet = false;
                    }
                }
            }
            current.insert(path, sample);
        }

        // Deleted files drop out of `current` and stop being consulted.
        *previous = current;

        if previous.is_empty() {
            debug!(
                "no relevant files in {} require a stability check",
                dir.display()
            );
            return Some(Stability::Stable);
        }
        if all_quiet {
            info!(
                "all relevant files in {} stable for at least {:?}",
                dir.display(),
                self.quiet_duration
            );
            return Some(Stability::Stable);
        }
        Some(Stability::Unstable)
    }
}

fn is_relevant_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if name.eq_ignore_ascii_case(DESCRIPTOR_NAME) {
            return true;
        }
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str()) || SIDECAR_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
