//! Filesystem change source for the drop root.
//!
//! Watches the root recursively and maps every interesting event to the
//! immediate child directory it belongs to, which is the unit the scheduler
//! debounces on. Files sitting directly in the root are noise and ignored.

use std::path::{Component, Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::scheduler::ScanScheduler;

/// Live watcher on the drop root. Dropping this stops event delivery.
pub struct DropWatcher {
    _watcher: RecommendedWatcher,
    _consumer: tokio::task::JoinHandle<()>,
}

impl DropWatcher {
    /// Start watching `root` and forward every mapped trigger to `scheduler`.
    pub fn spawn(root: &Path, scheduler: ScanScheduler) -> Result<Self, notify::Error> {
        let root = root.to_path_buf();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    // Watcher callbacks run on notify's thread; hand the
                    // event to the async consumer.
                    let _ = event_tx.send(event);
                }
                Err(e) => error!("watcher error: {}", e),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!("watching drop root {}", root.display());

        let consumer = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    continue;
                }
                for path in &event.paths {
                    match album_dir_for_event(&root, path) {
                        Some(album_dir) => {
                            debug!(
                                "change at {} maps to album candidate {}",
                                path.display(),
                                album_dir.display()
                            );
                            scheduler.trigger_scan(&album_dir);
                        }
                        None => debug!("ignoring event at {}", path.display()),
                    }
                }
            }
        });

        Ok(DropWatcher {
            _watcher: watcher,
            _consumer: consumer,
        })
    }
}

/// Map an event path to the immediate child of `root` it belongs to, or
/// `None` when the event is not attributable to an album candidate: the
/// root itself, paths outside the root, and plain files sitting directly in
/// the root.
fn album_dir_for_event(root: &Path, path: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    let first = match relative.components().next()? {
        Component::Normal(name) => name,
        _ => return None,
    };
    let child = root.join(first);
    // Depth-one events: only directories (or something just removed) count.
    if child == *path && child.exists() && !child.is_dir() {
        return None;
    }
    Some(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_nested_paths_to_immediate_child() {
        let root = Path::new("/drop");
        assert_eq!(
            album_dir_for_event(root, Path::new("/drop/Album A/disc1.cue")),
            Some(PathBuf::from("/drop/Album A"))
        );
        assert_eq!(
            album_dir_for_event(root, Path::new("/drop/Album A/sub/part.wav")),
            Some(PathBuf::from("/drop/Album A"))
        );
    }

    #[test]
    fn ignores_root_and_outside_paths() {
        let root = Path::new("/drop");
        assert_eq!(album_dir_for_event(root, Path::new("/drop")), None);
        assert_eq!(album_dir_for_event(root, Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn new_child_directory_triggers_itself() {
        let tmp = tempfile::tempdir().unwrap();
        let album = tmp.path().join("Album B");
        std::fs::create_dir(&album).unwrap();
        assert_eq!(album_dir_for_event(tmp.path(), &album), Some(album));
    }

    #[test]
    fn plain_file_in_root_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let stray = tmp.path().join("stray.txt");
        std::fs::write(&stray, b"x").unwrap();
        assert_eq!(album_dir_for_event(tmp.path(), &stray), None);
    }

    #[test]
    fn vanished_child_still_maps() {
        let tmp = tempfile::tempdir().unwrap();
        let gone = tmp.path().join("Removed Album");
        assert_eq!(album_dir_for_event(tmp.path(), &gone), Some(gone));
    }
}
