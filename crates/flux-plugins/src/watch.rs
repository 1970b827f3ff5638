//! Debounced filesystem change notifications.
//!
//! Editors and build tools touch several files in quick succession; reloading
//! once per file would thrash plugins. The [`Debouncer`] collects change
//! notices and emits one de-duplicated batch after a quiet period with no new
//! notices. [`FsWatcher`] feeds it from a `notify` watcher.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::PluginResult;

/// Collects change notices into quiet-period batches.
///
/// Cheap to clone; all clones feed the same batch stream.
#[derive(Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<PathBuf>,
}

impl Debouncer {
    /// Spawns the batching task. Batches arrive on the returned receiver
    /// after `quiet` elapses with no further notices.
    pub fn new(quiet: Duration) -> (Self, mpsc::UnboundedReceiver<Vec<PathBuf>>) {
        let (path_tx, mut path_rx) = mpsc::unbounded_channel::<PathBuf>();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
            loop {
                if pending.is_empty() {
                    match path_rx.recv().await {
                        Some(path) => {
                            pending.insert(path);
                        }
                        None => break,
                    }
                    continue;
                }
                // Every new notice restarts the quiet period.
                match tokio::time::timeout(quiet, path_rx.recv()).await {
                    Ok(Some(path)) => {
                        pending.insert(path);
                    }
                    Ok(None) => {
                        batch_tx.send(pending.into_iter().collect()).ok();
                        break;
                    }
                    Err(_) => {
                        let batch: Vec<_> = std::mem::take(&mut pending).into_iter().collect();
                        debug!(count = batch.len(), "Flushing change batch");
                        if batch_tx.send(batch).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        (Self { tx: path_tx }, batch_rx)
    }

    /// Records one changed path. Callable from any thread.
    pub fn notice(&self, path: PathBuf) {
        self.tx.send(path).ok();
    }
}

/// Watches plugin roots and forwards relevant changes to a [`Debouncer`].
///
/// Dropping the watcher stops it.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    pub fn start(roots: &[PathBuf], debouncer: Debouncer) -> PluginResult<Self> {
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        for path in event.paths {
                            trace!(path = %path.display(), "Filesystem change");
                            debouncer.notice(path);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Filesystem watch error"),
            })?;

        for root in roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            debug!(root = %root.display(), "Watching plugin root");
        }
        Ok(Self { _watcher: watcher })
    }
}
