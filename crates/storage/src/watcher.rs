//! File watching for stores shared between processes.
//!
//! Uses the `notify` crate to watch the record directories of a JSON store and
//! republishes writes made by *other* clients on the store's [`ChangeFeed`].
//! Writes this store made itself are already published when they happen, so
//! a file whose contents match this store's last write is skipped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::{ChangeEvent, ChangeFeed, ChangeKind, Result, Table};

/// Last contents this store wrote, by path.
pub(crate) type OwnWrites = Arc<Mutex<HashMap<PathBuf, String>>>;

/// Keeps the watcher task alive; dropping it stops watching.
pub(crate) struct WatcherHandle {
    _stop: mpsc::Sender<()>,
}

/// Which table a record file belongs to, if any.
fn table_for(path: &Path) -> Option<Table> {
    if path.extension().and_then(|s| s.to_str()) != Some("json") {
        return None;
    }
    match path.parent()?.file_name()?.to_str()? {
        "users" => Some(Table::Users),
        "selections" => Some(Table::Selections),
        _ => None,
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Insert),
        EventKind::Modify(_) => Some(ChangeKind::Update),
        _ => None,
    }
}

/// Start watching `root`'s record directories.
pub(crate) fn spawn(root: &Path, feed: ChangeFeed, own_writes: OwnWrites) -> Result<WatcherHandle> {
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let mut watcher = RecommendedWatcher::new(
        move |result: std::result::Result<Event, notify::Error>| {
            let _ = event_tx.blocking_send(result);
        },
        Config::default(),
    )?;
    watcher.watch(&root.join("users"), RecursiveMode::NonRecursive)?;
    watcher.watch(&root.join("selections"), RecursiveMode::NonRecursive)?;

    tokio::spawn(async move {
        // Keep watcher alive by moving it into this task
        let _watcher = watcher;

        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                result = event_rx.recv() => match result {
                    Some(Ok(event)) => {
                        let Some(kind) = change_kind(&event.kind) else {
                            continue;
                        };
                        for path in &event.paths {
                            if let Some(change) = foreign_change(path, kind, &own_writes).await {
                                feed.publish(change);
                            }
                        }
                    }
                    Some(Err(e)) => warn!("File watcher error: {}", e),
                    None => break,
                },
            }
        }
        debug!("File watcher stopped");
    });

    Ok(WatcherHandle { _stop: stop_tx })
}

/// The change a file event represents, unless this store wrote it.
async fn foreign_change(path: &Path, kind: ChangeKind, own_writes: &OwnWrites) -> Option<ChangeEvent> {
    let table = table_for(path)?;
    let contents = fs::read_to_string(path).await.ok()?;

    if own_writes.lock().await.get(path) == Some(&contents) {
        return None;
    }

    let id = serde_json::from_str::<serde_json::Value>(&contents)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string));
    debug!("External change to {}", path.display());

    Some(ChangeEvent { table, kind, id })
}
