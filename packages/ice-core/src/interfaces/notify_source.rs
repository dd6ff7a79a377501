//! Filesystem-backed `ChangeSource` adapter (spec.md §6), built on the `notify` crate.
//! Runs notify's blocking watcher on its own thread and forwards events through an
//! unbounded `tokio::sync::mpsc` channel into async land.

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::types::{ChangeEvent, ChangeKind, FilePath};

use super::traits::ChangeSource;

pub struct NotifyChangeSource {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl NotifyChangeSource {
    pub fn watch(root: &FilePath) -> notify::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let Ok(event) = event else { return };
            let Some(kind) = classify(&event.kind) else {
                return;
            };
            for path in event.paths {
                let _ = tx.send(ChangeEvent::new(kind, FilePath::new(path)));
            }
        })?;

        watcher.watch(root.as_path(), RecursiveMode::Recursive)?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

#[async_trait]
impl ChangeSource for NotifyChangeSource {
    async fn next_change(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }
}
