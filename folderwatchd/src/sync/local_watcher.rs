use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::collaborators::{CollaboratorError, WatchRegistrar};
use super::engine::LiveEvent;

/// OS-level notification source; one recursive watch per mapped folder.
pub struct LiveWatcher {
    inner: Mutex<WatcherState>,
}

struct WatcherState {
    watcher: RecommendedWatcher,
    watched: HashSet<String>,
}

impl LiveWatcher {
    pub fn start() -> notify::Result<(Self, mpsc::UnboundedReceiver<LiveEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for live in map_event(event) {
                    let _ = tx.send(live);
                }
            }
            Err(err) => warn!(error = %err, "file watcher error"),
        })?;
        Ok((
            Self {
                inner: Mutex::new(WatcherState {
                    watcher,
                    watched: HashSet::new(),
                }),
            },
            rx,
        ))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, WatcherState>, CollaboratorError> {
        self.inner
            .lock()
            .map_err(|_| CollaboratorError::Watcher("watcher state poisoned".into()))
    }
}

impl WatchRegistrar for LiveWatcher {
    fn watch(&self, folder_path: &str) -> Result<(), CollaboratorError> {
        let mut state = self.lock()?;
        if state.watched.contains(folder_path) {
            return Ok(());
        }
        state
            .watcher
            .watch(Path::new(folder_path), RecursiveMode::Recursive)
            .map_err(|err| CollaboratorError::Watcher(err.to_string()))?;
        state.watched.insert(folder_path.to_string());
        debug!(folder = %folder_path, "live watch registered");
        Ok(())
    }

    fn unwatch(&self, folder_path: &str) -> Result<(), CollaboratorError> {
        let mut state = self.lock()?;
        if !state.watched.remove(folder_path) {
            return Ok(());
        }
        state
            .watcher
            .unwatch(Path::new(folder_path))
            .map_err(|err| CollaboratorError::Watcher(err.to_string()))
    }
}

fn map_event(event: Event) -> Vec<LiveEvent> {
    let mut out = Vec::new();
    match event.kind {
        EventKind::Create(CreateKind::Folder) => {
            for path in &event.paths {
                added_under(path, &mut out);
            }
        }
        EventKind::Create(_) => {
            for path in &event.paths {
                if path.is_dir() {
                    added_under(path, &mut out);
                } else {
                    push_path(path, LiveEvent::FileAdded, &mut out);
                }
            }
        }
        EventKind::Remove(RemoveKind::Folder) => {
            for path in &event.paths {
                push_path(path, LiveEvent::FolderRemoved, &mut out);
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                push_path(path, LiveEvent::FileRemoved, &mut out);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in &event.paths {
                push_path(path, LiveEvent::FileRemoved, &mut out);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in &event.paths {
                added_under(path, &mut out);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            push_path(&event.paths[0], LiveEvent::FileRemoved, &mut out);
            added_under(&event.paths[1], &mut out);
        }
        _ => {}
    }
    out
}

/// A file yields itself; a directory yields every file below it.
fn added_under(path: &Path, out: &mut Vec<LiveEvent>) {
    if !path.is_dir() {
        push_path(path, LiveEvent::FileAdded, out);
        return;
    }
    for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file() {
            push_path(entry.path(), LiveEvent::FileAdded, out);
        }
    }
}

fn push_path(path: &Path, build: fn(String) -> LiveEvent, out: &mut Vec<LiveEvent>) {
    match path.to_str() {
        Some(path) => out.push(build(path.to_string())),
        None => debug!(path = %path.display(), "ignoring non UTF-8 path"),
    }
}
