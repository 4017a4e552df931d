use std::collections::VecDeque;

use folderwatch_core::{LocalFile, is_within};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Upload,
    Trash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    Upload { files: Vec<LocalFile> },
    /// Paths keep insertion order but never repeat.
    Trash { paths: Vec<String> },
}

/// A pending intent for one watched folder and one target collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub folder_path: String,
    pub collection_name: String,
    pub action: WatchAction,
}

impl WatchEvent {
    pub fn upload(
        folder_path: impl Into<String>,
        collection_name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            folder_path: folder_path.into(),
            collection_name: collection_name.into(),
            action: WatchAction::Upload {
                files: vec![LocalFile::new(path)],
            },
        }
    }

    pub fn trash(
        folder_path: impl Into<String>,
        collection_name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            folder_path: folder_path.into(),
            collection_name: collection_name.into(),
            action: WatchAction::Trash {
                paths: vec![path.into()],
            },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.action {
            WatchAction::Upload { .. } => EventKind::Upload,
            WatchAction::Trash { .. } => EventKind::Trash,
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        match &self.action {
            WatchAction::Upload { files } => files.iter().map(|f| f.path.as_str()).collect(),
            WatchAction::Trash { paths } => paths.iter().map(String::as_str).collect(),
        }
    }

    pub fn path_count(&self) -> usize {
        match &self.action {
            WatchAction::Upload { files } => files.len(),
            WatchAction::Trash { paths } => paths.len(),
        }
    }

    fn can_merge(&self, other: &WatchEvent) -> bool {
        self.kind() == other.kind()
            && self.collection_name == other.collection_name
            && self.folder_path == other.folder_path
    }

    fn merge(&mut self, other: WatchEvent) {
        match (&mut self.action, other.action) {
            (WatchAction::Upload { files }, WatchAction::Upload { files: more }) => {
                files.extend(more);
            }
            (WatchAction::Trash { paths }, WatchAction::Trash { paths: more }) => {
                for path in more {
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("event queue is empty")]
    Empty,
}

#[derive(Debug, Default)]
pub struct EventQueue {
    inner: VecDeque<WatchEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: WatchEvent) {
        self.inner.push_back(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = WatchEvent>) {
        self.inner.extend(events);
    }

    /// Pops the head and folds every directly following event with the same
    /// kind, collection and folder into it.
    pub fn pop_coalesced(&mut self) -> Result<WatchEvent, QueueError> {
        let mut event = self.inner.pop_front().ok_or(QueueError::Empty)?;
        while self
            .inner
            .front()
            .is_some_and(|next| event.can_merge(next))
        {
            if let Some(next) = self.inner.pop_front() {
                event.merge(next);
            }
        }
        Ok(event)
    }

    /// Removes every queued event touching a path inside `dir`.
    pub fn drop_under(&mut self, dir: &str) -> usize {
        let before = self.inner.len();
        self.inner
            .retain(|event| event.paths().iter().all(|path| !is_within(path, dir)));
        before - self.inner.len()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchEvent> {
        self.inner.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_adjacent_same_collection_events() {
        let mut queue = EventQueue::default();
        queue.push(WatchEvent::upload("/w", "ColA", "/w/ColA/f1"));
        queue.push(WatchEvent::upload("/w", "ColA", "/w/ColA/f2"));
        queue.push(WatchEvent::trash("/w", "ColA", "/w/ColA/p1"));

        let first = queue.pop_coalesced().unwrap();
        assert_eq!(first.kind(), EventKind::Upload);
        assert_eq!(first.paths(), vec!["/w/ColA/f1", "/w/ColA/f2"]);

        let second = queue.pop_coalesced().unwrap();
        assert_eq!(second.kind(), EventKind::Trash);
        assert_eq!(second.paths(), vec!["/w/ColA/p1"]);

        assert!(queue.is_empty());
        assert!(matches!(queue.pop_coalesced(), Err(QueueError::Empty)));
    }

    #[test]
    fn does_not_merge_across_collections_or_gaps() {
        let mut queue = EventQueue::default();
        queue.push(WatchEvent::upload("/w", "A", "/w/A/1"));
        queue.push(WatchEvent::upload("/w", "B", "/w/B/2"));
        queue.push(WatchEvent::upload("/w", "A", "/w/A/3"));

        assert_eq!(queue.pop_coalesced().unwrap().paths(), vec!["/w/A/1"]);
        assert_eq!(queue.pop_coalesced().unwrap().paths(), vec!["/w/B/2"]);
        assert_eq!(queue.pop_coalesced().unwrap().paths(), vec!["/w/A/3"]);
    }

    #[test]
    fn does_not_merge_same_collection_name_from_different_folders() {
        let mut queue = EventQueue::default();
        queue.push(WatchEvent::upload("/a", "Photos", "/a/Photos/1"));
        queue.push(WatchEvent::upload("/b", "Photos", "/b/Photos/2"));

        assert_eq!(queue.pop_coalesced().unwrap().folder_path, "/a");
        assert_eq!(queue.pop_coalesced().unwrap().folder_path, "/b");
    }

    #[test]
    fn merged_trash_paths_stay_unique() {
        let mut queue = EventQueue::default();
        queue.push(WatchEvent::trash("/w", "A", "/w/A/1"));
        queue.push(WatchEvent::trash("/w", "A", "/w/A/1"));
        queue.push(WatchEvent::trash("/w", "A", "/w/A/2"));

        let event = queue.pop_coalesced().unwrap();
        assert_eq!(event.paths(), vec!["/w/A/1", "/w/A/2"]);
    }

    #[test]
    fn drop_under_removes_events_inside_directory() {
        let mut queue = EventQueue::default();
        queue.push(WatchEvent::trash("/root/Trip", "Trip", "/root/Trip/a.jpg"));
        queue.push(WatchEvent::trash("/root/Trip2", "Trip2", "/root/Trip2/b.jpg"));
        queue.push(WatchEvent::upload("/root/Trip", "Trip", "/root/Trip/c.jpg"));

        assert_eq!(queue.drop_under("/root/Trip"), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.iter().next().unwrap().paths(),
            vec!["/root/Trip2/b.jpg"]
        );
    }
}
