use std::collections::{BTreeMap, HashSet, VecDeque};

use folderwatch_core::{FolderMapping, is_within};
use tracing::{debug, info};

use super::collaborators::Collaborators;
use super::engine::EngineError;
use super::queue::EventQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrashOutcome {
    /// A bulk directory removal swallowed the batch and `dropped` queued events.
    Suppressed { dir: String, dropped: usize },
    Removed { count: usize },
}

/// Removes vanished files from their remote collections.
#[derive(Debug, Default)]
pub struct TrashCoordinator {
    trashed_dirs: VecDeque<String>,
}

impl TrashCoordinator {
    pub fn push_trashed_dir(&mut self, dir: impl Into<String>) {
        self.trashed_dirs.push_back(dir.into());
    }

    pub fn has_pending(&self) -> bool {
        !self.trashed_dirs.is_empty()
    }

    /// Forgets pending directory removals; a full reconciliation covers them.
    pub fn clear(&mut self) {
        self.trashed_dirs.clear();
    }

    /// Takes the first pending directory that contains every path of the batch.
    fn take_covering_dir(&mut self, paths: &[String]) -> Option<String> {
        if paths.is_empty() {
            return None;
        }
        let index = self
            .trashed_dirs
            .iter()
            .position(|dir| paths.iter().all(|path| is_within(path, dir)))?;
        self.trashed_dirs.remove(index)
    }

    pub async fn process(
        &mut self,
        paths: &[String],
        mapping: &mut FolderMapping,
        queue: &mut EventQueue,
        collaborators: &Collaborators,
    ) -> Result<TrashOutcome, EngineError> {
        if let Some(dir) = self.take_covering_dir(paths) {
            let dropped = queue.drop_under(&dir);
            info!(dir = %dir, dropped, batch = paths.len(), "suppressed trash events of removed directory");
            return Ok(TrashOutcome::Suppressed { dir, dropped });
        }

        let wanted: HashSet<&str> = paths.iter().map(String::as_str).collect();
        let mut by_collection: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for file in mapping
            .synced_files
            .iter()
            .filter(|file| wanted.contains(file.path.as_str()))
        {
            by_collection
                .entry(file.collection_id)
                .or_default()
                .push(file.uploaded_file_id);
        }

        if by_collection.is_empty() {
            debug!(folder = %mapping.folder_path, batch = paths.len(), "nothing synced to trash");
            return Ok(TrashOutcome::Removed { count: 0 });
        }

        for (collection_id, file_ids) in &by_collection {
            collaborators
                .removal
                .remove_from_collection(*collection_id, file_ids)
                .await?;
            debug!(collection_id, count = file_ids.len(), "removed files from collection");
        }

        let before = mapping.synced_files.len();
        mapping
            .synced_files
            .retain(|file| !wanted.contains(file.path.as_str()));
        let count = before - mapping.synced_files.len();
        collaborators
            .store
            .update_synced_files(&mapping.folder_path, &mapping.synced_files)
            .await?;
        collaborators.notifier.notify_remote_changed();

        info!(folder = %mapping.folder_path, count, collections = by_collection.len(), "trashed files");
        Ok(TrashOutcome::Removed { count })
    }
}
