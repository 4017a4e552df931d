use std::collections::HashSet;

use folderwatch_core::{FolderMapping, is_hidden_file};
use tracing::{debug, warn};

use super::collaborators::DiskFs;
use super::engine::EngineError;
use super::queue::WatchEvent;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// One single-path event per difference, uploads before removals per mapping.
    pub events: Vec<WatchEvent>,
    /// Mappings whose folder no longer exists on disk.
    pub stale_folders: Vec<String>,
}

/// Diffs the files currently on disk against what each mapping has recorded.
///
/// Pure apart from the disk reads; callers own enqueueing and stale cleanup.
pub async fn deduce_events(
    disk: &dyn DiskFs,
    mappings: &[FolderMapping],
) -> Result<Reconciliation, EngineError> {
    let mut out = Reconciliation::default();

    for mapping in mappings {
        if !disk.is_directory(&mapping.folder_path).await {
            out.stale_folders.push(mapping.folder_path.clone());
            continue;
        }

        let paths: Vec<String> = match disk.list_files(&mapping.folder_path).await {
            Ok(paths) => paths
                .into_iter()
                .filter(|path| !is_hidden_file(path))
                .collect(),
            Err(err) => {
                warn!(folder = %mapping.folder_path, error = %err, "skipping folder, listing failed");
                continue;
            }
        };
        let on_disk: HashSet<&str> = paths.iter().map(String::as_str).collect();

        let before = out.events.len();
        for path in paths.iter().filter(|p| !mapping.is_synced_or_ignored(p)) {
            if let Some(collection_name) = collection_for(mapping, path) {
                out.events
                    .push(WatchEvent::upload(&mapping.folder_path, collection_name, path));
            }
        }
        for synced in mapping
            .synced_files
            .iter()
            .filter(|file| !on_disk.contains(file.path.as_str()))
        {
            if let Some(collection_name) = collection_for(mapping, &synced.path) {
                out.events.push(WatchEvent::trash(
                    &mapping.folder_path,
                    collection_name,
                    &synced.path,
                ));
            }
        }
        debug!(
            folder = %mapping.folder_path,
            on_disk = paths.len(),
            events = out.events.len() - before,
            "reconciled folder"
        );
    }

    Ok(out)
}

/// A path without a usable collection name is skipped, not fatal.
fn collection_for(mapping: &FolderMapping, path: &str) -> Option<String> {
    match mapping.collection_name_for(path) {
        Ok(name) => Some(name),
        Err(err) => {
            warn!(folder = %mapping.folder_path, path, error = %err, "skipping path without collection");
            None
        }
    }
}
