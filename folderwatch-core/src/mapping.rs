use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::parent_directory_name;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectionNameError {
    #[error("unexpected file path without a parent folder: {0}")]
    NoParent(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown upload strategy: {0}")]
pub struct InvalidStrategy(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// Every directory becomes its own collection, named after the directory.
    CollectionPerFolder,
    /// Everything under the watched root lands in one collection named after the root.
    SingleCollection,
}

impl UploadStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStrategy::CollectionPerFolder => "collection_per_folder",
            UploadStrategy::SingleCollection => "single_collection",
        }
    }

    pub fn parse(value: &str) -> Result<Self, InvalidStrategy> {
        match value {
            "collection_per_folder" => Ok(UploadStrategy::CollectionPerFolder),
            "single_collection" => Ok(UploadStrategy::SingleCollection),
            other => Err(InvalidStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedFile {
    pub path: String,
    pub uploaded_file_id: i64,
    pub collection_id: i64,
}

/// Persistent record of one watched folder.
///
/// A path is tracked by at most one of `synced_files` and `ignored_files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderMapping {
    pub root_folder_name: String,
    pub folder_path: String,
    pub upload_strategy: UploadStrategy,
    pub synced_files: Vec<SyncedFile>,
    pub ignored_files: Vec<String>,
}

impl FolderMapping {
    pub fn new(
        root_folder_name: impl Into<String>,
        folder_path: impl Into<String>,
        upload_strategy: UploadStrategy,
    ) -> Self {
        Self {
            root_folder_name: root_folder_name.into(),
            folder_path: folder_path.into(),
            upload_strategy,
            synced_files: Vec::new(),
            ignored_files: Vec::new(),
        }
    }

    pub fn is_synced(&self, path: &str) -> bool {
        self.synced_files.iter().any(|file| file.path == path)
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignored_files.iter().any(|ignored| ignored == path)
    }

    pub fn is_synced_or_ignored(&self, path: &str) -> bool {
        self.is_ignored(path) || self.is_synced(path)
    }

    pub fn collection_name_for(&self, path: &str) -> Result<String, CollectionNameError> {
        collection_name_for(self, path)
    }
}

pub fn collection_name_for(
    mapping: &FolderMapping,
    path: &str,
) -> Result<String, CollectionNameError> {
    match mapping.upload_strategy {
        UploadStrategy::CollectionPerFolder => parent_directory_name(path)
            .map(str::to_string)
            .ok_or_else(|| CollectionNameError::NoParent(path.to_string())),
        UploadStrategy::SingleCollection => Ok(mapping.root_folder_name.clone()),
    }
}
