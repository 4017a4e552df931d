use std::sync::Arc;

use async_trait::async_trait;
use folderwatch_core::LocalFile;
use thiserror::Error;

use super::mapping_store::MappingStore;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote call failed: {0}")]
    Remote(String),
    #[error("watcher error: {0}")]
    Watcher(String),
}

#[async_trait]
pub trait DiskFs: Send + Sync {
    async fn is_directory(&self, path: &str) -> bool;

    /// Every regular file below `path`, recursively, as absolute paths.
    async fn list_files(&self, path: &str) -> Result<Vec<String>, CollaboratorError>;
}

#[async_trait]
pub trait UploadPipeline: Send + Sync {
    /// Hands a batch over; per-file results arrive later through the engine handle.
    async fn start_upload(
        &self,
        collection_name: &str,
        files: &[LocalFile],
    ) -> Result<(), CollaboratorError>;

    async fn cancel_running_upload(&self) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait RemovalPipeline: Send + Sync {
    async fn remove_from_collection(
        &self,
        collection_id: i64,
        file_ids: &[i64],
    ) -> Result<(), CollaboratorError>;
}

pub trait RemoteNotifier: Send + Sync {
    fn notify_remote_changed(&self);

    fn running_changed(&self, _running: bool) {}
}

/// Registers watched folders with the OS-level notification source.
pub trait WatchRegistrar: Send + Sync {
    fn watch(&self, folder_path: &str) -> Result<(), CollaboratorError>;

    fn unwatch(&self, folder_path: &str) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait FolderPicker: Send + Sync {
    /// `None` when the user dismissed the dialog.
    async fn select_directory(&self) -> Result<Option<String>, CollaboratorError>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub disk: Arc<dyn DiskFs>,
    pub store: Arc<dyn MappingStore>,
    pub uploads: Arc<dyn UploadPipeline>,
    pub removal: Arc<dyn RemovalPipeline>,
    pub notifier: Arc<dyn RemoteNotifier>,
    pub registrar: Arc<dyn WatchRegistrar>,
}
