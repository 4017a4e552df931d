//! Hand-written collaborator fakes shared by the sync test suites.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use folderwatch_core::{FolderMapping, LocalFile, SyncedFile, UploadStrategy};

use super::collaborators::{
    CollaboratorError, DiskFs, FolderPicker, RemoteNotifier, RemovalPipeline, UploadPipeline,
    WatchRegistrar,
};
use super::mapping_store::{MappingStore, StoreError};

#[derive(Default)]
pub struct FakeDisk {
    dirs: Mutex<BTreeMap<String, Option<Vec<String>>>>,
}

impl FakeDisk {
    pub fn set_dir(&self, path: &str, files: &[&str]) {
        let files = files.iter().map(|f| f.to_string()).collect();
        self.dirs
            .lock()
            .unwrap()
            .insert(path.to_string(), Some(files));
    }

    pub fn set_unlistable_dir(&self, path: &str) {
        self.dirs.lock().unwrap().insert(path.to_string(), None);
    }

    pub fn remove_dir(&self, path: &str) {
        self.dirs.lock().unwrap().remove(path);
    }
}

#[async_trait]
impl DiskFs for FakeDisk {
    async fn is_directory(&self, path: &str) -> bool {
        self.dirs.lock().unwrap().contains_key(path)
    }

    async fn list_files(&self, path: &str) -> Result<Vec<String>, CollaboratorError> {
        match self.dirs.lock().unwrap().get(path) {
            Some(Some(files)) => Ok(files.clone()),
            Some(None) => Err(CollaboratorError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "permission denied",
            ))),
            None => Err(CollaboratorError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such directory",
            ))),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    mappings: Mutex<Vec<FolderMapping>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn with_mappings(mappings: Vec<FolderMapping>) -> Self {
        Self {
            mappings: Mutex::new(mappings),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self, folder_path: &str) -> Option<FolderMapping> {
        self.mappings
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.folder_path == folder_path)
            .cloned()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }

    fn with_mapping<F>(&self, folder_path: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut FolderMapping),
    {
        self.check_writable()?;
        let mut mappings = self.mappings.lock().unwrap();
        let mapping = mappings
            .iter_mut()
            .find(|m| m.folder_path == folder_path)
            .ok_or_else(|| StoreError::MappingNotFound(folder_path.to_string()))?;
        f(mapping);
        Ok(())
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn list_mappings(&self) -> Result<Vec<FolderMapping>, StoreError> {
        Ok(self.mappings.lock().unwrap().clone())
    }

    async fn add_mapping(
        &self,
        root_folder_name: &str,
        folder_path: &str,
        strategy: UploadStrategy,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut mappings = self.mappings.lock().unwrap();
        if mappings.iter().any(|m| m.folder_path == folder_path) {
            return Err(StoreError::DuplicateMapping(folder_path.to_string()));
        }
        mappings.push(FolderMapping::new(root_folder_name, folder_path, strategy));
        Ok(())
    }

    async fn remove_mapping(&self, folder_path: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut mappings = self.mappings.lock().unwrap();
        let before = mappings.len();
        mappings.retain(|m| m.folder_path != folder_path);
        if mappings.len() == before {
            return Err(StoreError::MappingNotFound(folder_path.to_string()));
        }
        Ok(())
    }

    async fn update_synced_files(
        &self,
        folder_path: &str,
        files: &[SyncedFile],
    ) -> Result<(), StoreError> {
        self.with_mapping(folder_path, |m| m.synced_files = files.to_vec())
    }

    async fn update_ignored_files(
        &self,
        folder_path: &str,
        files: &[String],
    ) -> Result<(), StoreError> {
        self.with_mapping(folder_path, |m| m.ignored_files = files.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedUpload {
    pub collection_name: String,
    pub paths: Vec<String>,
}

#[derive(Default)]
pub struct RecordingUploads {
    started: Mutex<Vec<StartedUpload>>,
    cancels: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingUploads {
    pub fn started(&self) -> Vec<StartedUpload> {
        self.started.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl UploadPipeline for RecordingUploads {
    async fn start_upload(
        &self,
        collection_name: &str,
        files: &[LocalFile],
    ) -> Result<(), CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Remote("pipeline unavailable".into()));
        }
        self.started.lock().unwrap().push(StartedUpload {
            collection_name: collection_name.to_string(),
            paths: files.iter().map(|f| f.path.clone()).collect(),
        });
        Ok(())
    }

    async fn cancel_running_upload(&self) -> Result<(), CollaboratorError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingRemoval {
    calls: Mutex<Vec<(i64, Vec<i64>)>>,
    fail: AtomicBool,
}

impl RecordingRemoval {
    pub fn calls(&self) -> Vec<(i64, Vec<i64>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemovalPipeline for RecordingRemoval {
    async fn remove_from_collection(
        &self,
        collection_id: i64,
        file_ids: &[i64],
    ) -> Result<(), CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Remote("collection is gone".into()));
        }
        self.calls
            .lock()
            .unwrap()
            .push((collection_id, file_ids.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingNotifier {
    remote_changed: AtomicUsize,
    running: Mutex<Vec<bool>>,
}

impl CountingNotifier {
    pub fn remote_changed(&self) -> usize {
        self.remote_changed.load(Ordering::SeqCst)
    }

    pub fn running_transitions(&self) -> Vec<bool> {
        self.running.lock().unwrap().clone()
    }
}

impl RemoteNotifier for CountingNotifier {
    fn notify_remote_changed(&self) {
        self.remote_changed.fetch_add(1, Ordering::SeqCst);
    }

    fn running_changed(&self, running: bool) {
        self.running.lock().unwrap().push(running);
    }
}

#[derive(Default)]
pub struct FakeRegistrar {
    watched: Mutex<HashSet<String>>,
}

impl FakeRegistrar {
    pub fn is_watching(&self, folder_path: &str) -> bool {
        self.watched.lock().unwrap().contains(folder_path)
    }
}

impl WatchRegistrar for FakeRegistrar {
    fn watch(&self, folder_path: &str) -> Result<(), CollaboratorError> {
        self.watched.lock().unwrap().insert(folder_path.to_string());
        Ok(())
    }

    fn unwatch(&self, folder_path: &str) -> Result<(), CollaboratorError> {
        self.watched.lock().unwrap().remove(folder_path);
        Ok(())
    }
}

/// Answers every dialog with the same selection.
pub struct FakePicker {
    pub selection: Option<String>,
}

#[async_trait]
impl FolderPicker for FakePicker {
    async fn select_directory(&self) -> Result<Option<String>, CollaboratorError> {
        Ok(self.selection.clone())
    }
}
