use std::collections::HashSet;
use std::time::Duration;

use folderwatch_core::{
    CollectionNameError, FolderMapping, LocalFile, RemoteFile, UploadItem, UploadOutcome,
    UploadStrategy, is_system_file, mapping_for_path,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::collaborators::{CollaboratorError, Collaborators};
use super::completion::{Classification, UploadTracker};
use super::debounce::{self, DrainTimer};
use super::mapping_store::StoreError;
use super::queue::{EventQueue, QueueError, WatchAction, WatchEvent};
use super::reconciler::{Reconciliation, deduce_events};
use super::trash::{TrashCoordinator, TrashOutcome};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    CollectionName(#[from] CollectionNameError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("no watch mapping for folder: {0}")]
    MissingMapping(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("sync engine is not running")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Dispatching,
    UploadInFlight,
    TrashInFlight,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Dispatching => "dispatching",
            SyncState::UploadInFlight => "upload_in_flight",
            SyncState::TrashInFlight => "trash_in_flight",
        }
    }
}

/// The one upload batch currently owned by the external pipeline.
#[derive(Debug, Clone)]
pub struct InFlightBatch {
    pub folder_path: String,
    pub collection_name: String,
    pub files: Vec<LocalFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub state: SyncState,
    pub paused: bool,
    pub queued: usize,
    pub current_folder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    FileAdded(String),
    FileRemoved(String),
    FolderRemoved(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Queue empty, paused, or a batch is already in flight.
    Skipped,
    /// The batch resolved to no mapping or to no uploadable files.
    Dropped,
    UploadStarted { count: usize },
    Trashed(TrashOutcome),
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

pub enum EngineCommand {
    Live(LiveEvent),
    FileUploaded {
        outcome: UploadOutcome,
        item: UploadItem,
        remote: Option<RemoteFile>,
    },
    UploadsDone {
        collection_name: String,
    },
    AddMapping {
        root_folder_name: String,
        folder_path: String,
        strategy: UploadStrategy,
        reply: Reply<()>,
    },
    RemoveMapping {
        folder_path: String,
        reply: Reply<()>,
    },
    ListMappings {
        reply: Reply<Vec<FolderMapping>>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Resync {
        reply: Reply<()>,
    },
    CancelUpload {
        reply: Reply<bool>,
    },
    IsMappingSyncInProgress {
        folder_path: String,
        reply: Reply<bool>,
    },
    Status {
        reply: Reply<EngineStatus>,
    },
}

/// Cloneable front door to the engine task. Every mutation goes through here.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

pub fn engine_channel() -> (EngineHandle, mpsc::UnboundedReceiver<EngineCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EngineHandle { tx }, rx)
}

impl EngineHandle {
    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.tx.send(command).map_err(|_| EngineError::Closed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply))?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    pub fn live_event(&self, event: LiveEvent) -> Result<(), EngineError> {
        self.send(EngineCommand::Live(event))
    }

    pub fn file_uploaded(
        &self,
        outcome: UploadOutcome,
        item: UploadItem,
        remote: Option<RemoteFile>,
    ) -> Result<(), EngineError> {
        self.send(EngineCommand::FileUploaded {
            outcome,
            item,
            remote,
        })
    }

    pub fn uploads_done(&self, collection_name: impl Into<String>) -> Result<(), EngineError> {
        self.send(EngineCommand::UploadsDone {
            collection_name: collection_name.into(),
        })
    }

    pub async fn add_mapping(
        &self,
        root_folder_name: &str,
        folder_path: &str,
        strategy: UploadStrategy,
    ) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::AddMapping {
            root_folder_name: root_folder_name.to_string(),
            folder_path: folder_path.to_string(),
            strategy,
            reply,
        })
        .await
    }

    pub async fn remove_mapping(&self, folder_path: &str) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::RemoveMapping {
            folder_path: folder_path.to_string(),
            reply,
        })
        .await
    }

    pub async fn list_mappings(&self) -> Result<Vec<FolderMapping>, EngineError> {
        self.request(|reply| EngineCommand::ListMappings { reply })
            .await
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::Resume { reply }).await
    }

    pub async fn resync(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::Resync { reply }).await
    }

    pub async fn cancel_running_upload(&self) -> Result<bool, EngineError> {
        self.request(|reply| EngineCommand::CancelUpload { reply })
            .await
    }

    pub async fn is_mapping_sync_in_progress(&self, folder_path: &str) -> Result<bool, EngineError> {
        self.request(|reply| EngineCommand::IsMappingSyncInProgress {
            folder_path: folder_path.to_string(),
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| EngineCommand::Status { reply }).await
    }
}

pub struct WatchEngine {
    collaborators: Collaborators,
    queue: EventQueue,
    drain: DrainTimer,
    state: SyncState,
    paused: bool,
    in_flight: Option<InFlightBatch>,
    tracker: UploadTracker,
    trash: TrashCoordinator,
}

impl WatchEngine {
    pub fn new(collaborators: Collaborators, drain_delay: Duration) -> Self {
        Self {
            collaborators,
            queue: EventQueue::default(),
            drain: DrainTimer::new(drain_delay),
            state: SyncState::Idle,
            paused: false,
            in_flight: None,
            tracker: UploadTracker::default(),
            trash: TrashCoordinator::default(),
        }
    }

    /// Rebuilds the queue from a full disk reconciliation.
    pub async fn sync_with_disk(&mut self) -> Result<(), EngineError> {
        let mappings = self.collaborators.store.list_mappings().await?;
        let Reconciliation {
            events,
            stale_folders,
        } = deduce_events(self.collaborators.disk.as_ref(), &mappings).await?;

        for mapping in mappings
            .iter()
            .filter(|m| !stale_folders.contains(&m.folder_path))
        {
            if let Err(err) = self.collaborators.registrar.watch(&mapping.folder_path) {
                warn!(folder = %mapping.folder_path, error = %err, "failed to register live watch");
            }
        }

        for folder in &stale_folders {
            info!(folder = %folder, "removing mapping of missing folder");
            if let Err(err) = self.collaborators.store.remove_mapping(folder).await {
                error!(folder = %folder, error = %err, "failed to remove stale mapping");
            }
            if let Err(err) = self.collaborators.registrar.unwatch(folder) {
                debug!(folder = %folder, error = %err, "unwatch of missing folder failed");
            }
        }

        self.queue.clear();
        self.trash.clear();
        info!(
            mappings = mappings.len() - stale_folders.len(),
            events = events.len(),
            "reconciled watched folders"
        );
        self.queue.extend(events);
        self.drain.schedule();
        Ok(())
    }

    pub fn push_event(&mut self, event: WatchEvent) {
        self.queue.push(event);
        self.drain.schedule();
    }

    pub async fn on_live_event(&mut self, event: LiveEvent) -> Result<(), EngineError> {
        match event {
            LiveEvent::FileAdded(path) => self.on_file_added(&path).await,
            LiveEvent::FileRemoved(path) => self.on_file_removed(&path).await,
            LiveEvent::FolderRemoved(path) => self.on_folder_removed(&path).await,
        }
    }

    pub async fn on_file_added(&mut self, path: &str) -> Result<(), EngineError> {
        if let Some(event) = self.event_for_path(path, WatchEvent::upload).await? {
            self.push_event(event);
        }
        Ok(())
    }

    pub async fn on_file_removed(&mut self, path: &str) -> Result<(), EngineError> {
        if let Some(event) = self.event_for_path(path, WatchEvent::trash).await? {
            self.push_event(event);
        }
        Ok(())
    }

    /// Only a watched root counts as a bulk removal; the file removals that
    /// follow it are swallowed by the trash coordinator.
    pub async fn on_folder_removed(&mut self, folder_path: &str) -> Result<(), EngineError> {
        let mappings = self.collaborators.store.list_mappings().await?;
        if mappings.iter().any(|m| m.folder_path == folder_path) {
            info!(folder = %folder_path, "watched folder removed");
            self.trash.push_trashed_dir(folder_path);
        } else {
            debug!(folder = %folder_path, "removed folder is not a watched root");
        }
        Ok(())
    }

    async fn event_for_path(
        &self,
        path: &str,
        build: fn(String, String, String) -> WatchEvent,
    ) -> Result<Option<WatchEvent>, EngineError> {
        let mappings = self.collaborators.store.list_mappings().await?;
        let Some(mapping) = mapping_for_path(&mappings, path) else {
            debug!(path, "no mapping for changed path");
            return Ok(None);
        };
        let collection_name = mapping.collection_name_for(path)?;
        Ok(Some(build(
            mapping.folder_path.clone(),
            collection_name,
            path.to_string(),
        )))
    }

    fn can_dispatch(&self) -> bool {
        !self.paused && self.in_flight.is_none() && !self.queue.is_empty()
    }

    /// Dispatches at most one coalesced batch.
    pub async fn run_next_event(&mut self) -> Result<DispatchOutcome, EngineError> {
        if !self.can_dispatch() {
            return Ok(DispatchOutcome::Skipped);
        }
        let event = self.queue.pop_coalesced()?;
        self.state = SyncState::Dispatching;
        let result = self.dispatch(event).await;
        if result.is_err() {
            self.finish_batch();
        }
        result
    }

    async fn dispatch(&mut self, event: WatchEvent) -> Result<DispatchOutcome, EngineError> {
        let mappings = self.collaborators.store.list_mappings().await?;
        let Some(mapping) = mappings
            .into_iter()
            .find(|m| m.folder_path == event.folder_path)
        else {
            warn!(folder = %event.folder_path, batch = event.path_count(), "dropping batch without mapping");
            self.finish_batch();
            self.drain.schedule_now();
            return Ok(DispatchOutcome::Dropped);
        };

        let WatchEvent {
            folder_path,
            collection_name,
            action,
        } = event;

        match action {
            WatchAction::Upload { files } => {
                let files = uploadable_files(files, &mapping);
                if files.is_empty() {
                    debug!(folder = %folder_path, collection = %collection_name, "nothing left to upload");
                    self.finish_batch();
                    self.drain.schedule_now();
                    return Ok(DispatchOutcome::Dropped);
                }

                self.collaborators
                    .uploads
                    .start_upload(&collection_name, &files)
                    .await?;
                let count = files.len();
                info!(folder = %folder_path, collection = %collection_name, count, "upload batch dispatched");
                self.in_flight = Some(InFlightBatch {
                    folder_path,
                    collection_name,
                    files,
                });
                self.state = SyncState::UploadInFlight;
                self.collaborators.notifier.running_changed(true);
                Ok(DispatchOutcome::UploadStarted { count })
            }
            WatchAction::Trash { paths } => {
                self.state = SyncState::TrashInFlight;
                let mut mapping = mapping;
                let outcome = self
                    .trash
                    .process(&paths, &mut mapping, &mut self.queue, &self.collaborators)
                    .await?;
                self.finish_batch();
                self.drain.schedule_now();
                Ok(DispatchOutcome::Trashed(outcome))
            }
        }
    }

    pub fn on_file_upload(
        &mut self,
        outcome: UploadOutcome,
        item: &UploadItem,
        remote: Option<RemoteFile>,
    ) {
        if self.state != SyncState::UploadInFlight {
            debug!(outcome = outcome.as_str(), paths = ?item.paths(), "upload result without batch in flight");
            return;
        }
        debug!(outcome = outcome.as_str(), paths = ?item.paths(), "upload result");
        self.tracker.record(outcome, item, remote);
    }

    /// Classifies and persists the in-flight batch once the pipeline reports
    /// that every file of `collection_name` is done.
    pub async fn on_uploads_done(&mut self, collection_name: &str) -> Result<(), EngineError> {
        let batch = match self.in_flight.take() {
            Some(batch) if batch.collection_name == collection_name => batch,
            other => {
                self.in_flight = other;
                debug!(collection = %collection_name, "completion for a batch that is not in flight");
                return Ok(());
            }
        };

        let classification = self.tracker.classify(&batch.files);
        info!(
            folder = %batch.folder_path,
            collection = %batch.collection_name,
            synced = classification.synced.len(),
            ignored = classification.ignored.len(),
            dropped = batch.files.len() - classification.synced.len() - classification.ignored.len(),
            "upload batch completed"
        );
        let result = self.persist(&batch.folder_path, classification).await;
        self.finish_batch();
        self.collaborators.notifier.running_changed(false);
        self.drain.schedule_now();

        match result {
            Err(StoreError::MappingNotFound(folder)) => {
                warn!(folder = %folder, "mapping removed while its batch was in flight, results dropped");
                Ok(())
            }
            other => other.map_err(EngineError::from),
        }
    }

    /// Appends to the mapping as currently stored, not the dispatch-time copy.
    async fn persist(
        &self,
        folder_path: &str,
        classification: Classification,
    ) -> Result<(), StoreError> {
        if classification.is_empty() {
            return Ok(());
        }
        let Classification { synced, ignored } = classification;
        let mut mapping = self
            .collaborators
            .store
            .list_mappings()
            .await?
            .into_iter()
            .find(|m| m.folder_path == folder_path)
            .ok_or_else(|| StoreError::MappingNotFound(folder_path.to_string()))?;
        if !synced.is_empty() {
            mapping.synced_files.extend(synced);
            self.collaborators
                .store
                .update_synced_files(&mapping.folder_path, &mapping.synced_files)
                .await?;
        }
        if !ignored.is_empty() {
            mapping.ignored_files.extend(ignored);
            self.collaborators
                .store
                .update_ignored_files(&mapping.folder_path, &mapping.ignored_files)
                .await?;
        }
        Ok(())
    }

    fn finish_batch(&mut self) {
        self.in_flight = None;
        self.tracker.clear();
        self.state = SyncState::Idle;
    }

    pub fn pause(&mut self) {
        info!("watch sync paused");
        self.paused = true;
        self.drain.cancel();
    }

    pub async fn resume(&mut self) -> Result<(), EngineError> {
        info!("watch sync resumed");
        self.paused = false;
        self.sync_with_disk().await
    }

    /// Aborts the external pipeline and forgets the batch without classifying it.
    pub async fn cancel_running_upload(&mut self) -> Result<bool, EngineError> {
        let Some(batch) = self.in_flight.as_ref() else {
            return Ok(false);
        };
        info!(folder = %batch.folder_path, collection = %batch.collection_name, "cancelling upload batch");
        self.collaborators.uploads.cancel_running_upload().await?;
        self.finish_batch();
        self.collaborators.notifier.running_changed(false);
        self.drain.schedule();
        Ok(true)
    }

    pub async fn add_mapping(
        &mut self,
        root_folder_name: &str,
        folder_path: &str,
        strategy: UploadStrategy,
    ) -> Result<(), EngineError> {
        if !self.collaborators.disk.is_directory(folder_path).await {
            return Err(EngineError::NotADirectory(folder_path.to_string()));
        }
        self.collaborators
            .store
            .add_mapping(root_folder_name, folder_path, strategy)
            .await?;
        info!(folder = %folder_path, root = %root_folder_name, strategy = strategy.as_str(), "watch added");
        self.sync_with_disk().await
    }

    /// An in-flight batch of the removed mapping stays with the pipeline; its
    /// completion then finds no mapping to persist into.
    pub async fn remove_mapping(&mut self, folder_path: &str) -> Result<(), EngineError> {
        self.collaborators.store.remove_mapping(folder_path).await?;
        if let Err(err) = self.collaborators.registrar.unwatch(folder_path) {
            warn!(folder = %folder_path, error = %err, "failed to unregister live watch");
        }
        info!(folder = %folder_path, "watch removed");
        self.sync_with_disk().await
    }

    pub async fn list_mappings(&self) -> Result<Vec<FolderMapping>, EngineError> {
        Ok(self.collaborators.store.list_mappings().await?)
    }

    pub fn is_mapping_sync_in_progress(&self, folder_path: &str) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|batch| batch.folder_path == folder_path)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state,
            paused: self.paused,
            queued: self.queue.len(),
            current_folder: self.in_flight.as_ref().map(|b| b.folder_path.clone()),
        }
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn drain_deadline(&self) -> Option<Instant> {
        self.drain.deadline()
    }

    async fn drain_once(&mut self) {
        match self.run_next_event().await {
            Ok(outcome) => debug!(?outcome, "drain step finished"),
            Err(err) => {
                error!(error = %err, "batch abandoned");
                if !self.queue.is_empty() {
                    self.drain.schedule();
                }
            }
        }
    }

    async fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Live(event) => {
                if let Err(err) = self.on_live_event(event).await {
                    warn!(error = %err, "live event dropped");
                }
            }
            EngineCommand::FileUploaded {
                outcome,
                item,
                remote,
            } => self.on_file_upload(outcome, &item, remote),
            EngineCommand::UploadsDone { collection_name } => {
                if let Err(err) = self.on_uploads_done(&collection_name).await {
                    error!(collection = %collection_name, error = %err, "failed to record upload results");
                }
            }
            EngineCommand::AddMapping {
                root_folder_name,
                folder_path,
                strategy,
                reply,
            } => {
                let result = self
                    .add_mapping(&root_folder_name, &folder_path, strategy)
                    .await;
                let _ = reply.send(result);
            }
            EngineCommand::RemoveMapping { folder_path, reply } => {
                let result = self.remove_mapping(&folder_path).await;
                let _ = reply.send(result);
            }
            EngineCommand::ListMappings { reply } => {
                let _ = reply.send(self.list_mappings().await);
            }
            EngineCommand::Pause { reply } => {
                self.pause();
                let _ = reply.send(Ok(()));
            }
            EngineCommand::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            EngineCommand::Resync { reply } => {
                let _ = reply.send(self.sync_with_disk().await);
            }
            EngineCommand::CancelUpload { reply } => {
                let _ = reply.send(self.cancel_running_upload().await);
            }
            EngineCommand::IsMappingSyncInProgress { folder_path, reply } => {
                let _ = reply.send(Ok(self.is_mapping_sync_in_progress(&folder_path)));
            }
            EngineCommand::Status { reply } => {
                let _ = reply.send(Ok(self.status()));
            }
        }
    }

    /// Owns the engine until `shutdown` fires or every handle is dropped.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<EngineCommand>,
        shutdown: CancellationToken,
    ) {
        if let Err(err) = self.sync_with_disk().await {
            error!(error = %err, "initial reconciliation failed");
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("watch engine stopping");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = debounce::wait_for(self.drain.deadline()) => {
                    if self.drain.take_due(Instant::now()) {
                        self.drain_once().await;
                    }
                }
            }
        }
    }
}

/// Drops system artifacts, already tracked paths and repeated paths.
fn uploadable_files(files: Vec<LocalFile>, mapping: &FolderMapping) -> Vec<LocalFile> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .filter(|file| !is_system_file(&file.path))
        .filter(|file| !mapping.is_synced_or_ignored(&file.path))
        .filter(|file| seen.insert(file.path.clone()))
        .collect()
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
