use std::sync::Arc;

use async_trait::async_trait;
use folderwatch_core::{
    FileWithCollection, LocalFile, RemoteFile, UploadOutcome, UploadStrategy, file_name,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use zbus::object_server::SignalEmitter;
use zbus::{Connection, Proxy, interface};

use crate::sync::collaborators::{
    CollaboratorError, FolderPicker, RemoteNotifier, RemovalPipeline, UploadPipeline,
};
use crate::sync::engine::{EngineError, EngineHandle};
use crate::sync::mapping_store::StoreError;

pub const DBUS_NAME_WATCH: &str = "org.folderwatch.Watch1";
pub const DBUS_INTERFACE_WATCH: &str = "org.folderwatch.Watch1";
pub const DBUS_OBJECT_PATH_WATCH: &str = "/org/folderwatch/Watch1";

pub const DBUS_NAME_PIPELINE: &str = "org.folderwatch.Pipeline1";
pub const DBUS_INTERFACE_PIPELINE: &str = "org.folderwatch.Pipeline1";
pub const DBUS_OBJECT_PATH_PIPELINE: &str = "/org/folderwatch/Pipeline1";

pub const DBUS_ERROR_NOT_FOUND: &str = "org.folderwatch.Watch1.Error.NotFound";
pub const DBUS_ERROR_ALREADY_WATCHED: &str = "org.folderwatch.Watch1.Error.AlreadyWatched";
pub const DBUS_ERROR_INVALID_PATH: &str = "org.folderwatch.Watch1.Error.InvalidPath";
pub const DBUS_ERROR_INVALID_ARGUMENT: &str = "org.folderwatch.Watch1.Error.InvalidArgument";
pub const DBUS_ERROR_FAILED: &str = "org.folderwatch.Watch1.Error.Failed";

#[derive(Debug, Error)]
pub enum DbusServiceError {
    #[error("folder is not watched")]
    NotFound,
    #[error("folder is already watched")]
    AlreadyWatched,
    #[error("invalid path")]
    InvalidPath,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation failed")]
    Failed,
}

pub fn dbus_error_name(err: &DbusServiceError) -> &'static str {
    match err {
        DbusServiceError::NotFound => DBUS_ERROR_NOT_FOUND,
        DbusServiceError::AlreadyWatched => DBUS_ERROR_ALREADY_WATCHED,
        DbusServiceError::InvalidPath => DBUS_ERROR_INVALID_PATH,
        DbusServiceError::InvalidArgument(_) => DBUS_ERROR_INVALID_ARGUMENT,
        DbusServiceError::Failed => DBUS_ERROR_FAILED,
    }
}

fn map_to_fdo(err: DbusServiceError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(format!("{}: {}", dbus_error_name(&err), err))
}

fn map_engine_error(err: EngineError) -> zbus::fdo::Error {
    let mapped = match &err {
        EngineError::Store(StoreError::MappingNotFound(_)) => DbusServiceError::NotFound,
        EngineError::Store(StoreError::DuplicateMapping(_)) => DbusServiceError::AlreadyWatched,
        EngineError::NotADirectory(_) | EngineError::CollectionName(_) => {
            DbusServiceError::InvalidPath
        }
        _ => {
            warn!(error = %err, "watch request failed");
            DbusServiceError::Failed
        }
    };
    map_to_fdo(mapped)
}

fn normalize_folder_path(path: &str) -> Result<String, DbusServiceError> {
    if !path.starts_with('/') {
        return Err(DbusServiceError::InvalidPath);
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    })
}

fn parse_strategy(value: &str) -> Result<UploadStrategy, DbusServiceError> {
    UploadStrategy::parse(value).map_err(|err| DbusServiceError::InvalidArgument(err.to_string()))
}

fn parse_json<T: serde::de::DeserializeOwned>(
    what: &str,
    value: &str,
) -> Result<T, DbusServiceError> {
    serde_json::from_str(value)
        .map_err(|err| DbusServiceError::InvalidArgument(format!("{what}: {err}")))
}

pub struct WatchDbusService {
    handle: EngineHandle,
    picker: Arc<dyn FolderPicker>,
}

impl WatchDbusService {
    pub fn new(handle: EngineHandle, picker: Arc<dyn FolderPicker>) -> Self {
        Self { handle, picker }
    }

    async fn add(&self, root_folder_name: &str, folder_path: &str, strategy: &str) -> zbus::fdo::Result<()> {
        let folder_path = normalize_folder_path(folder_path).map_err(map_to_fdo)?;
        let strategy = parse_strategy(strategy).map_err(map_to_fdo)?;
        let root_folder_name = if root_folder_name.is_empty() {
            file_name(&folder_path)
        } else {
            root_folder_name
        };
        self.handle
            .add_mapping(root_folder_name, &folder_path, strategy)
            .await
            .map_err(map_engine_error)
    }
}

#[interface(name = "org.folderwatch.Watch1")]
impl WatchDbusService {
    async fn add_watch(
        &self,
        root_folder_name: &str,
        folder_path: &str,
        strategy: &str,
    ) -> zbus::fdo::Result<()> {
        info!(folder = %folder_path, strategy, "dbus AddWatch");
        self.add(root_folder_name, folder_path, strategy).await
    }

    /// Returns the chosen folder, or an empty string when the dialog was dismissed.
    async fn add_watch_interactive(&self, strategy: &str) -> zbus::fdo::Result<String> {
        parse_strategy(strategy).map_err(map_to_fdo)?;
        let selected = self.picker.select_directory().await.map_err(|err| {
            warn!(error = %err, "folder picker failed");
            map_to_fdo(DbusServiceError::Failed)
        })?;
        let Some(folder_path) = selected else {
            debug!("folder picker dismissed");
            return Ok(String::new());
        };
        info!(folder = %folder_path, strategy, "dbus AddWatchInteractive");
        self.add("", &folder_path, strategy).await?;
        Ok(folder_path)
    }

    async fn remove_watch(&self, folder_path: &str) -> zbus::fdo::Result<()> {
        let folder_path = normalize_folder_path(folder_path).map_err(map_to_fdo)?;
        info!(folder = %folder_path, "dbus RemoveWatch");
        self.handle
            .remove_mapping(&folder_path)
            .await
            .map_err(map_engine_error)
    }

    /// `(folder_path, root_folder_name, strategy, synced, ignored)` per mapping.
    async fn list_watches(&self) -> zbus::fdo::Result<Vec<(String, String, String, u32, u32)>> {
        let mappings = self.handle.list_mappings().await.map_err(map_engine_error)?;
        Ok(mappings
            .into_iter()
            .map(|m| {
                (
                    m.folder_path,
                    m.root_folder_name,
                    m.upload_strategy.as_str().to_string(),
                    m.synced_files.len() as u32,
                    m.ignored_files.len() as u32,
                )
            })
            .collect())
    }

    async fn pause(&self) -> zbus::fdo::Result<()> {
        self.handle.pause().await.map_err(map_engine_error)
    }

    async fn resume(&self) -> zbus::fdo::Result<()> {
        self.handle.resume().await.map_err(map_engine_error)
    }

    async fn resync(&self) -> zbus::fdo::Result<()> {
        self.handle.resync().await.map_err(map_engine_error)
    }

    async fn get_status(&self) -> zbus::fdo::Result<(String, bool, u32, String)> {
        let status = self.handle.status().await.map_err(map_engine_error)?;
        Ok((
            status.state.as_str().to_string(),
            status.paused,
            status.queued as u32,
            status.current_folder.unwrap_or_default(),
        ))
    }

    async fn is_mapping_sync_in_progress(&self, folder_path: &str) -> zbus::fdo::Result<bool> {
        let folder_path = normalize_folder_path(folder_path).map_err(map_to_fdo)?;
        self.handle
            .is_mapping_sync_in_progress(&folder_path)
            .await
            .map_err(map_engine_error)
    }

    /// `remote_json` is empty when the outcome produced no remote file.
    async fn file_uploaded(
        &self,
        outcome: &str,
        item_json: &str,
        remote_json: &str,
    ) -> zbus::fdo::Result<()> {
        let parsed = UploadOutcome::parse(outcome)
            .ok_or_else(|| DbusServiceError::InvalidArgument(format!("unknown outcome: {outcome}")))
            .map_err(map_to_fdo)?;
        let item: FileWithCollection = parse_json("item", item_json).map_err(map_to_fdo)?;
        let remote: Option<RemoteFile> = if remote_json.trim().is_empty() {
            None
        } else {
            Some(parse_json("remote", remote_json).map_err(map_to_fdo)?)
        };
        self.handle
            .file_uploaded(parsed, item.item, remote)
            .map_err(map_engine_error)
    }

    async fn uploads_done(&self, collection_name: &str) -> zbus::fdo::Result<()> {
        self.handle
            .uploads_done(collection_name)
            .map_err(map_engine_error)
    }

    async fn cancel_upload(&self) -> zbus::fdo::Result<bool> {
        self.handle
            .cancel_running_upload()
            .await
            .map_err(map_engine_error)
    }

    #[zbus(signal)]
    pub async fn upload_requested(
        ctxt: &SignalEmitter<'_>,
        collection_name: &str,
        files_json: &str,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn upload_cancelled(ctxt: &SignalEmitter<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn remote_changed(ctxt: &SignalEmitter<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn running_changed(ctxt: &SignalEmitter<'_>, running: bool) -> zbus::Result<()>;
}

/// Hands batches to whoever drives uploads by emitting `UploadRequested`.
pub struct DbusUploadPipeline {
    emitter: SignalEmitter<'static>,
}

impl DbusUploadPipeline {
    pub fn new(emitter: SignalEmitter<'static>) -> Self {
        Self { emitter }
    }
}

#[async_trait]
impl UploadPipeline for DbusUploadPipeline {
    async fn start_upload(
        &self,
        collection_name: &str,
        files: &[LocalFile],
    ) -> Result<(), CollaboratorError> {
        let files_json = serde_json::to_string(files)
            .map_err(|err| CollaboratorError::Remote(err.to_string()))?;
        WatchDbusService::upload_requested(&self.emitter, collection_name, &files_json)
            .await
            .map_err(|err| CollaboratorError::Remote(err.to_string()))
    }

    async fn cancel_running_upload(&self) -> Result<(), CollaboratorError> {
        WatchDbusService::upload_cancelled(&self.emitter)
            .await
            .map_err(|err| CollaboratorError::Remote(err.to_string()))
    }
}

pub struct DbusRemovalPipeline {
    connection: Connection,
}

impl DbusRemovalPipeline {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl RemovalPipeline for DbusRemovalPipeline {
    async fn remove_from_collection(
        &self,
        collection_id: i64,
        file_ids: &[i64],
    ) -> Result<(), CollaboratorError> {
        let proxy = Proxy::new(
            &self.connection,
            DBUS_NAME_PIPELINE,
            DBUS_OBJECT_PATH_PIPELINE,
            DBUS_INTERFACE_PIPELINE,
        )
        .await
        .map_err(|err| CollaboratorError::Remote(err.to_string()))?;
        proxy
            .call::<_, _, ()>("RemoveFromCollection", &(collection_id, file_ids.to_vec()))
            .await
            .map_err(|err| CollaboratorError::Remote(err.to_string()))
    }
}

/// Signals are fire-and-forget; emission failures are only logged.
pub struct DbusNotifier {
    emitter: SignalEmitter<'static>,
}

impl DbusNotifier {
    pub fn new(emitter: SignalEmitter<'static>) -> Self {
        Self { emitter }
    }
}

impl RemoteNotifier for DbusNotifier {
    fn notify_remote_changed(&self) {
        let emitter = self.emitter.clone();
        tokio::spawn(async move {
            if let Err(err) = WatchDbusService::remote_changed(&emitter).await {
                warn!(error = %err, "failed to emit RemoteChanged");
            }
        });
    }

    fn running_changed(&self, running: bool) {
        let emitter = self.emitter.clone();
        tokio::spawn(async move {
            if let Err(err) = WatchDbusService::running_changed(&emitter, running).await {
                warn!(error = %err, "failed to emit RunningChanged");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::sync::collaborators::Collaborators;
    use crate::sync::engine::{WatchEngine, engine_channel};
    use crate::sync::test_support::{
        CountingNotifier, FakeDisk, FakePicker, FakeRegistrar, MemoryStore, RecordingRemoval,
        RecordingUploads,
    };

    fn service_with(disk: Arc<FakeDisk>, selection: Option<&str>) -> WatchDbusService {
        let (handle, rx) = engine_channel();
        let engine = WatchEngine::new(
            Collaborators {
                disk,
                store: Arc::new(MemoryStore::default()),
                uploads: Arc::new(RecordingUploads::default()),
                removal: Arc::new(RecordingRemoval::default()),
                notifier: Arc::new(CountingNotifier::default()),
                registrar: Arc::new(FakeRegistrar::default()),
            },
            Duration::from_secs(1),
        );
        tokio::spawn(engine.run(rx, CancellationToken::new()));
        WatchDbusService::new(
            handle,
            Arc::new(FakePicker {
                selection: selection.map(str::to_string),
            }),
        )
    }

    fn assert_dbus_error(err: zbus::fdo::Error, name: &str) {
        match err {
            zbus::fdo::Error::Failed(msg) => assert!(msg.contains(name), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn maps_errors_to_stable_dbus_names() {
        assert_eq!(
            dbus_error_name(&DbusServiceError::NotFound),
            DBUS_ERROR_NOT_FOUND
        );
        assert_eq!(
            dbus_error_name(&DbusServiceError::AlreadyWatched),
            DBUS_ERROR_ALREADY_WATCHED
        );
        assert_eq!(
            dbus_error_name(&DbusServiceError::InvalidPath),
            DBUS_ERROR_INVALID_PATH
        );
        assert_eq!(
            dbus_error_name(&DbusServiceError::InvalidArgument("x".into())),
            DBUS_ERROR_INVALID_ARGUMENT
        );
        assert_eq!(
            dbus_error_name(&DbusServiceError::Failed),
            DBUS_ERROR_FAILED
        );
    }

    #[test]
    fn folder_paths_are_normalized() {
        assert_eq!(normalize_folder_path("/w/Photos/").unwrap(), "/w/Photos");
        assert_eq!(normalize_folder_path("/").unwrap(), "/");
        assert!(normalize_folder_path("Photos").is_err());
        assert!(normalize_folder_path("").is_err());
    }

    #[tokio::test]
    async fn add_watch_then_list() {
        let disk = Arc::new(FakeDisk::default());
        disk.set_dir("/home/u/Photos", &["/home/u/Photos/Trip/a.jpg"]);
        let service = service_with(disk, None);

        service
            .add_watch("", "/home/u/Photos/", "collection_per_folder")
            .await
            .unwrap();

        let watches = service.list_watches().await.unwrap();
        assert_eq!(
            watches,
            vec![(
                "/home/u/Photos".to_string(),
                "Photos".to_string(),
                "collection_per_folder".to_string(),
                0,
                0
            )]
        );
        let (state, paused, queued, current) = service.get_status().await.unwrap();
        assert_eq!(state, "idle");
        assert!(!paused);
        assert_eq!(queued, 1);
        assert!(current.is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_arguments() {
        let disk = Arc::new(FakeDisk::default());
        disk.set_dir("/w", &[]);
        let service = service_with(disk, None);

        let err = service
            .add_watch("w", "relative/path", "single_collection")
            .await
            .unwrap_err();
        assert_dbus_error(err, DBUS_ERROR_INVALID_PATH);

        let err = service.add_watch("w", "/w", "per_file").await.unwrap_err();
        assert_dbus_error(err, DBUS_ERROR_INVALID_ARGUMENT);

        let err = service
            .add_watch("w", "/missing", "single_collection")
            .await
            .unwrap_err();
        assert_dbus_error(err, DBUS_ERROR_INVALID_PATH);

        service
            .add_watch("w", "/w", "single_collection")
            .await
            .unwrap();
        let err = service
            .add_watch("w", "/w", "single_collection")
            .await
            .unwrap_err();
        assert_dbus_error(err, DBUS_ERROR_ALREADY_WATCHED);

        let err = service.remove_watch("/nope").await.unwrap_err();
        assert_dbus_error(err, DBUS_ERROR_NOT_FOUND);

        let err = service
            .file_uploaded("exploded", r#"{"collection_id":1,"kind":"file","path":"/w/a"}"#, "")
            .await
            .unwrap_err();
        assert_dbus_error(err, DBUS_ERROR_INVALID_ARGUMENT);

        let err = service
            .file_uploaded("uploaded", "{not json", "")
            .await
            .unwrap_err();
        assert_dbus_error(err, DBUS_ERROR_INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn interactive_add_uses_picker_selection() {
        let disk = Arc::new(FakeDisk::default());
        disk.set_dir("/home/u/Camera", &[]);
        let service = service_with(disk, Some("/home/u/Camera"));

        let chosen = service
            .add_watch_interactive("single_collection")
            .await
            .unwrap();
        assert_eq!(chosen, "/home/u/Camera");
        let watches = service.list_watches().await.unwrap();
        assert_eq!(watches[0].1, "Camera");
    }

    #[tokio::test]
    async fn dismissed_picker_adds_nothing() {
        let service = service_with(Arc::new(FakeDisk::default()), None);
        let chosen = service
            .add_watch_interactive("single_collection")
            .await
            .unwrap();
        assert!(chosen.is_empty());
        assert!(service.list_watches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pause_and_resume_round_trip() {
        let service = service_with(Arc::new(FakeDisk::default()), None);
        service.pause().await.unwrap();
        assert!(service.get_status().await.unwrap().1);
        service.resume().await.unwrap();
        assert!(!service.get_status().await.unwrap().1);
        assert!(!service.cancel_upload().await.unwrap());
        assert!(!service.is_mapping_sync_in_progress("/w").await.unwrap());
    }
}
