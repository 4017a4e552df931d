use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zbus::connection::Builder as ConnectionBuilder;
use zbus::object_server::SignalEmitter;

use crate::dbus_api::{
    DBUS_NAME_WATCH, DBUS_OBJECT_PATH_WATCH, DbusNotifier, DbusRemovalPipeline,
    DbusUploadPipeline, WatchDbusService,
};
use crate::picker::PortalFolderPicker;
use crate::sync::collaborators::{CollaboratorError, Collaborators, WatchRegistrar};
use crate::sync::debounce::DEFAULT_DRAIN_DELAY;
use crate::sync::engine::{EngineHandle, LiveEvent, WatchEngine, engine_channel};
use crate::sync::local_fs::LocalDisk;
use crate::sync::local_watcher::LiveWatcher;
use crate::sync::mapping_store::{SqliteMappingStore, default_db_path};

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub debounce: Duration,
    pub enable_live_watcher: bool,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let db_path = match std::env::var("FOLDERWATCH_DB_PATH") {
            Ok(value) if !value.trim().is_empty() => expand_with_home(value.trim(), &home),
            _ => default_db_path().context("failed to resolve default database path")?,
        };
        let debounce = Duration::from_millis(read_u64_env(
            "FOLDERWATCH_DEBOUNCE_MS",
            DEFAULT_DRAIN_DELAY.as_millis() as u64,
        ));
        let enable_live_watcher = read_bool_env("FOLDERWATCH_ENABLE_LIVE_WATCHER", true);

        Ok(Self {
            db_path,
            debounce,
            enable_live_watcher,
        })
    }
}

/// Stands in for the OS watcher when live notifications are disabled.
struct NoopRegistrar;

impl WatchRegistrar for NoopRegistrar {
    fn watch(&self, _folder_path: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn unwatch(&self, _folder_path: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    store: Arc<SqliteMappingStore>,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        let store = SqliteMappingStore::new_at(&config.db_path)
            .await
            .with_context(|| format!("failed to open mapping store at {:?}", config.db_path))?;
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            db = %self.config.db_path.display(),
            debounce_ms = self.config.debounce.as_millis() as u64,
            live_watcher = self.config.enable_live_watcher,
            "folderwatchd started"
        );

        let (handle, commands) = engine_channel();
        let dbus_connection = ConnectionBuilder::session()?
            .name(DBUS_NAME_WATCH)?
            .serve_at(
                DBUS_OBJECT_PATH_WATCH,
                WatchDbusService::new(handle.clone(), Arc::new(PortalFolderPicker)),
            )?
            .build()
            .await
            .context("failed to start D-Bus object server")?;
        let signal_emitter = SignalEmitter::new(&dbus_connection, DBUS_OBJECT_PATH_WATCH)
            .context("failed to create D-Bus signal emitter")?
            .into_owned();

        let (registrar, live_rx) = start_registrar(self.config.enable_live_watcher);
        let collaborators = Collaborators {
            disk: Arc::new(LocalDisk),
            store: self.store.clone(),
            uploads: Arc::new(DbusUploadPipeline::new(signal_emitter.clone())),
            removal: Arc::new(DbusRemovalPipeline::new(dbus_connection.clone())),
            notifier: Arc::new(DbusNotifier::new(signal_emitter)),
            registrar,
        };

        let shutdown = CancellationToken::new();
        let engine = WatchEngine::new(collaborators, self.config.debounce);
        let engine_task = tokio::spawn(engine.run(commands, shutdown.clone()));
        let live_task = live_rx.map(|rx| tokio::spawn(forward_live_events(rx, handle.clone())));

        let res = tokio::signal::ctrl_c().await;
        info!("shutting down");
        shutdown.cancel();
        if let Some(live_task) = live_task {
            live_task.abort();
        }
        if let Err(err) = engine_task.await {
            warn!(error = %err, "engine task ended abnormally");
        }
        drop(dbus_connection);
        res.context("failed waiting for shutdown signal")
    }
}

fn start_registrar(
    enabled: bool,
) -> (
    Arc<dyn WatchRegistrar>,
    Option<mpsc::UnboundedReceiver<LiveEvent>>,
) {
    if !enabled {
        return (Arc::new(NoopRegistrar), None);
    }
    match LiveWatcher::start() {
        Ok((watcher, rx)) => (Arc::new(watcher), Some(rx)),
        Err(err) => {
            warn!(error = %err, "failed to start live watcher, relying on resync only");
            (Arc::new(NoopRegistrar), None)
        }
    }
}

async fn forward_live_events(mut rx: mpsc::UnboundedReceiver<LiveEvent>, handle: EngineHandle) {
    while let Some(event) = rx.recv().await {
        if handle.live_event(event).is_err() {
            break;
        }
    }
}

include!("daemon_helpers.rs");

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
