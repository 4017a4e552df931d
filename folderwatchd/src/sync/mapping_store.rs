use std::{fs, path::Path, path::PathBuf};

use async_trait::async_trait;
use folderwatch_core::{FolderMapping, InvalidStrategy, SyncedFile, UploadStrategy};
use sqlx::{Row, SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions};
use thiserror::Error;
use time::OffsetDateTime;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
    #[error(transparent)]
    InvalidStrategy(#[from] InvalidStrategy),
    #[error("no watch mapping for folder: {0}")]
    MappingNotFound(String),
    #[error("folder is already watched: {0}")]
    DuplicateMapping(String),
}

/// Persistence boundary for watch mappings.
///
/// List updates replace the stored list for one mapping wholesale.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn list_mappings(&self) -> Result<Vec<FolderMapping>, StoreError>;

    async fn add_mapping(
        &self,
        root_folder_name: &str,
        folder_path: &str,
        strategy: UploadStrategy,
    ) -> Result<(), StoreError>;

    async fn remove_mapping(&self, folder_path: &str) -> Result<(), StoreError>;

    async fn update_synced_files(
        &self,
        folder_path: &str,
        files: &[SyncedFile],
    ) -> Result<(), StoreError>;

    async fn update_ignored_files(
        &self,
        folder_path: &str,
        files: &[String],
    ) -> Result<(), StoreError>;
}

pub struct SqliteMappingStore {
    pool: SqlitePool,
}

impl SqliteMappingStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new_at(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    async fn mapping_exists(
        conn: &mut sqlx::SqliteConnection,
        folder_path: &str,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM watch_mappings WHERE folder_path = ?1")
            .bind(folder_path)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    async fn synced_files_for(&self, folder_path: &str) -> Result<Vec<SyncedFile>, StoreError> {
        let rows = sqlx::query(
            "SELECT path, uploaded_file_id, collection_id FROM synced_files WHERE folder_path = ?1 ORDER BY position ASC",
        )
        .bind(folder_path)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(SyncedFile {
                path: row.try_get("path")?,
                uploaded_file_id: row.try_get("uploaded_file_id")?,
                collection_id: row.try_get("collection_id")?,
            });
        }
        Ok(out)
    }

    async fn ignored_files_for(&self, folder_path: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT path FROM ignored_files WHERE folder_path = ?1 ORDER BY position ASC",
        )
        .bind(folder_path)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.try_get("path")?);
        }
        Ok(out)
    }
}

#[async_trait]
impl MappingStore for SqliteMappingStore {
    async fn list_mappings(&self) -> Result<Vec<FolderMapping>, StoreError> {
        let rows = sqlx::query(
            "SELECT folder_path, root_folder_name, upload_strategy FROM watch_mappings ORDER BY created ASC, folder_path ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let folder_path: String = row.try_get("folder_path")?;
            let strategy: String = row.try_get("upload_strategy")?;
            out.push(FolderMapping {
                root_folder_name: row.try_get("root_folder_name")?,
                upload_strategy: UploadStrategy::parse(&strategy)?,
                synced_files: self.synced_files_for(&folder_path).await?,
                ignored_files: self.ignored_files_for(&folder_path).await?,
                folder_path,
            });
        }
        Ok(out)
    }

    async fn add_mapping(
        &self,
        root_folder_name: &str,
        folder_path: &str,
        strategy: UploadStrategy,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO watch_mappings (folder_path, root_folder_name, upload_strategy, created)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(folder_path) DO NOTHING",
        )
        .bind(folder_path)
        .bind(root_folder_name)
        .bind(strategy.as_str())
        .bind(OffsetDateTime::now_utc().unix_timestamp())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateMapping(folder_path.to_string()));
        }
        Ok(())
    }

    async fn remove_mapping(&self, folder_path: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM synced_files WHERE folder_path = ?1")
            .bind(folder_path)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM ignored_files WHERE folder_path = ?1")
            .bind(folder_path)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM watch_mappings WHERE folder_path = ?1")
            .bind(folder_path)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MappingNotFound(folder_path.to_string()));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_synced_files(
        &self,
        folder_path: &str,
        files: &[SyncedFile],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        if !Self::mapping_exists(&mut tx, folder_path).await? {
            return Err(StoreError::MappingNotFound(folder_path.to_string()));
        }
        sqlx::query("DELETE FROM synced_files WHERE folder_path = ?1")
            .bind(folder_path)
            .execute(&mut *tx)
            .await?;
        for (position, file) in files.iter().enumerate() {
            sqlx::query(
                "INSERT OR REPLACE INTO synced_files (folder_path, position, path, uploaded_file_id, collection_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(folder_path)
            .bind(position as i64)
            .bind(&file.path)
            .bind(file.uploaded_file_id)
            .bind(file.collection_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_ignored_files(
        &self,
        folder_path: &str,
        files: &[String],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        if !Self::mapping_exists(&mut tx, folder_path).await? {
            return Err(StoreError::MappingNotFound(folder_path.to_string()));
        }
        sqlx::query("DELETE FROM ignored_files WHERE folder_path = ?1")
            .bind(folder_path)
            .execute(&mut *tx)
            .await?;
        for (position, path) in files.iter().enumerate() {
            sqlx::query(
                "INSERT OR REPLACE INTO ignored_files (folder_path, position, path) VALUES (?1, ?2, ?3)",
            )
            .bind(folder_path)
            .bind(position as i64)
            .bind(path)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let base = dirs::data_dir().ok_or(StoreError::MissingDataDir)?;
    Ok(base.join("folderwatch").join("mappings.sqlite3"))
}
