use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::{Connection, SqliteConnection};
use tracing::{debug, info, warn};

use crate::db::repository;
use crate::error::AppError;

/// Tables in foreign-key order: parents before children.
const TABLES: [&str; 4] = ["projects", "modules", "tasks", "config"];

/// Where the in-memory database is loaded from and written back to.
///
/// The store calls `persist` after every mutation, so an implementation must
/// leave a complete, consistent image behind each time it returns.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Fills a freshly migrated database. Returns `false` when there was
    /// nothing to load.
    async fn load(&self, db: &mut SqliteConnection) -> Result<bool, AppError>;

    async fn persist(&self, db: &mut SqliteConnection) -> Result<(), AppError>;

    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Whole-file snapshot: the entire database is rewritten on every persist.
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Persistence for FileSnapshot {
    async fn load(&self, db: &mut SqliteConnection) -> Result<bool, AppError> {
        if !self.path.exists() {
            info!("No store file at {}, starting empty", self.path.display());
            return Ok(false);
        }
        copy_from_file(db, &self.path).await?;
        Ok(true)
    }

    async fn persist(&self, db: &mut SqliteConnection) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // VACUUM INTO refuses to overwrite an existing file.
        let tmp = self.temp_path();
        if tmp.exists() {
            fs::remove_file(&tmp)?;
        }

        sqlx::query("VACUUM INTO ?1")
            .bind(tmp.to_string_lossy().into_owned())
            .persistent(false)
            .execute(&mut *db)
            .await?;
        fs::rename(&tmp, &self.path)?;

        debug!("Store written to {}", self.path.display());
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Keeps everything in memory. Used by tests and scratch stores.
pub struct MemoryOnly;

#[async_trait]
impl Persistence for MemoryOnly {
    async fn load(&self, _db: &mut SqliteConnection) -> Result<bool, AppError> {
        Ok(false)
    }

    async fn persist(&self, _db: &mut SqliteConnection) -> Result<(), AppError> {
        Ok(())
    }
}

/// Copies every known table from the store file at `path` into `db`.
///
/// Only columns present on both sides are copied, so files written before a
/// column was added still load. Module and task rows whose project is missing
/// are dropped. Nothing is written unless the whole copy succeeds.
pub async fn copy_from_file(db: &mut SqliteConnection, path: &Path) -> Result<u64, AppError> {
    load_file(db, path, false).await
}

/// Like `copy_from_file`, but empties `db` first in the same transaction.
pub async fn replace_from_file(db: &mut SqliteConnection, path: &Path) -> Result<u64, AppError> {
    load_file(db, path, true).await
}

async fn load_file(db: &mut SqliteConnection, path: &Path, replace: bool) -> Result<u64, AppError> {
    sqlx::query("ATTACH DATABASE ?1 AS snapshot")
        .bind(path.to_string_lossy().into_owned())
        .persistent(false)
        .execute(&mut *db)
        .await?;

    let copied = copy_attached(db, replace).await;

    sqlx::query("DETACH DATABASE snapshot")
        .persistent(false)
        .execute(&mut *db)
        .await?;

    let copied = copied?;
    info!("Loaded {} rows from {}", copied, path.display());
    Ok(copied)
}

async fn copy_attached(db: &mut SqliteConnection, replace: bool) -> Result<u64, AppError> {
    let mut tx = db.begin().await?;
    if replace {
        repository::clear_all(&mut *tx).await?;
    }
    let copied = copy_tables(&mut *tx).await?;
    tx.commit().await?;
    Ok(copied)
}

async fn copy_tables(db: &mut SqliteConnection) -> Result<u64, AppError> {
    let mut total = 0;
    let mut found = 0;

    for table in TABLES {
        let source = table_columns(db, table, "snapshot").await?;
        if source.is_empty() {
            warn!("Store file has no {} table, skipping", table);
            continue;
        }
        found += 1;
        let target = table_columns(db, table, "main").await?;
        let shared: Vec<&String> = target.iter().filter(|c| source.contains(c)).collect();
        if shared.is_empty() {
            continue;
        }

        let columns = shared
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let orphan_filter = if shared.iter().any(|c| c.as_str() == "project_id") {
            " WHERE project_id IN (SELECT id FROM main.projects)"
        } else {
            ""
        };

        let copied = sqlx::query(&format!(
            "INSERT INTO main.{table} ({columns}) SELECT {columns} FROM snapshot.{table}{orphan_filter}"
        ))
        .persistent(false)
        .execute(&mut *db)
        .await?
        .rows_affected();

        debug!("Copied {} rows into {}", copied, table);
        total += copied;
    }

    if found == 0 {
        return Err(AppError::Validation(
            "file does not contain a task store".to_string(),
        ));
    }
    Ok(total)
}

async fn table_columns(
    db: &mut SqliteConnection,
    table: &str,
    schema: &str,
) -> Result<Vec<String>, AppError> {
    let columns = sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?1, ?2)")
        .bind(table)
        .bind(schema)
        .persistent(false)
        .fetch_all(&mut *db)
        .await?;
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::ConnectOptions;

    #[tokio::test]
    async fn test_persist_writes_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let mut db = connect_in_memory().await.unwrap();

        FileSnapshot::new(&path).persist(&mut db).await.unwrap();

        assert!(path.is_file());
        assert!(!dir.path().join("store.db.tmp").exists());
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_load_reads_file_written_by_another_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let mut file_db = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        crate::db::MIGRATOR.run(&mut file_db).await.unwrap();
        sqlx::query("INSERT INTO projects (id, name, created_at) VALUES ('p1', 'On disk', '2026-01-01T00:00:00+00:00')")
            .execute(&mut file_db)
            .await
            .unwrap();
        file_db.close().await.unwrap();

        let mut db = connect_in_memory().await.unwrap();
        assert!(FileSnapshot::new(&path).load(&mut db).await.unwrap());

        let name: String = sqlx::query_scalar("SELECT name FROM projects WHERE id = 'p1'")
            .fetch_one(&mut db)
            .await
            .unwrap();
        assert_eq!(name, "On disk");
    }

    #[tokio::test]
    async fn test_replace_rejects_foreign_file_and_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"definitely not sqlite").unwrap();

        let mut db = connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO projects (id, name, created_at) VALUES ('p1', 'Keep', '2026-01-01T00:00:00+00:00')")
            .execute(&mut db)
            .await
            .unwrap();

        assert!(replace_from_file(&mut db, &path).await.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&mut db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_empty_sqlite_file_is_not_a_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        fs::write(&path, b"").unwrap();

        let mut db = connect_in_memory().await.unwrap();
        let err = copy_from_file(&mut db, &path).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
