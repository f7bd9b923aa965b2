use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::error::ErrorKind;
use tracing::{debug, info, warn};

use crate::config::APP_CONFIG_KEY;
use crate::db::Store;
use crate::error::AppError;
use crate::models::{NewModuleRequest, NewProjectRequest, NewTaskRequest};

pub const LEGACY_PROJECTS_FILE: &str = "projects.json";
pub const LEGACY_MODULES_FILE: &str = "modules.json";
pub const LEGACY_TASKS_FILE: &str = "tasks.json";
/// Base64-encoded JSON written by the oldest releases.
pub const LEGACY_CONFIG_FILE: &str = "config.dat";
pub const CONFIG_FILE: &str = "config.json";

const BACKUP_SUFFIX: &str = ".backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    LegacyEncoded,
    JsonFile,
}

#[derive(Debug, Default, Serialize)]
pub struct MigrationStats {
    pub projects_imported: usize,
    pub modules_imported: usize,
    pub tasks_imported: usize,
    pub records_skipped: usize,
    pub config_source: Option<ConfigSource>,
    pub backed_up: Vec<PathBuf>,
}

impl MigrationStats {
    pub fn is_noop(&self) -> bool {
        self.projects_imported == 0
            && self.modules_imported == 0
            && self.tasks_imported == 0
            && self.records_skipped == 0
            && self.config_source.is_none()
            && self.backed_up.is_empty()
    }
}

/// Imports legacy files found in the data directory. Safe to run on every
/// start: migrated files are renamed to `*.backup` and data already in the
/// store is never overwritten.
pub struct MigrationService {
    data_dir: PathBuf,
}

impl MigrationService {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Runs every step; a failing step is logged and the next one still runs.
    pub async fn run(&self, store: &mut Store) -> MigrationStats {
        debug!("Checking {} for legacy data", self.data_dir.display());
        let mut stats = MigrationStats::default();

        if let Err(e) = self.import_json_files(store, &mut stats).await {
            warn!("Legacy JSON import failed: {}", e);
        }
        if let Err(e) = self.import_legacy_config(store, &mut stats).await {
            warn!("Legacy encoded config import failed: {}", e);
        }
        if let Err(e) = self.import_json_config(store, &mut stats).await {
            warn!("JSON config import failed: {}", e);
        }

        if stats.is_noop() {
            debug!("Nothing to migrate");
        } else {
            info!("Migration completed: {:?}", stats);
        }
        stats
    }

    async fn import_json_files(
        &self,
        store: &mut Store,
        stats: &mut MigrationStats,
    ) -> Result<(), AppError> {
        let paths = [
            self.data_dir.join(LEGACY_PROJECTS_FILE),
            self.data_dir.join(LEGACY_MODULES_FILE),
            self.data_dir.join(LEGACY_TASKS_FILE),
        ];
        if !paths.iter().any(|p| p.exists()) {
            return Ok(());
        }
        if store.count_projects().await? > 0 {
            info!("Store already has projects, legacy JSON files left untouched");
            return Ok(());
        }

        // Parse everything up front so a malformed file aborts before any write.
        let projects = read_array(&paths[0])?;
        let modules = read_array(&paths[1])?;
        let tasks = read_array(&paths[2])?;

        info!("Step 1: Importing {} legacy projects", projects.len());
        for value in projects {
            let Some(req) = parse_record::<NewProjectRequest>(value, "project", stats) else {
                continue;
            };
            if req.name.trim().is_empty() {
                warn!("Skipping legacy project without a name");
                stats.records_skipped += 1;
                continue;
            }
            if accepted(store.add_project(req).await, "project", stats)? {
                stats.projects_imported += 1;
            }
        }

        info!("Step 2: Importing {} legacy modules", modules.len());
        for value in modules {
            let Some(req) = parse_record::<NewModuleRequest>(value, "module", stats) else {
                continue;
            };
            if accepted(store.add_module(req).await, "module", stats)? {
                stats.modules_imported += 1;
            }
        }

        info!("Step 3: Importing {} legacy tasks", tasks.len());
        for value in tasks {
            let Some(req) = parse_record::<NewTaskRequest>(value, "task", stats) else {
                continue;
            };
            if accepted(store.add_task(req).await, "task", stats)? {
                stats.tasks_imported += 1;
            }
        }

        // Only reached when every accepted record is on disk.
        for path in paths.iter().filter(|p| p.exists()) {
            mark_migrated(path, stats)?;
        }
        Ok(())
    }

    async fn import_legacy_config(
        &self,
        store: &mut Store,
        stats: &mut MigrationStats,
    ) -> Result<(), AppError> {
        let legacy = self.data_dir.join(LEGACY_CONFIG_FILE);
        if !legacy.exists() {
            return Ok(());
        }
        if self.data_dir.join(CONFIG_FILE).exists()
            || store.get_config(APP_CONFIG_KEY).await?.is_some()
        {
            info!("Current config present, {} superseded", legacy.display());
            return mark_migrated(&legacy, stats);
        }

        let encoded: String = fs::read_to_string(&legacy)?
            .split_whitespace()
            .collect();
        let decoded = STANDARD.decode(encoded)?;
        serde_json::from_slice::<Value>(&decoded)?;
        let text = String::from_utf8_lossy(&decoded);

        store.save_config(APP_CONFIG_KEY, strip_bom(&text).trim()).await?;
        stats.config_source = Some(ConfigSource::LegacyEncoded);
        info!("Imported legacy encoded config from {}", legacy.display());

        mark_migrated(&legacy, stats)
    }

    async fn import_json_config(
        &self,
        store: &mut Store,
        stats: &mut MigrationStats,
    ) -> Result<(), AppError> {
        let path = self.data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(());
        }

        if store.get_config(APP_CONFIG_KEY).await?.is_some() {
            info!("Config already stored, keeping it over {}", path.display());
        } else {
            let raw = fs::read_to_string(&path)?;
            let raw = strip_bom(&raw).trim();
            serde_json::from_str::<Value>(raw)?;
            store.save_config(APP_CONFIG_KEY, raw).await?;
            stats.config_source = Some(ConfigSource::JsonFile);
            info!("Imported config from {}", path.display());
        }

        mark_migrated(&path, stats)
    }
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// A missing file reads as an empty array.
fn read_array(path: &Path) -> Result<Vec<Value>, AppError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(strip_bom(&text))?)
}

/// `Ok(false)` when the store rejected the row itself (constraint
/// violations). Anything else, a failed write to the store file included,
/// aborts the step so the legacy files stay where they are.
fn accepted<T>(
    result: Result<T, AppError>,
    kind: &str,
    stats: &mut MigrationStats,
) -> Result<bool, AppError> {
    match result {
        Ok(_) => Ok(true),
        Err(AppError::Database(sqlx::Error::Database(e))) if is_row_reject(e.kind()) => {
            warn!("Skipping legacy {}: {}", kind, e);
            stats.records_skipped += 1;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn is_row_reject(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation
    )
}

fn parse_record<T: DeserializeOwned>(
    value: Value,
    kind: &str,
    stats: &mut MigrationStats,
) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Skipping unreadable legacy {}: {}", kind, e);
            stats.records_skipped += 1;
            None
        }
    }
}

/// Renames `path` to `<path>.backup`; an older backup is never overwritten.
fn mark_migrated(path: &Path, stats: &mut MigrationStats) -> Result<(), AppError> {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(BACKUP_SUFFIX);
    let mut backup = path.with_file_name(&name);
    if backup.exists() {
        name.push(format!("-{}", Utc::now().format("%Y%m%d%H%M%S")));
        backup = path.with_file_name(&name);
    }

    fs::rename(path, &backup)?;
    info!("Renamed {} to {}", path.display(), backup.display());
    stats.backed_up.push(backup);
    Ok(())
}
