use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;
use tempfile::NamedTempFile;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::APP_CONFIG_KEY;
use crate::db::Store;
use crate::error::AppError;
use crate::models::{
    Module, NewModuleRequest, NewProjectRequest, NewTaskRequest, Project, Task, now_timestamp,
};

pub const EXPORT_VERSION: u32 = 1;

const DATA_ENTRY: &str = "data.json";
const STORE_ENTRY: &str = "taskdesk.db";
const IMAGES_DIR_ENTRY: &str = "images";
const README_ENTRY: &str = "README.txt";

const README: &str = "\
taskdesk backup
===============

data.json     every project, module (including deleted ones), task and the
              settings document
taskdesk.db   raw copy of the store file, present when the store is file backed
images/       image attachments referenced by tasks

To restore, run `taskdesk import <this archive>`. The raw store file is used
when present; otherwise data.json is replayed into an emptied store. The
current store file is kept next to it as taskdesk.db.backup-<timestamp>.
";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: u32,
    pub exported_at: String,
    /// The stored settings text, embedded verbatim.
    pub config: Option<Box<RawValue>>,
    pub projects: Vec<Project>,
    pub modules: Vec<Module>,
    pub tasks: Vec<Task>,
}

/// Lenient reading side of `ExportDocument`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportDocument {
    pub version: Option<u32>,
    pub config: Option<Box<RawValue>>,
    pub projects: Vec<NewProjectRequest>,
    pub modules: Vec<NewModuleRequest>,
    pub tasks: Vec<NewTaskRequest>,
}

impl From<ExportDocument> for ImportDocument {
    fn from(doc: ExportDocument) -> Self {
        Self {
            version: Some(doc.version),
            config: doc.config,
            projects: doc.projects.into_iter().map(Into::into).collect(),
            modules: doc.modules.into_iter().map(Into::into).collect(),
            tasks: doc.tasks.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSource {
    StoreFile,
    Document,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub source: ImportSource,
    pub projects: usize,
    pub modules: usize,
    pub tasks: usize,
    pub skipped: usize,
    pub images: usize,
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ExportSummary {
    pub projects: usize,
    pub modules: usize,
    pub tasks: usize,
    pub images: usize,
    pub missing_images: usize,
    pub includes_store_file: bool,
}

/// Every project with all of its modules (deleted ones too) and tasks.
pub async fn export_document(store: &mut Store) -> Result<ExportDocument, AppError> {
    let config = match store.get_config(APP_CONFIG_KEY).await? {
        Some(raw) => Some(match RawValue::from_string(raw.clone()) {
            Ok(json) => json,
            Err(_) => serde_json::value::to_raw_value(&raw)?,
        }),
        None => None,
    };

    let projects = store.get_projects().await?;
    let mut modules = Vec::new();
    let mut tasks = Vec::new();
    for project in &projects {
        modules.extend(store.get_modules(&project.id, true).await?);
        tasks.extend(store.get_tasks(&project.id).await?);
    }

    Ok(ExportDocument {
        version: EXPORT_VERSION,
        exported_at: now_timestamp(),
        config,
        projects,
        modules,
        tasks,
    })
}

/// Replaces the store with the document's records, preserving ids, flags
/// and timestamps.
///
/// The document is replayed into a scratch store first; only when every
/// record went in is the result swapped into `store`, keeping a timestamped
/// copy of the previous store file. Modules and tasks whose project is not
/// part of the document are skipped.
pub async fn import_document(
    store: &mut Store,
    doc: ImportDocument,
) -> Result<ImportSummary, AppError> {
    let mut scratch = Store::in_memory().await?;
    let mut summary = replay_document(&mut scratch, doc).await?;

    let dir = tempfile::tempdir()?;
    let staged = dir.path().join(STORE_ENTRY);
    scratch.save_copy(&staged).await?;
    scratch.close().await?;

    summary.backup = store.restore_from_file(&staged).await?;
    info!(
        "Imported {} projects, {} modules, {} tasks ({} skipped)",
        summary.projects, summary.modules, summary.tasks, summary.skipped
    );
    Ok(summary)
}

async fn replay_document(
    store: &mut Store,
    doc: ImportDocument,
) -> Result<ImportSummary, AppError> {
    let mut summary = ImportSummary {
        source: ImportSource::Document,
        projects: 0,
        modules: 0,
        tasks: 0,
        skipped: 0,
        images: 0,
        backup: None,
    };

    let mut project_ids = HashSet::new();
    for project in doc.projects {
        let project = store.add_project(project).await?;
        project_ids.insert(project.id);
        summary.projects += 1;
    }

    for module in doc.modules {
        if !project_ids.contains(&module.project_id) {
            warn!("Skipping module {} of unknown project {}", module.name, module.project_id);
            summary.skipped += 1;
            continue;
        }
        store.add_module(module).await?;
        summary.modules += 1;
    }

    for task in doc.tasks {
        if !project_ids.contains(&task.project_id) {
            warn!("Skipping task {} of unknown project {}", task.name, task.project_id);
            summary.skipped += 1;
            continue;
        }
        store.add_task(task).await?;
        summary.tasks += 1;
    }

    if let Some(config) = doc.config {
        match serde_json::from_str::<Value>(config.get())? {
            Value::Null => {}
            Value::String(raw) => store.save_config(APP_CONFIG_KEY, &raw).await?,
            _ => store.save_config(APP_CONFIG_KEY, config.get()).await?,
        }
    }

    Ok(summary)
}

/// Builds and reads backup archives. Images are resolved against `images_dir`.
pub struct BackupService {
    images_dir: PathBuf,
}

impl BackupService {
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
        }
    }

    pub async fn export_bundle(
        &self,
        store: &mut Store,
        out: &Path,
    ) -> Result<ExportSummary, AppError> {
        let document = export_document(store).await?;

        let mut zip = ZipWriter::new(File::create(out)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file(DATA_ENTRY, options)?;
        zip.write_all(serde_json::to_string_pretty(&document)?.as_bytes())?;

        let store_path = store.path().map(Path::to_path_buf);
        let includes_store_file = match store_path {
            Some(path) => {
                store.persist().await?;
                zip.start_file(STORE_ENTRY, options)?;
                zip.write_all(&fs::read(&path)?)?;
                true
            }
            None => false,
        };

        let names: BTreeSet<&str> = document
            .tasks
            .iter()
            .flat_map(|t| t.images.iter().map(String::as_str))
            .collect();
        let mut images = 0;
        let mut missing_images = 0;
        for name in names {
            let Some(file_name) = plain_file_name(name) else {
                warn!("Ignoring image reference with a path: {}", name);
                continue;
            };
            let src = self.images_dir.join(file_name);
            if !src.is_file() {
                warn!("Image {} not found in {}", name, self.images_dir.display());
                missing_images += 1;
                continue;
            }
            zip.start_file(format!("{IMAGES_DIR_ENTRY}/{name}"), options)?;
            zip.write_all(&fs::read(&src)?)?;
            images += 1;
        }

        zip.start_file(README_ENTRY, options)?;
        zip.write_all(README.as_bytes())?;
        zip.finish()?;

        let summary = ExportSummary {
            projects: document.projects.len(),
            modules: document.modules.len(),
            tasks: document.tasks.len(),
            images,
            missing_images,
            includes_store_file,
        };
        info!("Exported {} to {}", format_summary(&summary), out.display());
        Ok(summary)
    }

    /// Restores from a bundle: the raw store file when present, otherwise the
    /// JSON document. Attachments are extracted into the images directory.
    pub async fn import_bundle(
        &self,
        store: &mut Store,
        archive_path: &Path,
    ) -> Result<ImportSummary, AppError> {
        let mut archive = ZipArchive::new(File::open(archive_path)?)?;
        let has_store_file = archive.by_name(STORE_ENTRY).is_ok();

        let mut summary = if has_store_file {
            let mut staged = NamedTempFile::new()?;
            io::copy(&mut archive.by_name(STORE_ENTRY)?, staged.as_file_mut())?;
            import_store_file(store, staged.path()).await?
        } else {
            let mut text = String::new();
            archive.by_name(DATA_ENTRY)?.read_to_string(&mut text)?;
            let doc: ImportDocument = serde_json::from_str(&text)?;
            import_document(store, doc).await?
        };

        summary.images = self.extract_images(&mut archive)?;
        Ok(summary)
    }

    /// Dispatches on the file extension: `.zip` bundle, `.json` document,
    /// anything else is treated as a raw store file.
    pub async fn import_file(
        &self,
        store: &mut Store,
        path: &Path,
    ) -> Result<ImportSummary, AppError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("zip") => self.import_bundle(store, path).await,
            Some("json") => {
                let doc: ImportDocument = serde_json::from_str(&fs::read_to_string(path)?)?;
                import_document(store, doc).await
            }
            _ => import_store_file(store, path).await,
        }
    }

    fn extract_images(&self, archive: &mut ZipArchive<File>) -> Result<usize, AppError> {
        let mut extracted = 0;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let Some(path) = entry.enclosed_name() else {
                continue;
            };
            let Ok(rest) = path.strip_prefix(IMAGES_DIR_ENTRY) else {
                continue;
            };
            let Some(file_name) = rest.file_name() else {
                continue;
            };

            fs::create_dir_all(&self.images_dir)?;
            let mut out = File::create(self.images_dir.join(file_name))?;
            io::copy(&mut entry, &mut out)?;
            extracted += 1;
        }
        Ok(extracted)
    }
}

/// Replaces the store with a raw store file, keeping a timestamped copy of
/// the current one.
pub async fn import_store_file(store: &mut Store, src: &Path) -> Result<ImportSummary, AppError> {
    let backup = store.restore_from_file(src).await?;

    let projects = store.get_projects().await?;
    let mut modules = 0;
    let mut tasks = 0;
    for project in &projects {
        modules += store.get_modules(&project.id, true).await?.len();
        tasks += store.get_tasks(&project.id).await?.len();
    }

    info!("Restored store from {}", src.display());
    Ok(ImportSummary {
        source: ImportSource::StoreFile,
        projects: projects.len(),
        modules,
        tasks,
        skipped: 0,
        images: 0,
        backup,
    })
}

fn plain_file_name(name: &str) -> Option<&str> {
    let file_name = Path::new(name).file_name()?.to_str()?;
    (file_name == name).then_some(file_name)
}

fn format_summary(summary: &ExportSummary) -> String {
    format!(
        "{} projects, {} modules, {} tasks, {} images",
        summary.projects, summary.modules, summary.tasks, summary.images
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_file_name_rejects_paths() {
        assert_eq!(plain_file_name("shot.png"), Some("shot.png"));
        assert_eq!(plain_file_name("../etc/passwd"), None);
        assert_eq!(plain_file_name("nested/shot.png"), None);
    }

    #[test]
    fn test_import_document_reads_export_shape() {
        let json = r#"{
            "version": 1,
            "exportedAt": "2026-01-01T00:00:00+00:00",
            "config": {"taskTypes": [], "general": {}},
            "projects": [{"id": "p1", "name": "P1", "memo": null, "createdAt": "2026-01-01T00:00:00+00:00", "updatedAt": null}],
            "modules": [{"id": "m1", "projectId": "p1", "name": "Mod1", "order": null, "deleted": true, "createdAt": "2026-01-01T00:00:00+00:00", "updatedAt": null}],
            "tasks": []
        }"#;
        let doc: ImportDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.version, Some(1));
        assert_eq!(doc.projects[0].id.as_deref(), Some("p1"));
        assert!(doc.modules[0].deleted);
        assert!(doc.tasks.is_empty());
    }
}
