use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sqlx::{Connection, SqliteConnection};
use tracing::{info, warn};

use crate::db::repository;
use crate::db::snapshot::{self, FileSnapshot, MemoryOnly, Persistence};
use crate::db::connect_in_memory;
use crate::error::AppError;
use crate::models::{
    Module, NewModuleRequest, NewProjectRequest, NewTaskRequest, Project, Task,
    UpdateModuleRequest, UpdateProjectRequest, UpdateTaskRequest,
};

/// Handle to one store: an in-memory SQLite database mirrored to its
/// `Persistence` after every mutation.
///
/// Every method takes `&mut self`, so a mutation and the write that follows it
/// finish before the next call can start.
pub struct Store {
    db: SqliteConnection,
    persistence: Box<dyn Persistence>,
}

impl Store {
    /// Opens the store file at `path`, creating an empty store if it is missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        Self::open_with(Box::new(FileSnapshot::new(path))).await
    }

    pub async fn in_memory() -> Result<Self, AppError> {
        Self::open_with(Box::new(MemoryOnly)).await
    }

    pub async fn open_with(persistence: Box<dyn Persistence>) -> Result<Self, AppError> {
        let mut db = connect_in_memory().await?;
        let loaded = persistence.load(&mut db).await?;
        let mut store = Self { db, persistence };
        if !loaded {
            // Materialize the empty schema right away.
            store.persist().await?;
        }
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.persistence.location()
    }

    pub async fn close(self) -> Result<(), AppError> {
        self.db.close().await?;
        Ok(())
    }

    pub async fn persist(&mut self) -> Result<(), AppError> {
        self.persistence.persist(&mut self.db).await
    }

    pub async fn add_project(&mut self, req: NewProjectRequest) -> Result<Project, AppError> {
        let project = repository::insert_project(&mut self.db, req).await?;
        self.persist().await?;
        Ok(project)
    }

    pub async fn update_project(
        &mut self,
        id: &str,
        req: UpdateProjectRequest,
    ) -> Result<bool, AppError> {
        let ok = repository::update_project(&mut self.db, id, req).await?;
        if ok {
            self.persist().await?;
        }
        Ok(ok)
    }

    /// Unconditional; modules and tasks of the project are removed with it.
    pub async fn delete_project(&mut self, id: &str) -> Result<bool, AppError> {
        let ok = repository::delete_project(&mut self.db, id).await?;
        self.persist().await?;
        Ok(ok)
    }

    pub async fn get_projects(&mut self) -> Result<Vec<Project>, AppError> {
        Ok(repository::fetch_projects(&mut self.db).await?)
    }

    pub async fn get_project(&mut self, id: &str) -> Result<Option<Project>, AppError> {
        Ok(repository::find_project_by_id(&mut self.db, id).await?)
    }

    pub async fn count_projects(&mut self) -> Result<i64, AppError> {
        Ok(repository::count_projects(&mut self.db).await?)
    }

    pub async fn get_modules(
        &mut self,
        project_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Module>, AppError> {
        Ok(repository::fetch_modules(&mut self.db, project_id, include_deleted).await?)
    }

    pub async fn get_module(&mut self, id: &str) -> Result<Option<Module>, AppError> {
        Ok(repository::find_module_by_id(&mut self.db, id).await?)
    }

    pub async fn find_module_by_name(
        &mut self,
        project_id: &str,
        name: &str,
        include_deleted: bool,
    ) -> Result<Option<Module>, AppError> {
        Ok(repository::find_module_by_name(&mut self.db, project_id, name, include_deleted).await?)
    }

    pub async fn add_module(&mut self, req: NewModuleRequest) -> Result<Module, AppError> {
        let module = repository::insert_module(&mut self.db, req).await?;
        self.persist().await?;
        Ok(module)
    }

    pub async fn update_module(
        &mut self,
        id: &str,
        req: UpdateModuleRequest,
    ) -> Result<bool, AppError> {
        let ok = repository::update_module(&mut self.db, id, req).await?;
        if ok {
            self.persist().await?;
        }
        Ok(ok)
    }

    /// Soft delete: the row stays and can be restored.
    pub async fn delete_module(&mut self, id: &str) -> Result<bool, AppError> {
        let ok = repository::set_module_deleted(&mut self.db, id, true).await?;
        self.persist().await?;
        Ok(ok)
    }

    pub async fn restore_module(&mut self, id: &str) -> Result<bool, AppError> {
        let ok = repository::set_module_deleted(&mut self.db, id, false).await?;
        self.persist().await?;
        Ok(ok)
    }

    /// Removes the row for good. Callers check `get_task_count_by_module` first.
    pub async fn permanent_delete_module(&mut self, id: &str) -> Result<bool, AppError> {
        let ok = repository::delete_module_row(&mut self.db, id).await?;
        self.persist().await?;
        Ok(ok)
    }

    pub async fn module_exists(
        &mut self,
        project_id: &str,
        name: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool, AppError> {
        Ok(repository::module_exists(&mut self.db, project_id, name, exclude_id).await?)
    }

    pub async fn get_tasks(&mut self, project_id: &str) -> Result<Vec<Task>, AppError> {
        Ok(repository::fetch_tasks(&mut self.db, project_id).await?)
    }

    pub async fn get_task(&mut self, id: &str) -> Result<Option<Task>, AppError> {
        Ok(repository::find_task_by_id(&mut self.db, id).await?)
    }

    pub async fn add_task(&mut self, req: NewTaskRequest) -> Result<Task, AppError> {
        let task = repository::insert_task(&mut self.db, req).await?;
        self.persist().await?;
        Ok(task)
    }

    pub async fn update_task(
        &mut self,
        id: &str,
        req: UpdateTaskRequest,
    ) -> Result<Option<Task>, AppError> {
        let task = repository::update_task(&mut self.db, id, req).await?;
        if task.is_some() {
            self.persist().await?;
        }
        Ok(task)
    }

    pub async fn delete_task(&mut self, id: &str) -> Result<Option<Task>, AppError> {
        let removed = repository::delete_task(&mut self.db, id).await?;
        self.persist().await?;
        Ok(removed)
    }

    pub async fn get_task_count_by_module(
        &mut self,
        project_id: &str,
        module: &str,
    ) -> Result<i64, AppError> {
        Ok(repository::count_tasks_by_module(&mut self.db, project_id, module).await?)
    }

    pub async fn get_pending_task_count_by_module(
        &mut self,
        project_id: &str,
        module: &str,
    ) -> Result<i64, AppError> {
        Ok(repository::count_pending_tasks_by_module(&mut self.db, project_id, module).await?)
    }

    pub async fn get_pending_task_count(&mut self, project_id: &str) -> Result<i64, AppError> {
        Ok(repository::count_pending_tasks(&mut self.db, project_id).await?)
    }

    pub async fn update_tasks_module(
        &mut self,
        project_id: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<u64, AppError> {
        let renamed =
            repository::rename_task_module(&mut self.db, project_id, old_name, new_name).await?;
        self.persist().await?;
        Ok(renamed)
    }

    pub async fn get_config(&mut self, key: &str) -> Result<Option<String>, AppError> {
        Ok(repository::find_config(&mut self.db, key).await?)
    }

    pub async fn save_config(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        repository::upsert_config(&mut self.db, key, value).await?;
        self.persist().await
    }

    pub async fn clear_all(&mut self) -> Result<(), AppError> {
        repository::clear_all(&mut self.db).await?;
        self.persist().await
    }

    /// Replaces the whole store with the contents of another store file.
    ///
    /// The candidate is loaded into a scratch store first, so a corrupt file
    /// fails before anything is touched, and the swap itself runs in one
    /// transaction. The current file is copied to `<file>.backup-<timestamp>`;
    /// that path is returned.
    pub async fn restore_from_file(&mut self, src: &Path) -> Result<Option<PathBuf>, AppError> {
        if !src.is_file() {
            return Err(AppError::Validation(format!(
                "{} is not a store file",
                src.display()
            )));
        }
        let mut candidate = connect_in_memory().await?;
        snapshot::copy_from_file(&mut candidate, src).await?;
        candidate.close().await?;

        let backup = match self.path() {
            Some(current) if current.exists() => {
                let backup = backup_path(current);
                fs::copy(current, &backup)?;
                info!("Backed up current store to {}", backup.display());
                Some(backup)
            }
            Some(_) => None,
            None => {
                warn!("In-memory store, nothing to back up before restore");
                None
            }
        };

        snapshot::replace_from_file(&mut self.db, src).await?;
        self.persist().await?;
        Ok(backup)
    }

    /// Writes the current contents to `path` without changing where this
    /// store persists.
    pub async fn save_copy(&mut self, path: &Path) -> Result<(), AppError> {
        FileSnapshot::new(path).persist(&mut self.db).await
    }
}

fn backup_path(current: &Path) -> PathBuf {
    let mut name = current
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".backup-{}", Utc::now().format("%Y%m%d%H%M%S")));
    current.with_file_name(name)
}
