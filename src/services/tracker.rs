use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{APP_CONFIG_KEY, default_app_config};
use crate::db::Store;
use crate::error::AppError;
use crate::models::{
    Module, NewModuleRequest, NewProjectRequest, NewTaskRequest, Project, Task,
    UpdateModuleRequest, UpdateProjectRequest, UpdateTaskRequest, now_timestamp,
};

/// What `create_module` did with the requested name.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "module", rename_all = "lowercase")]
pub enum ModuleOutcome {
    Created(Module),
    /// A soft-deleted module with the same name was brought back instead.
    Restored(Module),
}

impl ModuleOutcome {
    pub fn module(&self) -> &Module {
        match self {
            ModuleOutcome::Created(m) | ModuleOutcome::Restored(m) => m,
        }
    }
}

/// Caller-facing operations. Checks every rule that the store itself does
/// not enforce before anything is written.
pub struct TrackerService {
    store: Store,
}

impl TrackerService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    pub async fn list_projects(&mut self) -> Result<Vec<Project>, AppError> {
        self.store.get_projects().await
    }

    pub async fn create_project(&mut self, mut req: NewProjectRequest) -> Result<Project, AppError> {
        req.name = required(&req.name, "project name")?;
        let project = self.store.add_project(req).await?;
        info!("Created project {} ({})", project.name, project.id);
        Ok(project)
    }

    pub async fn edit_project(
        &mut self,
        id: &str,
        mut req: UpdateProjectRequest,
    ) -> Result<Project, AppError> {
        if let Some(name) = &req.name {
            req.name = Some(required(name, "project name")?);
        }
        self.project(id).await?;
        self.store.update_project(id, req).await?;
        self.project(id).await
    }

    pub async fn remove_project(&mut self, id: &str) -> Result<(), AppError> {
        let project = self.project(id).await?;
        let pending = self.store.get_pending_task_count(id).await?;
        if pending > 0 {
            return Err(AppError::Validation(format!(
                "this project still has {pending} incomplete tasks"
            )));
        }
        self.store.delete_project(id).await?;
        info!("Deleted project {} ({})", project.name, project.id);
        Ok(())
    }

    pub async fn list_modules(
        &mut self,
        project_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Module>, AppError> {
        self.store.get_modules(project_id, include_deleted).await
    }

    pub async fn create_module(
        &mut self,
        project_id: &str,
        name: &str,
    ) -> Result<ModuleOutcome, AppError> {
        let name = required(name, "module name")?;
        self.project(project_id).await?;

        if self.store.module_exists(project_id, &name, None).await? {
            if self
                .store
                .find_module_by_name(project_id, &name, false)
                .await?
                .is_some()
            {
                return Err(AppError::Conflict(format!(
                    "module \"{name}\" already exists"
                )));
            }
            if let Some(deleted) = self.store.find_module_by_name(project_id, &name, true).await? {
                self.store.restore_module(&deleted.id).await?;
                info!("Restored module {} instead of creating a duplicate", deleted.id);
                let restored = self.module(&deleted.id).await?;
                return Ok(ModuleOutcome::Restored(restored));
            }
        }

        let module = self
            .store
            .add_module(NewModuleRequest::new(project_id, name))
            .await?;
        Ok(ModuleOutcome::Created(module))
    }

    /// Renames the module and rewrites the label on its tasks. Returns the
    /// number of tasks that were relabelled.
    pub async fn rename_module(&mut self, id: &str, new_name: &str) -> Result<u64, AppError> {
        let new_name = required(new_name, "module name")?;
        let module = self.module(id).await?;
        if module.name == new_name {
            return Ok(0);
        }

        if let Some(other) = self
            .store
            .find_module_by_name(&module.project_id, &new_name, false)
            .await?
        {
            if other.id != module.id {
                return Err(AppError::Conflict(format!(
                    "module \"{new_name}\" already exists"
                )));
            }
        }

        self.store
            .update_module(
                id,
                UpdateModuleRequest {
                    name: Some(new_name.clone()),
                    order: None,
                },
            )
            .await?;
        let renamed = self
            .store
            .update_tasks_module(&module.project_id, &module.name, &new_name)
            .await?;
        debug!(
            "Renamed module {} -> {}, {} tasks relabelled",
            module.name, new_name, renamed
        );
        Ok(renamed)
    }

    pub async fn remove_module(&mut self, id: &str) -> Result<(), AppError> {
        let module = self.module(id).await?;
        let pending = self
            .store
            .get_pending_task_count_by_module(&module.project_id, &module.name)
            .await?;
        if pending > 0 {
            return Err(AppError::Validation(format!(
                "module \"{}\" still has {pending} incomplete tasks",
                module.name
            )));
        }
        self.store.delete_module(id).await?;
        Ok(())
    }

    pub async fn restore_module(&mut self, id: &str) -> Result<Module, AppError> {
        let module = self.module(id).await?;
        if !module.deleted {
            return Ok(module);
        }
        if self
            .store
            .find_module_by_name(&module.project_id, &module.name, false)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "an active module named \"{}\" already exists",
                module.name
            )));
        }
        self.store.restore_module(id).await?;
        self.module(id).await
    }

    /// Permanent delete; refused while any task still carries the module's name.
    pub async fn purge_module(&mut self, id: &str) -> Result<(), AppError> {
        let module = self.module(id).await?;
        let referenced = self
            .store
            .get_task_count_by_module(&module.project_id, &module.name)
            .await?;
        if referenced > 0 {
            return Err(AppError::Validation(format!(
                "module \"{}\" is still referenced by {referenced} tasks",
                module.name
            )));
        }
        self.store.permanent_delete_module(id).await?;
        info!("Permanently deleted module {} ({})", module.name, module.id);
        Ok(())
    }

    /// Assigns `order` 0..n following `module_ids`.
    pub async fn reorder_modules(
        &mut self,
        project_id: &str,
        module_ids: &[String],
    ) -> Result<(), AppError> {
        for (position, id) in module_ids.iter().enumerate() {
            let module = self.module(id).await?;
            if module.project_id != project_id {
                return Err(AppError::Validation(format!(
                    "module {id} does not belong to this project"
                )));
            }
            self.store
                .update_module(
                    id,
                    UpdateModuleRequest {
                        name: None,
                        order: Some(Some(position as i64)),
                    },
                )
                .await?;
        }
        Ok(())
    }

    pub async fn list_tasks(&mut self, project_id: &str) -> Result<Vec<Task>, AppError> {
        self.store.get_tasks(project_id).await
    }

    pub async fn create_task(&mut self, mut req: NewTaskRequest) -> Result<Task, AppError> {
        req.name = required(&req.name, "task name")?;
        self.project(&req.project_id).await?;
        self.store.add_task(req).await
    }

    pub async fn edit_task(&mut self, id: &str, mut req: UpdateTaskRequest) -> Result<Task, AppError> {
        if let Some(name) = &req.name {
            req.name = Some(required(name, "task name")?);
        }
        if req.is_empty() {
            return Err(AppError::Validation("nothing to update".to_string()));
        }
        self.store.update_task(id, req).await?.ok_or(AppError::NotFound)
    }

    pub async fn complete_task(&mut self, id: &str) -> Result<Task, AppError> {
        let task = self.task(id).await?;
        if task.completed {
            return Err(AppError::Validation("task is already completed".to_string()));
        }
        let update = task.completion_update(&now_timestamp());
        self.store.update_task(id, update).await?.ok_or(AppError::NotFound)
    }

    pub async fn rollback_task(&mut self, id: &str) -> Result<Task, AppError> {
        let task = self.task(id).await?;
        if !task.completed {
            return Err(AppError::Validation("task is not completed".to_string()));
        }
        self.store
            .update_task(id, task.rollback_update())
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn shelve_task(&mut self, id: &str) -> Result<Task, AppError> {
        let task = self.task(id).await?;
        if task.shelved {
            return Err(AppError::Validation("task is already shelved".to_string()));
        }
        let update = task.shelve_update(&now_timestamp());
        self.store.update_task(id, update).await?.ok_or(AppError::NotFound)
    }

    pub async fn unshelve_task(&mut self, id: &str) -> Result<Task, AppError> {
        let task = self.task(id).await?;
        if !task.shelved {
            return Err(AppError::Validation("task is not shelved".to_string()));
        }
        self.store
            .update_task(id, task.unshelve_update())
            .await?
            .ok_or(AppError::NotFound)
    }

    /// The removed task is returned; deleting its image files is up to the caller.
    pub async fn remove_task(&mut self, id: &str) -> Result<Task, AppError> {
        self.store.delete_task(id).await?.ok_or(AppError::NotFound)
    }

    pub async fn settings(&mut self) -> Result<Value, AppError> {
        match self.store.get_config(APP_CONFIG_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(default_app_config()),
        }
    }

    pub async fn save_settings(&mut self, settings: &Value) -> Result<(), AppError> {
        if !settings.is_object() {
            return Err(AppError::Validation(
                "settings must be a JSON object".to_string(),
            ));
        }
        self.store
            .save_config(APP_CONFIG_KEY, &settings.to_string())
            .await
    }

    async fn project(&mut self, id: &str) -> Result<Project, AppError> {
        self.store.get_project(id).await?.ok_or(AppError::NotFound)
    }

    async fn module(&mut self, id: &str) -> Result<Module, AppError> {
        self.store.get_module(id).await?.ok_or(AppError::NotFound)
    }

    async fn task(&mut self, id: &str) -> Result<Task, AppError> {
        self.store.get_task(id).await?.ok_or(AppError::NotFound)
    }
}

fn required(value: &str, what: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{what} is required")));
    }
    Ok(trimmed.to_string())
}
