use sqlx::SqliteConnection;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{
    CheckItems, CodeBlock, Module, NewModuleRequest, NewProjectRequest, NewTaskRequest, Project,
    Task, TaskRow, UpdateModuleRequest, UpdateProjectRequest, UpdateTaskRequest, now_timestamp,
};

const PROJECT_COLUMNS: &str = "id, name, memo, created_at, updated_at";

const MODULE_COLUMNS: &str = "id, project_id, name, sort_order, deleted, created_at, updated_at";

const TASK_COLUMNS: &str = "id, project_id, module, name, task_type, initiator, remark, images, \
     code_block, check_items, check_items_before_complete, completed, shelved, created_at, \
     completed_at, shelved_at, updated_at";

pub async fn fetch_projects(db: &mut SqliteConnection) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at DESC, rowid DESC"
    ))
    .fetch_all(&mut *db)
    .await
}

pub async fn find_project_by_id(
    db: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *db)
        .await
}

pub async fn count_projects(db: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects")
        .fetch_one(&mut *db)
        .await
}

pub async fn insert_project(
    db: &mut SqliteConnection,
    req: NewProjectRequest,
) -> Result<Project, sqlx::Error> {
    let id = req.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let created_at = req.created_at.unwrap_or_else(now_timestamp);
    let updated_at = req.updated_at.or_else(|| Some(created_at.clone()));

    sqlx::query(
        r#"
        INSERT INTO projects (id, name, memo, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&id)
    .bind(&req.name)
    .bind(&req.memo)
    .bind(&created_at)
    .bind(&updated_at)
    .execute(&mut *db)
    .await?;

    Ok(Project {
        id,
        name: req.name,
        memo: req.memo,
        created_at,
        updated_at,
    })
}

pub async fn update_project(
    db: &mut SqliteConnection,
    id: &str,
    req: UpdateProjectRequest,
) -> Result<bool, sqlx::Error> {
    if req.is_empty() {
        return Ok(false);
    }
    let mut current = match find_project_by_id(db, id).await? {
        Some(p) => p,
        None => return Ok(false),
    };

    if let Some(name) = req.name {
        current.name = name;
    }
    if let Some(memo) = req.memo {
        current.memo = memo;
    }

    let result = sqlx::query(
        r#"
        UPDATE projects
        SET name = ?1,
            memo = ?2,
            updated_at = ?3
        WHERE id = ?4
        "#,
    )
    .bind(&current.name)
    .bind(&current.memo)
    .bind(now_timestamp())
    .bind(id)
    .execute(&mut *db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

/// Modules and tasks go with the project through `ON DELETE CASCADE`.
pub async fn delete_project(db: &mut SqliteConnection, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM projects WHERE id = ?1")
        .bind(id)
        .execute(&mut *db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

pub async fn fetch_modules(
    db: &mut SqliteConnection,
    project_id: &str,
    include_deleted: bool,
) -> Result<Vec<Module>, sqlx::Error> {
    sqlx::query_as::<_, Module>(&format!(
        r#"
        SELECT {MODULE_COLUMNS}
        FROM modules
        WHERE project_id = ?1 AND (?2 OR deleted = 0)
        ORDER BY sort_order ASC, created_at ASC, rowid ASC
        "#
    ))
    .bind(project_id)
    .bind(include_deleted)
    .fetch_all(&mut *db)
    .await
}

pub async fn find_module_by_id(
    db: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Module>, sqlx::Error> {
    sqlx::query_as::<_, Module>(&format!("SELECT {MODULE_COLUMNS} FROM modules WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *db)
        .await
}

/// Active rows win over soft-deleted ones, newer generations over older.
pub async fn find_module_by_name(
    db: &mut SqliteConnection,
    project_id: &str,
    name: &str,
    include_deleted: bool,
) -> Result<Option<Module>, sqlx::Error> {
    sqlx::query_as::<_, Module>(&format!(
        r#"
        SELECT {MODULE_COLUMNS}
        FROM modules
        WHERE project_id = ?1 AND name = ?2 AND (?3 OR deleted = 0)
        ORDER BY deleted ASC, created_at DESC, rowid DESC
        LIMIT 1
        "#
    ))
    .bind(project_id)
    .bind(name)
    .bind(include_deleted)
    .fetch_optional(&mut *db)
    .await
}

pub async fn insert_module(
    db: &mut SqliteConnection,
    req: NewModuleRequest,
) -> Result<Module, sqlx::Error> {
    let id = req.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let created_at = req.created_at.unwrap_or_else(now_timestamp);
    let updated_at = req.updated_at.or_else(|| Some(created_at.clone()));

    sqlx::query(
        r#"
        INSERT INTO modules (id, project_id, name, sort_order, deleted, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&id)
    .bind(&req.project_id)
    .bind(&req.name)
    .bind(req.order)
    .bind(req.deleted)
    .bind(&created_at)
    .bind(&updated_at)
    .execute(&mut *db)
    .await?;

    Ok(Module {
        id,
        project_id: req.project_id,
        name: req.name,
        order: req.order,
        deleted: req.deleted,
        created_at,
        updated_at,
    })
}

pub async fn update_module(
    db: &mut SqliteConnection,
    id: &str,
    req: UpdateModuleRequest,
) -> Result<bool, sqlx::Error> {
    if req.is_empty() {
        return Ok(false);
    }
    let mut current = match find_module_by_id(db, id).await? {
        Some(m) => m,
        None => return Ok(false),
    };

    if let Some(name) = req.name {
        current.name = name;
    }
    if let Some(order) = req.order {
        current.order = order;
    }

    let result = sqlx::query(
        r#"
        UPDATE modules
        SET name = ?1,
            sort_order = ?2,
            updated_at = ?3
        WHERE id = ?4
        "#,
    )
    .bind(&current.name)
    .bind(current.order)
    .bind(now_timestamp())
    .bind(id)
    .execute(&mut *db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

/// Soft delete (`deleted = true`) or restore (`deleted = false`).
pub async fn set_module_deleted(
    db: &mut SqliteConnection,
    id: &str,
    deleted: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE modules
        SET deleted = ?2,
            updated_at = ?3
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(deleted)
    .bind(now_timestamp())
    .execute(&mut *db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

pub async fn delete_module_row(db: &mut SqliteConnection, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM modules WHERE id = ?1")
        .bind(id)
        .execute(&mut *db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

/// Soft-deleted rows count as existing.
pub async fn module_exists(
    db: &mut SqliteConnection,
    project_id: &str,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM modules
        WHERE project_id = ?1 AND name = ?2 AND (?3 IS NULL OR id != ?3)
        "#,
    )
    .bind(project_id)
    .bind(name)
    .bind(exclude_id)
    .fetch_one(&mut *db)
    .await?;

    Ok(count > 0)
}

pub async fn fetch_tasks(
    db: &mut SqliteConnection,
    project_id: &str,
) -> Result<Vec<Task>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        r#"
        SELECT {TASK_COLUMNS}
        FROM tasks
        WHERE project_id = ?1
        ORDER BY created_at DESC, rowid DESC
        "#
    ))
    .bind(project_id)
    .fetch_all(&mut *db)
    .await?;

    Ok(rows.into_iter().map(Task::from).collect())
}

pub async fn find_task_by_id(
    db: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Task>, sqlx::Error> {
    let row = sqlx::query_as::<_, TaskRow>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *db)
        .await?;

    Ok(row.map(Task::from))
}

pub async fn insert_task(
    db: &mut SqliteConnection,
    req: NewTaskRequest,
) -> Result<Task, sqlx::Error> {
    let created_at = req.created_at.unwrap_or_else(now_timestamp);
    let task = Task {
        id: req.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        project_id: req.project_id,
        module: req.module,
        name: req.name,
        task_type: req.task_type,
        initiator: req.initiator,
        remark: req.remark,
        images: req.images,
        code_block: req.code_block.unwrap_or_default(),
        check_items: req.check_items.unwrap_or_default(),
        check_items_before_complete: req.check_items_before_complete,
        completed: req.completed,
        shelved: req.shelved,
        updated_at: req.updated_at.or_else(|| Some(created_at.clone())),
        created_at,
        completed_at: req.completed_at,
        shelved_at: req.shelved_at,
    };

    sqlx::query(
        r#"
        INSERT INTO tasks
            (id, project_id, module, name, task_type, initiator, remark, images,
            code_block, check_items, check_items_before_complete, completed, shelved,
            created_at, completed_at, shelved_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
    )
    .bind(&task.id)
    .bind(&task.project_id)
    .bind(&task.module)
    .bind(&task.name)
    .bind(&task.task_type)
    .bind(&task.initiator)
    .bind(&task.remark)
    .bind(Json(&task.images))
    .bind(Json(&task.code_block))
    .bind(Json(&task.check_items))
    .bind(task.check_items_before_complete.as_ref().map(Json))
    .bind(task.completed)
    .bind(task.shelved)
    .bind(&task.created_at)
    .bind(&task.completed_at)
    .bind(&task.shelved_at)
    .bind(&task.updated_at)
    .execute(&mut *db)
    .await?;

    Ok(task)
}

/// Returns the re-read row, or `None` when nothing was supplied or the id is unknown.
pub async fn update_task(
    db: &mut SqliteConnection,
    id: &str,
    req: UpdateTaskRequest,
) -> Result<Option<Task>, sqlx::Error> {
    if req.is_empty() {
        return Ok(None);
    }
    let mut current = match find_task_by_id(db, id).await? {
        Some(t) => t,
        None => return Ok(None),
    };
    req.apply_to(&mut current);

    sqlx::query(
        r#"
        UPDATE tasks
        SET module = ?1,
            name = ?2,
            task_type = ?3,
            initiator = ?4,
            remark = ?5,
            images = ?6,
            code_block = ?7,
            check_items = ?8,
            check_items_before_complete = ?9,
            completed = ?10,
            shelved = ?11,
            completed_at = ?12,
            shelved_at = ?13,
            updated_at = ?14
        WHERE id = ?15
        "#,
    )
    .bind(&current.module)
    .bind(&current.name)
    .bind(&current.task_type)
    .bind(&current.initiator)
    .bind(&current.remark)
    .bind(Json(&current.images))
    .bind(Json(&current.code_block))
    .bind(Json(&current.check_items))
    .bind(current.check_items_before_complete.as_ref().map(Json))
    .bind(current.completed)
    .bind(current.shelved)
    .bind(&current.completed_at)
    .bind(&current.shelved_at)
    .bind(now_timestamp())
    .bind(id)
    .execute(&mut *db)
    .await?;

    find_task_by_id(db, id).await
}

/// Hard delete; the removed row is handed back so its images can be cleaned up.
pub async fn delete_task(db: &mut SqliteConnection, id: &str) -> Result<Option<Task>, sqlx::Error> {
    let existing = find_task_by_id(db, id).await?;
    if existing.is_some() {
        sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(&mut *db)
            .await?;
    }
    Ok(existing)
}

pub async fn count_tasks_by_module(
    db: &mut SqliteConnection,
    project_id: &str,
    module: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND module = ?2")
        .bind(project_id)
        .bind(module)
        .fetch_one(&mut *db)
        .await
}

pub async fn count_pending_tasks_by_module(
    db: &mut SqliteConnection,
    project_id: &str,
    module: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND module = ?2 AND completed = 0",
    )
    .bind(project_id)
    .bind(module)
    .fetch_one(&mut *db)
    .await
}

pub async fn count_pending_tasks(
    db: &mut SqliteConnection,
    project_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND completed = 0",
    )
    .bind(project_id)
    .fetch_one(&mut *db)
    .await
}

/// Rewrites the denormalized `module` label on every matching task.
pub async fn rename_task_module(
    db: &mut SqliteConnection,
    project_id: &str,
    old_name: &str,
    new_name: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET module = ?3,
            updated_at = ?4
        WHERE project_id = ?1 AND module = ?2
        "#,
    )
    .bind(project_id)
    .bind(old_name)
    .bind(new_name)
    .bind(now_timestamp())
    .execute(&mut *db)
    .await?
    .rows_affected();

    Ok(result)
}

pub async fn find_config(db: &mut SqliteConnection, key: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT value FROM config WHERE key = ?1")
        .bind(key)
        .fetch_optional(&mut *db)
        .await
}

/// Update first; insert only when no row existed.
pub async fn upsert_config(
    db: &mut SqliteConnection,
    key: &str,
    value: &str,
) -> Result<(), sqlx::Error> {
    let now = now_timestamp();
    let updated = sqlx::query("UPDATE config SET value = ?2, updated_at = ?3 WHERE key = ?1")
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&mut *db)
        .await?
        .rows_affected();

    if updated == 0 {
        sqlx::query("INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)")
            .bind(key)
            .bind(value)
            .bind(&now)
            .execute(&mut *db)
            .await?;
    }

    Ok(())
}

pub async fn clear_all(db: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for table in ["tasks", "modules", "projects", "config"] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *db)
            .await?;
    }
    Ok(())
}
