use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use taskdesk::db::{MIGRATOR, Store};
use taskdesk::models::{
    CheckItem, CheckItems, CheckMode, CodeBlock, NewModuleRequest, NewProjectRequest,
    NewTaskRequest, UpdateModuleRequest, UpdateTaskRequest,
};

fn checklist() -> CheckItems {
    CheckItems {
        enabled: true,
        mode: CheckMode::Multiple,
        items: vec![
            CheckItem {
                id: "a".to_string(),
                name: "write".to_string(),
                checked: true,
                parent_id: None,
                remark: None,
            },
            CheckItem {
                id: "b".to_string(),
                name: "review".to_string(),
                checked: false,
                parent_id: Some("a".to_string()),
                remark: Some("by friday".to_string()),
            },
        ],
        linkage: false,
    }
}

#[tokio::test]
async fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("taskdesk.db");

    let (project_id, task_id) = {
        let mut store = Store::open(&path).await.expect("Failed to open store");
        assert!(path.exists(), "empty store should be written on open");

        let project = store
            .add_project(NewProjectRequest::named("P1"))
            .await
            .unwrap();
        store
            .add_module(NewModuleRequest::new(&project.id, "Mod1"))
            .await
            .unwrap();
        let mut req = NewTaskRequest::new(&project.id, "Mod1", "T1");
        req.images = vec!["shot.png".to_string()];
        req.check_items = Some(checklist());
        req.code_block = Some(CodeBlock {
            enabled: true,
            language: "sql".to_string(),
            code: "select 1;".to_string(),
        });
        let task = store.add_task(req).await.unwrap();
        store.save_config("app_config", r#"{"a":1}"#).await.unwrap();
        store.close().await.unwrap();
        (project.id, task.id)
    };

    let mut reopened = Store::open(&path).await.expect("Failed to reopen store");
    let projects = reopened.get_projects().await.unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id, project_id);

    let modules = reopened.get_modules(&project_id, false).await.unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].name, "Mod1");

    let task = reopened.get_task(&task_id).await.unwrap().expect("Task not found");
    assert_eq!(task.images, vec!["shot.png"]);
    assert_eq!(task.check_items, checklist());
    assert_eq!(task.code_block.language, "sql");
    assert_eq!(
        reopened.get_config("app_config").await.unwrap().as_deref(),
        Some(r#"{"a":1}"#)
    );
}

#[tokio::test]
async fn test_every_mutation_is_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskdesk.db");

    let mut store = Store::open(&path).await.unwrap();
    let project = store
        .add_project(NewProjectRequest::named("P1"))
        .await
        .unwrap();
    let task = store
        .add_task(NewTaskRequest::new(&project.id, "", "T1"))
        .await
        .unwrap();
    store
        .update_task(
            &task.id,
            UpdateTaskRequest {
                name: Some("T1 v2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // A second handle on the same file sees the write without the first closing.
    let mut observer = Store::open(&path).await.unwrap();
    let seen = observer.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(seen.name, "T1 v2");
}

#[tokio::test]
async fn test_cascade_delete_project() {
    let mut store = Store::in_memory().await.unwrap();
    let p1 = store.add_project(NewProjectRequest::named("P1")).await.unwrap();
    let p2 = store.add_project(NewProjectRequest::named("P2")).await.unwrap();

    for project in [&p1, &p2] {
        store
            .add_module(NewModuleRequest::new(&project.id, "Mod1"))
            .await
            .unwrap();
        store
            .add_task(NewTaskRequest::new(&project.id, "Mod1", "T1"))
            .await
            .unwrap();
    }
    let deleted = store.add_module(NewModuleRequest::new(&p1.id, "Old")).await.unwrap();
    store.delete_module(&deleted.id).await.unwrap();

    assert!(store.delete_project(&p1.id).await.unwrap());

    assert!(store.get_modules(&p1.id, true).await.unwrap().is_empty());
    assert!(store.get_tasks(&p1.id).await.unwrap().is_empty());
    assert!(store.get_module(&deleted.id).await.unwrap().is_none());
    assert_eq!(store.get_modules(&p2.id, false).await.unwrap().len(), 1);
    assert_eq!(store.get_tasks(&p2.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_soft_delete_restore_and_permanent_delete() {
    let mut store = Store::in_memory().await.unwrap();
    let project = store.add_project(NewProjectRequest::named("P1")).await.unwrap();
    let module = store
        .add_module(NewModuleRequest::new(&project.id, "Mod1"))
        .await
        .unwrap();

    store.delete_module(&module.id).await.unwrap();
    let all = store.get_modules(&project.id, true).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].deleted);
    assert!(store.get_modules(&project.id, false).await.unwrap().is_empty());

    store.restore_module(&module.id).await.unwrap();
    let restored = store.get_module(&module.id).await.unwrap().unwrap();
    assert!(!restored.deleted);
    assert_eq!(restored.name, module.name);
    assert_eq!(restored.created_at, module.created_at);

    assert_eq!(
        store.get_task_count_by_module(&project.id, "Mod1").await.unwrap(),
        0
    );
    assert!(store.permanent_delete_module(&module.id).await.unwrap());
    assert!(store.get_modules(&project.id, true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_module_exists_after_add() {
    let mut store = Store::in_memory().await.unwrap();
    let project = store.add_project(NewProjectRequest::named("P1")).await.unwrap();
    store
        .add_module(NewModuleRequest::new(&project.id, "Mod1"))
        .await
        .unwrap();

    assert!(store.module_exists(&project.id, "Mod1", None).await.unwrap());
    assert!(!store.module_exists(&project.id, "Mod2", None).await.unwrap());
}

#[tokio::test]
async fn test_update_module_partial() {
    let mut store = Store::in_memory().await.unwrap();
    let project = store.add_project(NewProjectRequest::named("P1")).await.unwrap();
    let mut req = NewModuleRequest::new(&project.id, "Mod1");
    req.order = Some(5);
    let module = store.add_module(req).await.unwrap();

    let ok = store
        .update_module(
            &module.id,
            UpdateModuleRequest {
                name: Some("Mod1b".to_string()),
                order: None,
            },
        )
        .await
        .unwrap();
    assert!(ok);

    let stored = store.get_module(&module.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Mod1b");
    assert_eq!(stored.order, Some(5));

    let missing = store
        .update_module(
            "missing",
            UpdateModuleRequest {
                name: Some("x".to_string()),
                order: None,
            },
        )
        .await
        .unwrap();
    assert!(!missing);
}

#[tokio::test]
async fn test_rename_propagation_keeps_counts() {
    let mut store = Store::in_memory().await.unwrap();
    let project = store.add_project(NewProjectRequest::named("P1")).await.unwrap();
    for name in ["t1", "t2", "t3"] {
        store
            .add_task(NewTaskRequest::new(&project.id, "A", name))
            .await
            .unwrap();
    }
    store
        .add_task(NewTaskRequest::new(&project.id, "B", "already b"))
        .await
        .unwrap();

    let before_a = store.get_task_count_by_module(&project.id, "A").await.unwrap();
    let before_b = store.get_task_count_by_module(&project.id, "B").await.unwrap();

    store.update_tasks_module(&project.id, "A", "B").await.unwrap();

    let tasks = store.get_tasks(&project.id).await.unwrap();
    assert_eq!(tasks.iter().filter(|t| t.module == "A").count(), 0);
    assert_eq!(
        tasks.iter().filter(|t| t.module == "B").count() as i64,
        before_a + before_b
    );
}

#[tokio::test]
async fn test_tasks_newest_first_with_coerced_flags() {
    let mut store = Store::in_memory().await.unwrap();
    let project = store.add_project(NewProjectRequest::named("P1")).await.unwrap();

    let mut older = NewTaskRequest::new(&project.id, "", "older");
    older.created_at = Some("2025-01-01T00:00:00+00:00".to_string());
    older.completed = true;
    older.shelved = true;
    store.add_task(older).await.unwrap();
    store
        .add_task(NewTaskRequest::new(&project.id, "", "newer"))
        .await
        .unwrap();

    let tasks = store.get_tasks(&project.id).await.unwrap();
    assert_eq!(tasks[0].name, "newer");
    assert_eq!(tasks[1].name, "older");
    assert!(tasks[1].completed);
    assert!(tasks[1].shelved);
    assert!(!tasks[0].completed);
}

#[tokio::test]
async fn test_delete_task_returns_removed_row() {
    let mut store = Store::in_memory().await.unwrap();
    let project = store.add_project(NewProjectRequest::named("P1")).await.unwrap();
    let mut req = NewTaskRequest::new(&project.id, "", "with images");
    req.images = vec!["one.png".to_string(), "two.png".to_string()];
    let task = store.add_task(req).await.unwrap();

    let removed = store.delete_task(&task.id).await.unwrap().expect("Task not found");
    assert_eq!(removed.images, vec!["one.png", "two.png"]);
    assert!(store.get_task(&task.id).await.unwrap().is_none());
    assert!(store.delete_task(&task.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_restore_from_file_backs_up_current() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.db");
    let target_path = dir.path().join("target.db");

    let mut source = Store::open(&source_path).await.unwrap();
    source
        .add_project(NewProjectRequest::named("from source"))
        .await
        .unwrap();
    source.close().await.unwrap();

    let mut target = Store::open(&target_path).await.unwrap();
    target
        .add_project(NewProjectRequest::named("will be replaced"))
        .await
        .unwrap();

    let backup = target
        .restore_from_file(&source_path)
        .await
        .unwrap()
        .expect("backup path");
    assert!(backup.exists());

    let names: Vec<_> = target
        .get_projects()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["from source"]);

    let mut old = Store::open(&backup).await.unwrap();
    let old_names: Vec<_> = old
        .get_projects()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(old_names, vec!["will be replaced"]);
}

#[tokio::test]
async fn test_restore_from_corrupt_file_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.db");
    std::fs::write(&bogus, b"definitely not sqlite").unwrap();

    let mut store = Store::in_memory().await.unwrap();
    store
        .add_project(NewProjectRequest::named("keep me"))
        .await
        .unwrap();

    assert!(store.restore_from_file(&bogus).await.is_err());
    assert_eq!(store.get_projects().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_open_creates_file_and_loads_rows_written_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let fresh = dir.path().join("fresh.db");
    Store::open(&fresh).await.expect("Failed to open fresh store");
    assert!(fresh.is_file());

    let existing = dir.path().join("existing.db");
    let mut file_db = SqliteConnectOptions::new()
        .filename(&existing)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();
    MIGRATOR.run(&mut file_db).await.unwrap();
    sqlx::query(
        "INSERT INTO projects (id, name, created_at) VALUES ('p-disk', 'Written elsewhere', '2026-03-01T00:00:00+00:00')",
    )
    .execute(&mut file_db)
    .await
    .unwrap();
    file_db.close().await.unwrap();

    let mut store = Store::open(&existing).await.unwrap();
    let project = store
        .get_project("p-disk")
        .await
        .unwrap()
        .expect("row from the file should be loaded");
    assert_eq!(project.name, "Written elsewhere");
}

#[tokio::test]
async fn test_restore_from_non_store_file_keeps_file_backed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskdesk.db");
    let bogus = dir.path().join("photo.png");
    std::fs::write(&bogus, vec![0x89u8; 4096]).unwrap();

    let mut store = Store::open(&path).await.unwrap();
    store
        .add_project(NewProjectRequest::named("keep me"))
        .await
        .unwrap();

    assert!(store.restore_from_file(&bogus).await.is_err());
    assert_eq!(store.get_projects().await.unwrap().len(), 1);

    let mut reopened = Store::open(&path).await.unwrap();
    assert_eq!(reopened.get_projects().await.unwrap()[0].name, "keep me");
}
