use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeBlock {
    pub enabled: bool,
    pub language: String,
    pub code: String,
}

impl Default for CodeBlock {
    fn default() -> Self {
        Self {
            enabled: false,
            language: "javascript".to_string(),
            code: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    Single,
    #[default]
    Multiple,
}

/// One checklist entry. `parent_id` points at another item of the same list;
/// the tree is never validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckItem {
    pub id: String,
    pub name: String,
    pub checked: bool,
    pub parent_id: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckItems {
    pub enabled: bool,
    pub mode: CheckMode,
    pub items: Vec<CheckItem>,
    pub linkage: bool,
}

impl CheckItems {
    pub fn all_checked(&self) -> CheckItems {
        let mut checked = self.clone();
        for item in &mut checked.items {
            item.checked = true;
        }
        checked
    }

    pub fn checked_count(&self) -> usize {
        self.items.iter().filter(|item| item.checked).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub module: String,
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub initiator: Option<String>,
    pub remark: Option<String>,
    pub images: Vec<String>,
    pub code_block: CodeBlock,
    pub check_items: CheckItems,
    pub check_items_before_complete: Option<CheckItems>,
    pub completed: bool,
    pub shelved: bool,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub shelved_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Task {
    /// Marks the task done: every checklist item is force-checked and the
    /// previous checklist is kept so a rollback can restore it.
    pub fn completion_update(&self, at: &str) -> UpdateTaskRequest {
        UpdateTaskRequest {
            completed: Some(true),
            completed_at: Some(Some(at.to_string())),
            check_items: Some(self.check_items.all_checked()),
            check_items_before_complete: Some(Some(self.check_items.clone())),
            ..Default::default()
        }
    }

    pub fn rollback_update(&self) -> UpdateTaskRequest {
        let restored = self
            .check_items_before_complete
            .clone()
            .unwrap_or_else(|| self.check_items.clone());

        UpdateTaskRequest {
            completed: Some(false),
            completed_at: Some(None),
            check_items: Some(restored),
            check_items_before_complete: Some(None),
            ..Default::default()
        }
    }

    pub fn shelve_update(&self, at: &str) -> UpdateTaskRequest {
        UpdateTaskRequest {
            shelved: Some(true),
            shelved_at: Some(Some(at.to_string())),
            ..Default::default()
        }
    }

    pub fn unshelve_update(&self) -> UpdateTaskRequest {
        UpdateTaskRequest {
            shelved: Some(false),
            shelved_at: Some(None),
            ..Default::default()
        }
    }
}

/// Row shape of the `tasks` table. Sub-documents live in TEXT columns as JSON.
#[derive(Debug, FromRow)]
pub struct TaskRow {
    pub id: String,
    pub project_id: String,
    pub module: String,
    pub name: String,
    pub task_type: String,
    pub initiator: Option<String>,
    pub remark: Option<String>,
    pub images: Json<Vec<String>>,
    pub code_block: Json<CodeBlock>,
    pub check_items: Json<CheckItems>,
    pub check_items_before_complete: Option<Json<CheckItems>>,
    pub completed: bool,
    pub shelved: bool,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub shelved_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: row.id,
            project_id: row.project_id,
            module: row.module,
            name: row.name,
            task_type: row.task_type,
            initiator: row.initiator,
            remark: row.remark,
            images: row.images.0,
            code_block: row.code_block.0,
            check_items: row.check_items.0,
            check_items_before_complete: row.check_items_before_complete.map(|j| j.0),
            completed: row.completed,
            shelved: row.shelved,
            created_at: row.created_at,
            completed_at: row.completed_at,
            shelved_at: row.shelved_at,
            updated_at: row.updated_at,
        }
    }
}

/// Every field past `name` is optional so legacy files and export documents
/// can be replayed with their original flags and timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTaskRequest {
    pub id: Option<String>,
    #[serde(deserialize_with = "super::null_default")]
    pub project_id: String,
    #[serde(deserialize_with = "super::null_default")]
    pub module: String,
    #[serde(deserialize_with = "super::null_default")]
    pub name: String,
    #[serde(rename = "type", deserialize_with = "super::null_default")]
    pub task_type: String,
    pub initiator: Option<String>,
    pub remark: Option<String>,
    #[serde(deserialize_with = "super::null_default")]
    pub images: Vec<String>,
    pub code_block: Option<CodeBlock>,
    pub check_items: Option<CheckItems>,
    pub check_items_before_complete: Option<CheckItems>,
    #[serde(deserialize_with = "super::flag")]
    pub completed: bool,
    #[serde(deserialize_with = "super::flag")]
    pub shelved: bool,
    pub created_at: Option<String>,
    pub completed_at: Option<String>,
    pub shelved_at: Option<String>,
    pub updated_at: Option<String>,
}

impl NewTaskRequest {
    pub fn new(
        project_id: impl Into<String>,
        module: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            module: module.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

impl From<Task> for NewTaskRequest {
    fn from(task: Task) -> Self {
        Self {
            id: Some(task.id),
            project_id: task.project_id,
            module: task.module,
            name: task.name,
            task_type: task.task_type,
            initiator: task.initiator,
            remark: task.remark,
            images: task.images,
            code_block: Some(task.code_block),
            check_items: Some(task.check_items),
            check_items_before_complete: task.check_items_before_complete,
            completed: task.completed,
            shelved: task.shelved,
            created_at: Some(task.created_at),
            completed_at: task.completed_at,
            shelved_at: task.shelved_at,
            updated_at: task.updated_at,
        }
    }
}

/// Partial update. `None` leaves a column untouched; for nullable columns
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateTaskRequest {
    pub module: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    #[serde(deserialize_with = "super::double_option")]
    pub initiator: Option<Option<String>>,
    #[serde(deserialize_with = "super::double_option")]
    pub remark: Option<Option<String>>,
    pub images: Option<Vec<String>>,
    pub code_block: Option<CodeBlock>,
    pub check_items: Option<CheckItems>,
    #[serde(deserialize_with = "super::double_option")]
    pub check_items_before_complete: Option<Option<CheckItems>>,
    pub completed: Option<bool>,
    pub shelved: Option<bool>,
    #[serde(deserialize_with = "super::double_option")]
    pub completed_at: Option<Option<String>>,
    #[serde(deserialize_with = "super::double_option")]
    pub shelved_at: Option<Option<String>>,
}

impl UpdateTaskRequest {
    pub fn is_empty(&self) -> bool {
        self.module.is_none()
            && self.name.is_none()
            && self.task_type.is_none()
            && self.initiator.is_none()
            && self.remark.is_none()
            && self.images.is_none()
            && self.code_block.is_none()
            && self.check_items.is_none()
            && self.check_items_before_complete.is_none()
            && self.completed.is_none()
            && self.shelved.is_none()
            && self.completed_at.is_none()
            && self.shelved_at.is_none()
    }

    /// Writes the supplied fields onto `task`, leaving the rest as they were.
    pub fn apply_to(self, task: &mut Task) {
        if let Some(module) = self.module {
            task.module = module;
        }
        if let Some(name) = self.name {
            task.name = name;
        }
        if let Some(task_type) = self.task_type {
            task.task_type = task_type;
        }
        if let Some(initiator) = self.initiator {
            task.initiator = initiator;
        }
        if let Some(remark) = self.remark {
            task.remark = remark;
        }
        if let Some(images) = self.images {
            task.images = images;
        }
        if let Some(code_block) = self.code_block {
            task.code_block = code_block;
        }
        if let Some(check_items) = self.check_items {
            task.check_items = check_items;
        }
        if let Some(before) = self.check_items_before_complete {
            task.check_items_before_complete = before;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(shelved) = self.shelved {
            task.shelved = shelved;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        if let Some(shelved_at) = self.shelved_at {
            task.shelved_at = shelved_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checklist(checked: &[bool]) -> CheckItems {
        CheckItems {
            enabled: true,
            mode: CheckMode::Multiple,
            items: checked
                .iter()
                .enumerate()
                .map(|(i, &checked)| CheckItem {
                    id: format!("item-{i}"),
                    name: format!("step {i}"),
                    checked,
                    parent_id: if i > 0 { Some("item-0".to_string()) } else { None },
                    remark: None,
                })
                .collect(),
            linkage: true,
        }
    }

    fn sample_task(check_items: CheckItems) -> Task {
        Task {
            id: "t1".to_string(),
            project_id: "p1".to_string(),
            module: "Mod1".to_string(),
            name: "T1".to_string(),
            task_type: "bug".to_string(),
            initiator: None,
            remark: None,
            images: vec!["a.png".to_string()],
            code_block: CodeBlock::default(),
            check_items,
            check_items_before_complete: None,
            completed: false,
            shelved: false,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            completed_at: None,
            shelved_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_default_shapes_serialize_as_stored() {
        let code = serde_json::to_value(CodeBlock::default()).unwrap();
        assert_eq!(
            code,
            serde_json::json!({"enabled": false, "language": "javascript", "code": ""})
        );

        let items = serde_json::to_value(CheckItems::default()).unwrap();
        assert_eq!(
            items,
            serde_json::json!({"enabled": false, "mode": "multiple", "items": [], "linkage": false})
        );
    }

    #[test]
    fn test_check_item_uses_camel_case_parent() {
        let json = r#"{"id":"b","name":"child","checked":true,"parentId":"a","remark":null}"#;
        let item: CheckItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.parent_id.as_deref(), Some("a"));
        assert!(item.checked);

        let back = serde_json::to_string(&item).unwrap();
        let again: CheckItem = serde_json::from_str(&back).unwrap();
        assert_eq!(again, item);
    }

    #[test]
    fn test_completion_then_rollback_restores_checklist() {
        let original = checklist(&[true, false, true, false]);
        let mut task = sample_task(original.clone());

        task.completion_update("2026-02-01T00:00:00+00:00")
            .apply_to(&mut task);
        assert!(task.completed);
        assert_eq!(task.check_items.checked_count(), 4);
        assert_eq!(task.check_items_before_complete.as_ref(), Some(&original));

        task.rollback_update().apply_to(&mut task);
        assert!(!task.completed);
        assert!(task.completed_at.is_none());
        assert_eq!(task.check_items, original);
        assert_eq!(task.check_items.checked_count(), 2);
        assert!(task.check_items_before_complete.is_none());
    }

    #[test]
    fn test_shelve_is_independent_of_completion() {
        let mut task = sample_task(CheckItems::default());
        task.completion_update("2026-02-01T00:00:00+00:00")
            .apply_to(&mut task);
        task.shelve_update("2026-02-02T00:00:00+00:00")
            .apply_to(&mut task);

        assert!(task.completed);
        assert!(task.shelved);

        task.unshelve_update().apply_to(&mut task);
        assert!(task.completed);
        assert!(!task.shelved);
        assert!(task.shelved_at.is_none());
    }

    #[test]
    fn test_update_request_distinguishes_null_from_absent() {
        let req: UpdateTaskRequest =
            serde_json::from_str(r#"{"remark":null,"name":"renamed"}"#).unwrap();
        assert_eq!(req.remark, Some(None));
        assert_eq!(req.name.as_deref(), Some("renamed"));
        assert!(req.initiator.is_none());
        assert!(!req.is_empty());

        let empty: UpdateTaskRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_legacy_task_flags_accept_numbers_and_nulls() {
        let json = r#"{
            "id": "legacy-1",
            "projectId": "p1",
            "module": null,
            "name": "old task",
            "type": "feature",
            "images": null,
            "completed": 1,
            "shelved": null
        }"#;
        let req: NewTaskRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.module, "");
        assert!(req.images.is_empty());
        assert!(req.completed);
        assert!(!req.shelved);
        assert!(req.code_block.is_none());
    }
}
