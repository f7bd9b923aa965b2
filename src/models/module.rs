use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[sqlx(rename = "sort_order")]
    pub order: Option<i64>,
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewModuleRequest {
    pub id: Option<String>,
    #[serde(deserialize_with = "super::null_default")]
    pub project_id: String,
    #[serde(deserialize_with = "super::null_default")]
    pub name: String,
    pub order: Option<i64>,
    #[serde(deserialize_with = "super::flag")]
    pub deleted: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl NewModuleRequest {
    pub fn new(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

impl From<Module> for NewModuleRequest {
    fn from(module: Module) -> Self {
        Self {
            id: Some(module.id),
            project_id: module.project_id,
            name: module.name,
            order: module.order,
            deleted: module.deleted,
            created_at: Some(module.created_at),
            updated_at: module.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateModuleRequest {
    pub name: Option<String>,
    #[serde(deserialize_with = "super::double_option")]
    pub order: Option<Option<i64>>,
}

impl UpdateModuleRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.order.is_none()
    }
}
