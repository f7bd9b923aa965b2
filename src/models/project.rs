use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub memo: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// `id` and the timestamps are only supplied when replaying an import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewProjectRequest {
    pub id: Option<String>,
    #[serde(deserialize_with = "super::null_default")]
    pub name: String,
    pub memo: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl NewProjectRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl From<Project> for NewProjectRequest {
    fn from(project: Project) -> Self {
        Self {
            id: Some(project.id),
            name: project.name,
            memo: project.memo,
            created_at: Some(project.created_at),
            updated_at: project.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    #[serde(deserialize_with = "super::double_option")]
    pub memo: Option<Option<String>>,
}

impl UpdateProjectRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.memo.is_none()
    }
}
