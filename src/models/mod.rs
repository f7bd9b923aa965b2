pub mod module;
pub mod project;
pub mod task;

use chrono::Utc;
use serde::{Deserialize, Deserializer};

pub use module::{Module, NewModuleRequest, UpdateModuleRequest};
pub use project::{NewProjectRequest, Project, UpdateProjectRequest};
pub use task::{
    CheckItem, CheckItems, CheckMode, CodeBlock, NewTaskRequest, Task, TaskRow, UpdateTaskRequest,
};

/// RFC 3339 timestamp used for every created/updated/completed stamp.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
/// Pair with `#[serde(default)]`.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Legacy files written `null` where a value was expected.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Accepts `true`/`false`, `0`/`1` and `null` for boolean flags.
pub(crate) fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        None => false,
    })
}
