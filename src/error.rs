use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Schema migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Not found")]
    NotFound,
}

impl AppError {
    /// Validation, conflict and not-found errors carry a message meant for the
    /// user; everything else is an internal failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::Conflict(_) | AppError::NotFound
        )
    }
}

/// `{success, data?, error?}` shape handed to the UI layer.
#[derive(Debug, Serialize)]
pub struct OpResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> OpResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl<T> From<Result<T, AppError>> for OpResponse<T> {
    fn from(result: Result<T, AppError>) -> Self {
        match result {
            Ok(data) => OpResponse::ok(data),
            Err(err) if err.is_user_facing() => OpResponse::failure(err.to_string()),
            Err(err) => {
                error!("operation failed: {}", err);
                OpResponse::failure("Operation failed, please try again")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_keeps_message() {
        let resp: OpResponse<()> =
            Err(AppError::Validation("this project still has 2 incomplete tasks".into())).into();
        assert!(!resp.success);
        assert_eq!(
            resp.error.as_deref(),
            Some("this project still has 2 incomplete tasks")
        );
    }

    #[test]
    fn test_io_error_is_masked() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "disk says no");
        let resp: OpResponse<()> = Err(AppError::Io(io)).into();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("Operation failed, please try again"));
    }

    #[test]
    fn test_success_serializes_without_error_field() {
        let resp = OpResponse::ok(3);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 3}));
    }
}
