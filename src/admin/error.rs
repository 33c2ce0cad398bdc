//! Mapping of component errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::backup::ArchiveError;
use crate::error::{CfgError, FieldError, ValidationErrors};
use crate::store::StorageError;

/// Error returned by admin handlers.
#[derive(Debug)]
pub enum ApiError {
    Cfg(CfgError),
    NotFound(String),
    /// The blocking task running the operation failed.
    Internal(String),
}

#[derive(Serialize)]
struct FieldBody {
    field: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldBody>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Cfg(CfgError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Cfg(CfgError::Storage(StorageError::InvalidNamespace(_))) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Cfg(CfgError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Cfg(CfgError::Archive(_)) => StatusCode::BAD_REQUEST,
            ApiError::Cfg(CfgError::ProtectedPath) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CfgError> for ApiError {
    fn from(error: CfgError) -> Self {
        ApiError::Cfg(error)
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        ApiError::Cfg(error.into())
    }
}

impl From<ArchiveError> for ApiError {
    fn from(error: ArchiveError) -> Self {
        ApiError::Cfg(error.into())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(error: ValidationErrors) -> Self {
        ApiError::Cfg(error.into())
    }
}

impl From<FieldError> for ApiError {
    fn from(error: FieldError) -> Self {
        ApiError::Cfg(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Cfg(CfgError::Validation(errors)) => ErrorBody {
                error: "validation failed".to_string(),
                fields: errors
                    .into_iter()
                    .map(|e| FieldBody {
                        field: e.field,
                        message: e.message,
                    })
                    .collect(),
            },
            ApiError::Cfg(e) => {
                if status.is_server_error() {
                    tracing::error!(error = %e, "Admin request failed");
                }
                ErrorBody {
                    error: e.to_string(),
                    fields: Vec::new(),
                }
            }
            ApiError::NotFound(what) => ErrorBody {
                error: format!("{} not found", what),
                fields: Vec::new(),
            },
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Admin task failed");
                ErrorBody {
                    error: "internal error".to_string(),
                    fields: Vec::new(),
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(FieldError::on("key", "bad")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(StorageError::RestartPending).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ArchiveError::Authentication).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(CfgError::ProtectedPath).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
