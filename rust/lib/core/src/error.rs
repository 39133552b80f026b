use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Clients match on these,
// never on the human-readable message string.

/// Stable error code constants.
///
/// Clients should match on `code` from `{"code": "NOT_FOUND", "message": "..."}`.
/// Codes never change; messages may be reworded.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const DELETE_BLOCKED: &str = "DELETE_BLOCKED";
    pub const INTERNAL: &str = "INTERNAL";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

/// Field name → human-readable message, one entry per offending field.
pub type FieldErrors = BTreeMap<String, String>;

/// One row of a dependent entity shown in a delete-blocked response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRow {
    pub id: String,
    pub display: String,
}

/// A referencing entity that prevents a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentRecord {
    /// Slug of the referencing entity (e.g. `order_items`).
    pub entity: String,

    /// Reference field(s) on that entity through which the row is referenced.
    pub via: Vec<String>,

    /// Total number of referencing rows.
    pub count: usize,

    /// At most [`crate::guard::PREVIEW_LIMIT`] rows for display.
    pub preview: Vec<PreviewRow>,
}

// ── ServiceError ────────────────────────────────────────────────────

/// Error type returned by generated services and the runtime ops they call.
///
/// `ValidationFailed` and `DeleteBlocked` are the two structured conditions
/// of the generated application's contract. The remaining variants cover
/// plumbing: missing rows and repository failures.
///
/// ```json
/// {"code": "VALIDATION_FAILED", "message": "validation failed", "fields": {"sku": "SKU is required"}}
/// ```
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Resource does not exist. HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// One or more fields were rejected. HTTP 400.
    #[error("validation failed")]
    ValidationFailed(FieldErrors),

    /// Other rows still reference the record. HTTP 409.
    #[error("cannot delete: this record is referenced by other records")]
    DeleteBlocked(Vec<DependentRecord>),

    /// Repository backend failure. HTTP 500.
    #[error("{0}")]
    Storage(String),

    /// Unexpected internal error. HTTP 500.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Shorthand for a validation failure on a single field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), message.into());
        ServiceError::ValidationFailed(errors)
    }

    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::ValidationFailed(_) => error_code::VALIDATION_FAILED,
            ServiceError::DeleteBlocked(_) => error_code::DELETE_BLOCKED,
            ServiceError::Storage(_) => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            ServiceError::DeleteBlocked(_) => StatusCode::CONFLICT,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Field errors, if this is a validation failure.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ServiceError::ValidationFailed(errors) => Some(errors),
            _ => None,
        }
    }

    /// Dependent records, if this is a blocked delete.
    pub fn dependents(&self) -> Option<&[DependentRecord]> {
        match self {
            ServiceError::DeleteBlocked(deps) => Some(deps),
            _ => None,
        }
    }

    /// JSON body sent to clients.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        match self {
            ServiceError::ValidationFailed(errors) => {
                body["fields"] = serde_json::json!(errors);
            }
            ServiceError::DeleteBlocked(deps) => {
                body["dependents"] = serde_json::json!(deps);
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, axum::Json(self.to_json())).into_response()
    }
}
