use crate::api::ApiResponse;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::{error, info, warn};

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),

    #[error("Resource already exists: {0}")]
    DuplicateResource(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    /// Rendered as a plain-text body, never JSON.
    #[error("{0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateResource(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::DatabaseError(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(self, context: ErrorContext) -> Response {
        let status = self.status_code();
        match &self {
            ApiError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                let message = context
                    .user_friendly_message
                    .unwrap_or_else(|| format!("{} not found", context.resource_type));
                (status, Json(ApiResponse::<()>::error(message))).into_response()
            }
            ApiError::ValidationError(_) | ApiError::BadRequest(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Rejected request"
                );
                (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
            }
            ApiError::DuplicateResource(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Duplicate resource"
                );
                (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
            }
            ApiError::Unauthorized(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    error = %self,
                    "Unauthenticated request"
                );
                (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
            }
            ApiError::Forbidden(message) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Permission denied"
                );
                (
                    status,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    message.clone(),
                )
                    .into_response()
            }
            ApiError::DatabaseError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
                (
                    status,
                    Json(ApiResponse::<()>::error(
                        "Database operation failed. Please try again.".to_string(),
                    )),
                )
                    .into_response()
            }
            ApiError::InternalError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Internal server error"
                );
                (
                    status,
                    Json(ApiResponse::<()>::error(
                        "An internal error occurred. Please try again.".to_string(),
                    )),
                )
                    .into_response()
            }
        }
    }

    /// Simple conversion without context
    pub fn to_response(self) -> Response {
        let context = ErrorContext::new("unknown", "resource");
        self.to_response_with_context(context)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.to_response()
    }
}

/// Helper macro for structured error responses
#[macro_export]
macro_rules! api_error {
    (not_found, $operation:expr, $resource_type:expr, $id:expr) => {
        $crate::errors::ApiError::NotFound(format!("{} with id '{}' not found", $resource_type, $id))
            .to_response_with_context(
                $crate::errors::ErrorContext::new($operation, $resource_type).with_id(&$id.to_string()),
            )
    };

    (validation, $operation:expr, $resource_type:expr, $message:expr) => {
        $crate::errors::ApiError::ValidationError($message.to_string())
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };

    (forbidden, $operation:expr, $resource_type:expr, $message:expr) => {
        $crate::errors::ApiError::Forbidden($message.to_string())
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };

    (database, $operation:expr, $resource_type:expr, $error:expr) => {
        $crate::errors::classify_database_error(&$error)
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(anyhow::Error::from(err))
    }
}

/// Recover an [`ApiError`] raised inside a service, or classify a raw
/// database failure.
pub fn into_api_error(error: anyhow::Error) -> ApiError {
    match error.downcast::<ApiError>() {
        Ok(api_error) => api_error,
        Err(other) => classify_database_error(&other),
    }
}

/// Helper function to detect error types from anyhow error messages
pub fn classify_database_error(error: &anyhow::Error) -> ApiError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("already exists") || error_str.contains("unique constraint") {
        // sqlite reports "UNIQUE constraint failed: table.column"
        if let Some(start) = error_str.find("failed: ") {
            let identifier = error_str[start + 8..].trim();
            return ApiError::DuplicateResource(format!("'{}' must be unique", identifier));
        }
        ApiError::DuplicateResource("Resource already exists".to_string())
    } else if error_str.contains("not found") || error_str.contains("no rows") {
        ApiError::NotFound("Resource not found".to_string())
    } else if error_str.contains("foreign key constraint") {
        ApiError::ValidationError("Referenced resource does not exist".to_string())
    } else if error_str.contains("required") || error_str.contains("cannot be null") {
        ApiError::ValidationError("Required field is missing or invalid".to_string())
    } else {
        ApiError::DatabaseError(anyhow::anyhow!("{}", error))
    }
}
