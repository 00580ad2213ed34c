// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros so handlers, services and the database layer
/// emit the same field names (`operation`, `slug`, `survey_id`, `session_key`).

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, slug = $slug:expr) => {
        tracing::debug!(
            operation = $operation,
            slug = %$slug,
            "API operation started"
        );
    };
    ($operation:expr, id = $id:expr) => {
        tracing::debug!(
            operation = $operation,
            id = %$id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(
            operation = $operation,
            "API operation started"
        );
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, slug = $slug:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            slug = %$slug,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, id = $id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            id = %$id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            "API operation completed: {}", $msg
        );
    };
}

/// Log API operation errors with consistent structure
#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, slug = $slug:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            slug = %$slug,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, slug = $slug:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            slug = %$slug,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, session_key = $key:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            session_key = %$key,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            "API operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Service Layer Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_service_start {
    ($service:expr, $operation:expr, survey_id = $survey_id:expr) => {
        tracing::debug!(
            service = $service,
            operation = $operation,
            survey_id = %$survey_id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr) => {
        tracing::debug!(
            service = $service,
            operation = $operation,
            "Service operation started"
        );
    };
}

#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, survey_id = $survey_id:expr, answer_count = $count:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            survey_id = %$survey_id,
            answer_count = $count,
            "Service operation completed successfully"
        );
    };
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation completed: {}", $msg
        );
    };
}

#[macro_export]
macro_rules! log_service_error {
    ($service:expr, $operation:expr, survey_id = $survey_id:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            survey_id = %$survey_id,
            error = %$error,
            "Service operation failed"
        );
    };
    ($service:expr, $operation:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            error = %$error,
            "Service operation failed"
        );
    };
}

#[macro_export]
macro_rules! log_service_warn {
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::warn!(
            service = $service,
            operation = $operation,
            "Service warning: {}",
            $msg
        );
    };
}

// ============================================================================
// Database Operation Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_db_operation {
    (debug, $operation:expr, id = $id:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            id = %$id,
            "Database operation completed"
        );
    };
    (debug, $operation:expr, count = $count:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            result_count = $count,
            "Database operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "database",
            operation = $operation,
            "Database operation: {}", $msg
        );
    };
    (error, $operation:expr, error = $error:expr) => {
        tracing::error!(
            component = "database",
            operation = $operation,
            error = %$error,
            "Database operation failed"
        );
    };
}

// ============================================================================
// Cache Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_cache_event {
    (hit, survey_id = $survey_id:expr) => {
        tracing::debug!(
            component = "status_cache",
            survey_id = %$survey_id,
            "Cache hit"
        );
    };
    (miss, survey_id = $survey_id:expr) => {
        tracing::debug!(
            component = "status_cache",
            survey_id = %$survey_id,
            "Cache miss"
        );
    };
    (store, survey_id = $survey_id:expr, ttl_seconds = $ttl:expr) => {
        tracing::debug!(
            component = "status_cache",
            survey_id = %$survey_id,
            ttl_seconds = $ttl,
            "Cached survey status"
        );
    };
    (invalidate, survey_id = $survey_id:expr) => {
        tracing::debug!(
            component = "status_cache",
            survey_id = %$survey_id,
            "Invalidated survey status"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
