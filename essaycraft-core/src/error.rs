//! essaycraft error types
//!
//! Re-exports essaycraft-error and provides workflow-specific conveniences.

pub use essaycraft_error::{Error, ErrorKind, ErrorStatus, Result};

use crate::provider::ProviderError;

// =============================================================================
// Workflow-specific error constructors
// =============================================================================

/// Create a StateNotFound error
pub fn state_not_found(session_id: impl Into<String>) -> Error {
    Error::state_not_found(session_id)
}

/// Create a ConfigInvalid error
pub fn config_invalid(message: impl Into<String>) -> Error {
    Error::config_invalid(message)
}

/// Create a SchemaValidation error
pub fn schema_validation(message: impl Into<String>) -> Error {
    Error::schema_validation(message)
}

/// Create a StorageFailed error
pub fn storage_failed(reason: impl Into<String>) -> Error {
    Error::new(ErrorKind::StorageFailed, reason)
}

/// Create a SerializationFailed error
pub fn serialization_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::SerializationFailed, message)
}

/// Create an IoFailed error
pub fn io_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::IoFailed, message)
}

/// Create a RunCompleted error
pub fn run_completed(session_id: impl Into<String>) -> Error {
    let session_id = session_id.into();
    Error::new(
        ErrorKind::RunCompleted,
        format!("run '{}' already reached its terminal state", session_id),
    )
    .with_context("session_id", session_id)
}

/// Create a SessionBusy error
pub fn session_busy(session_id: impl Into<String>) -> Error {
    let session_id = session_id.into();
    Error::new(
        ErrorKind::SessionBusy,
        format!("session '{}' is already being streamed", session_id),
    )
    .with_context("session_id", session_id)
}

/// Create a Cancelled error
pub fn cancelled(session_id: impl Into<String>) -> Error {
    Error::cancelled(session_id)
}

/// Create an Unexpected error
pub fn unexpected(message: impl Into<String>) -> Error {
    Error::unexpected(message)
}

/// Map a model or search endpoint failure onto the unified error.
///
/// `endpoint` names the collaborator ("model" or "search") and is kept as context.
pub fn from_provider(endpoint: &'static str, err: ProviderError) -> Error {
    let mapped = match &err {
        ProviderError::Network(msg) => Error::endpoint_unavailable(endpoint, msg.clone()),
        ProviderError::Api { status, message } => {
            let e = Error::endpoint_unavailable(endpoint, format!("HTTP {}: {}", status, message))
                .with_context("http_status", status.to_string());
            if *status >= 500 {
                e
            } else {
                e.permanent()
            }
        }
        ProviderError::Parse(msg) => {
            Error::endpoint_unavailable(endpoint, format!("malformed response: {}", msg))
                .permanent()
        }
        ProviderError::RateLimited { retry_after } => {
            let e = Error::new(ErrorKind::RateLimited, "rate limited")
                .with_context("endpoint", endpoint);
            match retry_after {
                Some(secs) => e.with_context("retry_after", secs.to_string()),
                None => e,
            }
        }
        ProviderError::InvalidRequest(msg) => Error::config_invalid(msg.clone())
            .with_context("endpoint", endpoint),
        ProviderError::AuthenticationFailed => {
            Error::new(ErrorKind::AuthenticationFailed, "authentication failed")
                .with_context("endpoint", endpoint)
        }
        ProviderError::EmptyResponse => {
            Error::new(ErrorKind::EmptyResponse, "endpoint returned no text")
                .with_context("endpoint", endpoint)
        }
        ProviderError::Schema(msg) => {
            Error::schema_validation(msg.clone()).with_context("endpoint", endpoint)
        }
        ProviderError::Other(msg) => Error::endpoint_unavailable(endpoint, msg.clone()),
    };
    mapped.set_source(err)
}
