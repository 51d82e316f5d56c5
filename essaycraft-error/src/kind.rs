//! What went wrong

use std::fmt;

/// Failure categories a caller of a run can act on.
///
/// Endpoint kinds come from the model or search service, store kinds from
/// checkpoint persistence, run kinds from the workflow controller itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Catch-all, including broken internal invariants
    Unexpected,
    /// Bad settings or run parameters
    ConfigInvalid,

    // endpoints
    /// Unreachable, timed out, or answered with an error status
    EndpointUnavailable,
    RateLimited,
    AuthenticationFailed,
    /// The model answered without any text
    EmptyResponse,
    /// Structured output did not match the requested schema
    SchemaValidation,

    // store
    /// No checkpoint for the session id
    StateNotFound,
    StorageFailed,
    /// A checkpoint could not be encoded or a stored one decoded
    SerializationFailed,
    IoFailed,

    // run
    /// The session already reached its terminal step
    RunCompleted,
    /// Another stream is driving the session
    SessionBusy,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::EndpointUnavailable => "EndpointUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::EmptyResponse => "EmptyResponse",
            ErrorKind::SchemaValidation => "SchemaValidation",
            ErrorKind::StateNotFound => "StateNotFound",
            ErrorKind::StorageFailed => "StorageFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::RunCompleted => "RunCompleted",
            ErrorKind::SessionBusy => "SessionBusy",
            ErrorKind::Cancelled => "Cancelled",
        }
    }

    /// Kinds that start out `Temporary`
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::EndpointUnavailable | ErrorKind::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_variant_name() {
        assert_eq!(ErrorKind::StateNotFound.to_string(), "StateNotFound");
        assert_eq!(ErrorKind::SchemaValidation.to_string(), "SchemaValidation");
        assert_eq!(format!("{:?}", ErrorKind::SessionBusy), ErrorKind::SessionBusy.as_str());
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::EndpointUnavailable.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::SchemaValidation.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }
}
