//! The error value itself

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// A failure inside an essay run.
///
/// Built with [`Error::new`] or one of the shorthand constructors, then
/// enriched as it travels up: `with_operation` names the call that failed,
/// `with_context` adds fields like `session_id` or `step`, and `set_source`
/// keeps the underlying endpoint or storage error.
///
/// ```rust
/// use essaycraft_error::{Error, ErrorKind};
///
/// let err = Error::endpoint_unavailable("model", "connection reset")
///     .with_operation("workflow::plan")
///     .with_context("model", "gemini-2.5-flash");
///
/// assert_eq!(err.kind(), ErrorKind::EndpointUnavailable);
/// assert!(err.is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Status starts from the kind: retryable kinds are `Temporary`
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };
        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Innermost operation; outer ones are kept in context as `called`
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }

    /// Override the kind's default, e.g. for a 4xx that will fail again
    pub fn permanent(mut self) -> Self {
        self.status = ErrorStatus::Permanent;
        self
    }

    /// Name the failing operation. A previously set operation moves into
    /// context as `called`, so the chain reads outermost first.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach the underlying error. Setting it twice is a bug (debug-asserted).
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }
}

/// One line, used in logs and in the stored `last_error` of a failed run
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.status)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }
        if !self.context.is_empty() {
            let pairs: Vec<String> = self.context.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
            write!(f, ", context {{ {} }}", pairs.join(", "))?;
        }
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return f
                .debug_struct("Error")
                .field("kind", &self.kind)
                .field("status", &self.status)
                .field("operation", &self.operation)
                .field("message", &self.message)
                .field("context", &self.context)
                .field("source", &self.source)
                .finish();
        }

        write!(f, "{}", self)?;
        for (key, value) in &self.context {
            if *key == "called" {
                write!(f, "\n    via {}", value)?;
            }
        }
        if let Some(source) = &self.source {
            write!(f, "\n  caused by: {:#}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::IoFailed, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

impl Error {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn state_not_found(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self::new(
            ErrorKind::StateNotFound,
            format!("no state stored for session '{}'", session_id),
        )
        .with_context("session_id", session_id)
    }

    pub fn schema_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaValidation, message)
    }

    /// `endpoint` is "model" or "search"
    pub fn endpoint_unavailable(endpoint: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EndpointUnavailable, message).with_context("endpoint", endpoint)
    }

    pub fn cancelled(session_id: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, "run cancelled by caller").with_context("session_id", session_id)
    }
}
