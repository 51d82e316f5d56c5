//! # essaycraft-error
//!
//! One error type shared by every essaycraft crate.
//!
//! An [`Error`] answers three questions for the caller of a run:
//! what failed ([`ErrorKind`]), whether trying again may help ([`ErrorStatus`]),
//! and where it happened (operation name plus key/value context such as the
//! session id, the step, or the endpoint).
//!
//! ```rust
//! use essaycraft_error::{Error, ErrorKind};
//!
//! fn load(session_id: &str) -> essaycraft_error::Result<()> {
//!     Err(Error::state_not_found(session_id)
//!         .with_operation("store::load")
//!         .with_context("backend", "sqlite"))
//! }
//!
//! let err = load("abc").unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::StateNotFound);
//! assert!(!err.is_retryable());
//! ```
//!
//! Endpoint and storage errors are wrapped with `set_source`; the only blanket
//! conversion is from `std::io::Error`.

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, Error>;
