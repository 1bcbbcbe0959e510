use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use utoipa::ToSchema;

use crate::parser::ParseError;
use crate::types::ValueError;

/// Call-level failures. None of these is a security decision: when one is
/// returned, no `Decision` was produced and the caller must handle it apart
/// from Allow/Deny.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("internal engine error: {0}")]
    EngineInternal(String),

    #[error("failed to parse policy: {0}")]
    ParseError(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Poisoned lock error: {0}")]
    PoisonedLockError(String),
}

impl AuthorizationError {
    /// Returns true when the failure points at a fault in the engine rather
    /// than at the caller's input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthorizationError::EngineInternal(_) | AuthorizationError::PoisonedLockError(_)
        )
    }
}

impl From<ParseError> for AuthorizationError {
    fn from(err: ParseError) -> Self {
        AuthorizationError::ParseError(err.to_string())
    }
}

impl From<ValueError> for AuthorizationError {
    fn from(err: ValueError) -> Self {
        AuthorizationError::InvalidFormat(err.to_string())
    }
}

impl From<serde_json::Error> for AuthorizationError {
    fn from(err: serde_json::Error) -> Self {
        AuthorizationError::InvalidFormat(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for AuthorizationError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        AuthorizationError::PoisonedLockError(err.to_string())
    }
}

/// Classification of a per-policy evaluation error.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
pub enum ErrorKind {
    TypeMismatch,
    AttributeAccessError,
    IntegerOverflow,
    UnknownFunction,
    /// Part of the wire taxonomy only. An unknown `__extn` in request data is
    /// rejected while decoding as `ValueError::UnknownExtension`, so
    /// evaluation never produces this kind.
    UnknownExtension,
    ExtensionError,
    EvaluationBudgetExceeded,
}

/// An error raised while evaluating one policy. It is local to that policy
/// and never aborts the call.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct EvaluationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EvaluationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_mismatch(expected: &str, found: &str) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            format!("expected {expected}, found {found}"),
        )
    }

    pub fn attribute_access(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AttributeAccessError, message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IntegerOverflow, message)
    }

    pub fn unknown_function(name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownFunction,
            format!("function `{name}` is not registered"),
        )
    }

    pub fn extension(name: &str, message: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::ExtensionError, format!("{name}: {message}"))
    }

    pub fn budget_exceeded(limit: u64) -> Self {
        Self::new(
            ErrorKind::EvaluationBudgetExceeded,
            format!("evaluation exceeded its budget of {limit} steps"),
        )
    }

    pub fn too_deep(limit: usize) -> Self {
        Self::new(
            ErrorKind::EvaluationBudgetExceeded,
            format!("expression nesting exceeds the limit of {limit}"),
        )
    }
}
