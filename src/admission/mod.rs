//! Admission control for gates: defaulting, then validation, decided against
//! an immutable snapshot before anything is committed.

use axum::http::StatusCode;
use thiserror::Error;

pub mod defaulter;
pub mod diff;
pub mod patch;
pub mod validator;

pub use validator::{privileged_identity, PrivilegedPredicate, Validator};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdmissionError {
    /// The object is malformed or the write is not allowed in this state.
    #[error("{0}")]
    Invalid(String),

    /// The caller may not make this change.
    #[error("{0}")]
    Unauthorized(String),

    #[error("unable to decode request: {0}")]
    Decode(String),
}

impl AdmissionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdmissionError::Invalid(_) | AdmissionError::Decode(_) => StatusCode::BAD_REQUEST,
            AdmissionError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}
