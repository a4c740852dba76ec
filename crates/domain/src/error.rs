use thiserror::Error;

use crate::application::ApplicationState;
use crate::auth::Role;
use crate::transitions::Action;

/// A gating policy denial: machine-readable code plus the message shown to
/// the applicant or officer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GuardViolation {
    pub code: &'static str,
    pub message: String,
}

impl GuardViolation {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("action '{action}' is not defined for state '{state}'")]
    InvalidTransition {
        state: ApplicationState,
        action: Action,
    },
    #[error("role '{role}' is not authorized to perform '{action}'")]
    Forbidden { action: Action, role: Role },
    #[error("{0}")]
    GuardFailed(GuardViolation),
    #[error("application changed since it was loaded")]
    VersionConflict,
    #[error("not found")]
    NotFound,
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::Forbidden { .. } => "forbidden_transition",
            DomainError::GuardFailed(violation) => violation.code,
            DomainError::VersionConflict => "version_conflict",
            DomainError::NotFound => "not_found",
            DomainError::Persistence(_) => "persistence_failure",
            DomainError::Validation(_) => "validation_error",
        }
    }
}
