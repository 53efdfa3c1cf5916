//! Contract and catalogue errors
//!
//! Recoverable per-operation errors live next to their operations
//! (`ValidationErrors` in `rules`, `UploadError` in `uploads`,
//! `SubmissionError` in `submission`).

use thiserror::Error;

/// Misuse of the controller API. Correct callers never see these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("A signed-in session is required to start the {service} wizard")]
    Unauthenticated { service: String },

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Unknown plan '{plan}' for service {service}")]
    UnknownPlan { service: String, plan: String },

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Field '{0}' is derived and cannot be edited")]
    ReadOnlyField(String),

    #[error("The plan can only be changed up to step {plan_step} (currently on step {current})")]
    PlanLocked { current: usize, plan_step: usize },

    #[error("The filing has already been submitted")]
    AlreadySubmitted,
}

/// Errors raised while loading or compiling service definitions
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid service definition '{service}': {reason}")]
    Invalid { service: String, reason: String },

    #[error("Duplicate service key: {0}")]
    Duplicate(String),
}

impl CatalogError {
    pub(crate) fn invalid(service: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            service: service.to_string(),
            reason: reason.into(),
        }
    }
}
