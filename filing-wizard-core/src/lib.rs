//! Filing Wizard Core
//!
//! A configuration-driven engine for multi-step filing registration wizards.
//! Each service (ITR, GST returns, TDS, ROC annual return, ...) is a YAML
//! definition of plans, steps, field rules, document slots and derived
//! fields; one generic controller drives any of them.
//!
//! ```text
//! ServiceCatalog ──compile──► ServiceConfig ──► WizardController
//!                                                 │   ├─ set_field / select_plan
//!                                                 │   ├─ go_next / go_back
//!                                                 │   ├─ upload_document ──► UploadCollaborator
//!                                                 │   └─ submit ──► assemble ──► SubmissionCollaborator
//!                                                 └─ current_view ──► StepView
//! ```

pub mod catalog;
pub mod config;
pub mod controller;
pub mod definition;
pub mod derive;
pub mod error;
pub mod predicates;
pub mod rules;
pub mod session;
pub mod settings;
pub mod submission;
pub mod types;
pub mod uploads;
pub mod view;

pub use catalog::ServiceCatalog;
pub use config::{ServiceConfig, StepConfig};
pub use controller::{Collaborators, WizardController, WizardPhase};
pub use definition::{FieldKind, Guard, RuleCheck, ServiceDefinition, StepKind};
pub use derive::{Derivation, DerivationRegistry};
pub use error::{CatalogError, WizardError};
pub use predicates::PredicateRegistry;
pub use rules::ValidationErrors;
pub use session::SessionContext;
pub use settings::{IdStrategyKind, SettingsError, WizardSettings};
pub use submission::{
    assemble, DocumentEntry, IntakeStatus, JsonFileSubmissionSink, SubmissionCollaborator,
    SubmissionError, SubmissionIdStrategy, SubmissionPayload, TimestampIdStrategy, UuidIdStrategy,
};
pub use types::{
    FieldMap, FieldValue, LocalFile, SubmissionResult, SubmissionStatus, UploadRecord, WizardState,
};
pub use uploads::{LocalUploadStore, UploadCollaborator, UploadError, UploadPolicy, UploadRegistry};
pub use view::StepView;
