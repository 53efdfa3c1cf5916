//! Submission Assembly
//!
//! Builds the payload handed to the submission collaborator and provides the
//! collaborator seam plus a JSON-file sink for local runs.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::ServiceConfig;
use crate::session::SessionContext;
use crate::types::{FieldMap, FieldValue, SubmissionResult, WizardState};

/// Error type for submission attempts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Submit is only available on the final step (currently on {current} of {total})")]
    NotOnFinalStep { current: usize, total: usize },

    #[error("A submission is already in progress")]
    InFlight,

    #[error("The filing has already been submitted")]
    AlreadySubmitted,

    #[error("Submission rejected: {reason}")]
    Rejected { reason: String },

    #[error("Submission failed: {0}")]
    Transport(String),
}

impl SubmissionError {
    /// The user may try again from the final step
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Transport(_))
    }
}

impl From<std::io::Error> for SubmissionError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SubmissionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Fixed status marker carried by every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStatus {
    PaymentReceived,
}

/// One uploaded document as the backend sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    pub slot: String,
    pub display_name: String,
    pub remote_url: String,
}

/// The filing request sent on submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub submission_id: String,
    pub service: String,
    pub plan: String,
    pub submitted_by: Option<String>,
    /// Collected fields with derived values merged in
    pub fields: FieldMap,
    /// Sorted by slot key
    pub documents: Vec<DocumentEntry>,
    pub status: IntakeStatus,
}

/// Source of unique submission ids
pub trait SubmissionIdStrategy: Send + Sync {
    fn next_id(&self, prefix: &str) -> String;
}

/// `<prefix>-<UTC yyyymmddHHMMSSmmm>-<seq>`
#[derive(Debug, Default)]
pub struct TimestampIdStrategy {
    seq: AtomicU64,
}

impl TimestampIdStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubmissionIdStrategy for TimestampIdStrategy {
    fn next_id(&self, prefix: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{}-{seq:04}", Utc::now().format("%Y%m%d%H%M%S%3f"))
    }
}

/// `<prefix>-<uuid v4>`
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdStrategy;

impl SubmissionIdStrategy for UuidIdStrategy {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4())
    }
}

/// Build the payload from the state at call time. Only the id varies between calls.
pub fn assemble(
    service: &ServiceConfig,
    session: &SessionContext,
    state: &WizardState,
    ids: &dyn SubmissionIdStrategy,
) -> SubmissionPayload {
    let mut fields = state.fields.clone();
    for (name, value) in &state.derived {
        fields.insert(name.clone(), FieldValue::text(value.clone()));
    }

    let documents = state
        .uploads
        .iter()
        .map(|(slot, record)| DocumentEntry {
            slot: slot.to_string(),
            display_name: record.original_file_name.clone(),
            remote_url: record.remote_url.clone(),
        })
        .collect();

    SubmissionPayload {
        submission_id: ids.next_id(&service.def.id_prefix),
        service: service.key().to_string(),
        plan: state.selected_plan.clone(),
        submitted_by: session.user_id().map(str::to_string),
        fields,
        documents,
        status: IntakeStatus::PaymentReceived,
    }
}

/// External submission endpoint
#[async_trait]
pub trait SubmissionCollaborator: Send + Sync {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<SubmissionResult, SubmissionError>;
}

/// Writes each payload to `<dir>/<submission id>.json`
pub struct JsonFileSubmissionSink {
    dir: PathBuf,
}

impl JsonFileSubmissionSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, submission_id: &str) -> Result<PathBuf, SubmissionError> {
        if submission_id.is_empty() || submission_id.contains(['/', '\\']) || submission_id.starts_with('.') {
            return Err(SubmissionError::Rejected {
                reason: format!("invalid submission id '{submission_id}'"),
            });
        }
        Ok(self.dir.join(format!("{submission_id}.json")))
    }
}

#[async_trait]
impl SubmissionCollaborator for JsonFileSubmissionSink {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<SubmissionResult, SubmissionError> {
        use tokio::io::AsyncWriteExt;

        let path = self.path_for(&payload.submission_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec_pretty(payload)?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SubmissionError::Rejected {
                    reason: format!("submission {} already exists", payload.submission_id),
                })
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&body).await?;
        file.flush().await?;

        Ok(SubmissionResult {
            reference: payload.submission_id.clone(),
            details: serde_json::json!({ "path": path.display().to_string() }),
        })
    }
}
