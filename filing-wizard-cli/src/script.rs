//! Wizard scripts
//!
//! A script is a YAML list of actions played in order against one wizard
//! session:
//!
//! ```yaml
//! - action: plan
//!   id: standard
//! - action: next
//! - action: set
//!   field: pan
//!   value: ABCDE1234F
//! - action: upload
//!   slot: panCard
//!   path: docs/pan.pdf
//! - action: submit
//! ```
//!
//! Validation, upload and submission failures are recorded and the script
//! carries on; contract errors (unknown field, unknown plan) abort the run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use filing_wizard_core::{LocalFile, SubmissionResult, WizardController, WizardPhase};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Set { field: String, value: String },
    Plan { id: String },
    Upload { slot: String, path: PathBuf },
    Next,
    Back,
    Submit,
    Dismiss,
}

impl std::fmt::Display for ScriptAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Set { field, value } => write!(f, "set {field} = {value:?}"),
            Self::Plan { id } => write!(f, "plan {id}"),
            Self::Upload { slot, path } => write!(f, "upload {slot} <- {}", path.display()),
            Self::Next => write!(f, "next"),
            Self::Back => write!(f, "back"),
            Self::Submit => write!(f, "submit"),
            Self::Dismiss => write!(f, "dismiss"),
        }
    }
}

pub fn parse(yaml: &str) -> Result<Vec<ScriptAction>> {
    serde_yaml::from_str(yaml).context("Failed to parse wizard script")
}

pub fn load(path: &Path) -> Result<Vec<ScriptAction>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse(&content)
}

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action: String,
    pub ok: bool,
    pub detail: String,
    pub phase: WizardPhase,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<ActionOutcome>,
    pub phase: WizardPhase,
    pub submission: Option<SubmissionResult>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.ok).count()
    }
}

/// Play `actions` in order. Upload paths are resolved against `base_dir`.
pub async fn run(wizard: &WizardController, actions: &[ScriptAction], base_dir: &Path) -> Result<RunReport> {
    let mut outcomes = Vec::with_capacity(actions.len());

    for action in actions {
        let (ok, detail) = match action {
            ScriptAction::Set { field, value } => {
                wizard
                    .set_input(field, value)
                    .with_context(|| format!("Cannot set '{field}'"))?;
                (true, String::new())
            }
            ScriptAction::Plan { id } => {
                wizard
                    .select_plan(id)
                    .with_context(|| format!("Cannot select plan '{id}'"))?;
                (true, String::new())
            }
            ScriptAction::Upload { slot, path } => {
                let path = base_dir.join(path);
                let file = LocalFile::read(&path)
                    .await
                    .with_context(|| format!("Failed to read upload {}", path.display()))?;
                match wizard.upload_document(slot, file).await {
                    Ok(record) => (true, record.remote_url),
                    Err(e) => (false, e.to_string()),
                }
            }
            ScriptAction::Next => match wizard.go_next() {
                Ok(()) => (true, format!("now on {}", wizard.current_view().title)),
                Err(errors) => {
                    let detail = errors
                        .iter()
                        .map(|(field, message)| format!("{field}: {message}"))
                        .collect::<Vec<_>>()
                        .join("; ");
                    (false, detail)
                }
            },
            ScriptAction::Back => {
                wizard.go_back();
                (true, format!("now on {}", wizard.current_view().title))
            }
            ScriptAction::Submit => match wizard.submit().await {
                Ok(result) => (true, format!("reference {}", result.reference)),
                Err(e) => (false, e.to_string()),
            },
            ScriptAction::Dismiss => {
                wizard.dismiss_failure();
                (true, String::new())
            }
        };

        outcomes.push(ActionOutcome {
            action: action.to_string(),
            ok,
            detail,
            phase: wizard.phase(),
        });
    }

    Ok(RunReport {
        outcomes,
        phase: wizard.phase(),
        submission: wizard.submission_result(),
    })
}
