//! Wizard Controller
//!
//! Owns the per-session `WizardState` and is the only way to mutate it.
//! All operations take `&self`: the state sits behind a mutex that is held
//! only between awaits, so field edits and other uploads proceed while an
//! upload or the submission is pending.
//!
//! ```text
//! Step_k --go_next (valid)--> Step_k+1          (k < N)
//! Step_k --go_next (invalid)--> Step_k          (errors set)
//! Step_k --go_back--> Step_k-1                  (k > 1)
//! Step_N --submit (ok)--> Submitted             (terminal)
//! Step_N --submit (err)--> Failed --dismiss--> Step_N
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::error::WizardError;
use crate::rules::ValidationErrors;
use crate::session::SessionContext;
use crate::submission::{
    self, SubmissionCollaborator, SubmissionError, SubmissionIdStrategy, SubmissionPayload,
    TimestampIdStrategy,
};
use crate::types::{FieldValue, LocalFile, SubmissionResult, SubmissionStatus, UploadRecord, WizardState};
use crate::uploads::{UploadCollaborator, UploadError, UploadPolicy};
use crate::view::{self, StepView};

/// External services the controller delegates to
#[derive(Clone)]
pub struct Collaborators {
    pub uploader: Arc<dyn UploadCollaborator>,
    pub submitter: Arc<dyn SubmissionCollaborator>,
    pub ids: Arc<dyn SubmissionIdStrategy>,
}

impl Collaborators {
    /// Timestamp ids by default
    pub fn new(uploader: Arc<dyn UploadCollaborator>, submitter: Arc<dyn SubmissionCollaborator>) -> Self {
        Self {
            uploader,
            submitter,
            ids: Arc::new(TimestampIdStrategy::new()),
        }
    }

    pub fn with_ids(mut self, ids: Arc<dyn SubmissionIdStrategy>) -> Self {
        self.ids = ids;
        self
    }
}

/// Where the session is in the wizard state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardPhase {
    /// 1-indexed step being edited
    Step(usize),
    Submitting,
    Submitted,
    /// Last attempt failed; dismiss or retry
    Failed,
}

impl std::fmt::Display for WizardPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Step(k) => write!(f, "step {k}"),
            Self::Submitting => write!(f, "submitting"),
            Self::Submitted => write!(f, "submitted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

pub struct WizardController {
    service: Arc<ServiceConfig>,
    session: SessionContext,
    collaborators: Collaborators,
    upload_policy: UploadPolicy,
    state: Mutex<WizardState>,
}

impl WizardController {
    /// Start a session. Guests are refused; an unknown seed plan falls back
    /// to the service's default plan.
    pub fn new(
        service: Arc<ServiceConfig>,
        session: SessionContext,
        collaborators: Collaborators,
    ) -> Result<Self, WizardError> {
        if !session.is_authenticated() {
            return Err(WizardError::Unauthenticated {
                service: service.key().to_string(),
            });
        }

        let fallback = service.def.fallback_plan().unwrap_or_default().to_string();
        let plan = match session.preselected_plan.as_deref() {
            Some(plan) if service.def.has_plan(plan) => plan.to_string(),
            Some(plan) => {
                warn!(
                    service = %service.key(),
                    plan = %plan,
                    fallback = %fallback,
                    "unknown pre-selected plan, using default"
                );
                fallback
            }
            None => fallback,
        };

        let mut state = WizardState::new(plan);
        service.recompute_derived(&mut state, None);

        info!(
            service = %service.key(),
            user = session.user_id().unwrap_or_default(),
            plan = %state.selected_plan,
            steps = service.total_steps(),
            "wizard started"
        );

        Ok(Self {
            service,
            session,
            collaborators,
            upload_policy: UploadPolicy::default(),
            state: Mutex::new(state),
        })
    }

    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    fn lock(&self) -> MutexGuard<'_, WizardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Field editing
    // ------------------------------------------------------------------

    /// Store a value, clear that field's error and recompute dependent
    /// derived fields. Never validates.
    pub fn set_field(&self, name: &str, value: impl Into<FieldValue>) -> Result<(), WizardError> {
        if self.service.is_derived(name) {
            return Err(WizardError::ReadOnlyField(name.to_string()));
        }
        if !self.service.is_editable(name) {
            return Err(WizardError::UnknownField(name.to_string()));
        }

        let mut state = self.lock();
        if state.submission_status == SubmissionStatus::Submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        state.fields.insert(name.to_string(), value.into());
        state.errors.remove(name);
        self.service.recompute_derived(&mut state, Some(name));
        Ok(())
    }

    /// `set_field` with raw text coerced by the field's declared kind
    pub fn set_input(&self, name: &str, raw: &str) -> Result<(), WizardError> {
        let kind = self
            .service
            .def
            .find_field(name)
            .map(|f| f.kind)
            .ok_or_else(|| WizardError::UnknownField(name.to_string()))?;
        self.set_field(name, kind.coerce(raw))
    }

    /// Change the plan. Only allowed up to the plan selection step: plan
    /// guarded rules on later steps are validated against the plan in force
    /// when those steps were passed.
    pub fn select_plan(&self, plan: &str) -> Result<(), WizardError> {
        if !self.service.def.has_plan(plan) {
            return Err(WizardError::UnknownPlan {
                service: self.service.key().to_string(),
                plan: plan.to_string(),
            });
        }

        let mut state = self.lock();
        if state.submission_status == SubmissionStatus::Submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        let plan_step = self.service.plan_step();
        if state.current_step > plan_step {
            return Err(WizardError::PlanLocked {
                current: state.current_step,
                plan_step,
            });
        }
        if state.selected_plan != plan {
            info!(service = %self.service.key(), from = %state.selected_plan, to = %plan, "plan selected");
            state.selected_plan = plan.to_string();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Validate the current step and advance on success (clamped to the last
    /// step). On failure every invalid field gets one message and the step
    /// does not change.
    ///
    /// Once a submission is underway or done navigation is frozen: this
    /// returns `Ok(())` without validating or moving. Check `phase()` to tell
    /// the two apart.
    pub fn go_next(&self) -> Result<(), ValidationErrors> {
        let mut state = self.lock();
        if state.submission_status != SubmissionStatus::Draft {
            return Ok(());
        }
        let current = state.current_step;
        let Some(step) = self.service.step(current) else {
            return Ok(());
        };

        let errors = step.validate(&state);
        if !errors.is_empty() {
            warn!(
                service = %self.service.key(),
                step = current,
                step_key = %step.key(),
                errors = errors.len(),
                "step validation failed"
            );
            state.errors = errors.clone().into_map();
            return Err(errors);
        }

        state.errors.clear();
        if current < self.service.total_steps() {
            state.current_step = current + 1;
            info!(service = %self.service.key(), from = current, to = current + 1, "step advanced");
        }
        Ok(())
    }

    /// Step back one, never below step 1. Never validates.
    pub fn go_back(&self) {
        let mut state = self.lock();
        if state.submission_status != SubmissionStatus::Draft {
            return;
        }
        if state.current_step > 1 {
            let from = state.current_step;
            state.current_step = from - 1;
            info!(service = %self.service.key(), from, to = from - 1, "step back");
        }
    }

    // ------------------------------------------------------------------
    // Uploads
    // ------------------------------------------------------------------

    /// Upload a file into a slot. Success overwrites the slot and clears its
    /// error; failure leaves the registry untouched.
    pub async fn upload_document(&self, slot: &str, file: LocalFile) -> Result<UploadRecord, UploadError> {
        let category = self
            .service
            .def
            .find_slot(slot)
            .map(|s| s.category.clone())
            .ok_or_else(|| UploadError::UnknownSlot(slot.to_string()))?;

        if self.lock().submission_status != SubmissionStatus::Draft {
            return Err(UploadError::Closed);
        }

        if let Err(e) = self.upload_policy.check(&file) {
            warn!(slot = %slot, file = %file.file_name, error = %e, "upload rejected");
            return Err(e);
        }

        match self.collaborators.uploader.upload(&file, &category).await {
            Ok(record) => {
                let mut state = self.lock();
                // not in the payload assembled by submit
                if state.submission_status != SubmissionStatus::Draft {
                    warn!(service = %self.service.key(), slot = %slot, "upload finished after submission started, discarded");
                    return Err(UploadError::Closed);
                }
                state.uploads.put(slot, record.clone());
                state.errors.remove(slot);
                info!(
                    service = %self.service.key(),
                    slot = %slot,
                    stored_name = %record.stored_name,
                    "document uploaded"
                );
                Ok(record)
            }
            Err(e) => {
                error!(service = %self.service.key(), slot = %slot, error = %e, "upload failed");
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Assemble the payload and hand it to the submission collaborator.
    /// Only available on the final step; never retried automatically.
    pub async fn submit(&self) -> Result<SubmissionResult, SubmissionError> {
        let payload = {
            let mut state = self.lock();
            match state.submission_status {
                SubmissionStatus::Submitted => return Err(SubmissionError::AlreadySubmitted),
                SubmissionStatus::Submitting => return Err(SubmissionError::InFlight),
                SubmissionStatus::Draft => {}
            }
            let total = self.service.total_steps();
            if state.current_step != total {
                return Err(SubmissionError::NotOnFinalStep {
                    current: state.current_step,
                    total,
                });
            }

            state.submission_status = SubmissionStatus::Submitting;
            state.last_submission_error = None;
            submission::assemble(&self.service, &self.session, &state, self.collaborators.ids.as_ref())
        };

        info!(
            service = %self.service.key(),
            submission_id = %payload.submission_id,
            documents = payload.documents.len(),
            "submitting filing"
        );

        let result = self.collaborators.submitter.submit(&payload).await;

        let mut state = self.lock();
        match result {
            Ok(result) => {
                state.submission_status = SubmissionStatus::Submitted;
                state.submission_result = Some(result.clone());
                info!(
                    service = %self.service.key(),
                    submission_id = %payload.submission_id,
                    reference = %result.reference,
                    "filing submitted"
                );
                Ok(result)
            }
            Err(e) => {
                state.submission_status = SubmissionStatus::Draft;
                state.last_submission_error = Some(e.to_string());
                error!(
                    service = %self.service.key(),
                    submission_id = %payload.submission_id,
                    error = %e,
                    "submission failed"
                );
                Err(e)
            }
        }
    }

    /// Leave the failed phase and return to the final step
    pub fn dismiss_failure(&self) {
        self.lock().last_submission_error = None;
    }

    /// Payload as it would be sent now, with a fresh id
    pub fn preview_payload(&self) -> SubmissionPayload {
        let state = self.lock();
        submission::assemble(&self.service, &self.session, &state, self.collaborators.ids.as_ref())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn phase(&self) -> WizardPhase {
        let state = self.lock();
        match state.submission_status {
            SubmissionStatus::Submitting => WizardPhase::Submitting,
            SubmissionStatus::Submitted => WizardPhase::Submitted,
            SubmissionStatus::Draft if state.last_submission_error.is_some() => WizardPhase::Failed,
            SubmissionStatus::Draft => WizardPhase::Step(state.current_step),
        }
    }

    /// Render-ready view of the current step
    pub fn current_view(&self) -> StepView {
        let state = self.lock();
        let index = state.current_step;
        match self.service.step(index) {
            Some(step) => view::resolve(&self.service, step, index, &state),
            // Unreachable while the step bounds hold; fall back to the first step.
            None => view::resolve(&self.service, &self.service.steps()[0], 1, &state),
        }
    }

    pub fn snapshot(&self) -> WizardState {
        self.lock().clone()
    }

    pub fn current_step(&self) -> usize {
        self.lock().current_step
    }

    pub fn total_steps(&self) -> usize {
        self.service.total_steps()
    }

    pub fn selected_plan(&self) -> String {
        self.lock().selected_plan.clone()
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.lock().fields.get(name).cloned()
    }

    pub fn derived(&self, name: &str) -> Option<String> {
        self.lock().derived.get(name).cloned()
    }

    pub fn errors(&self) -> BTreeMap<String, String> {
        self.lock().errors.clone()
    }

    pub fn upload(&self, slot: &str) -> Option<UploadRecord> {
        self.lock().uploads.get(slot).cloned()
    }

    pub fn submission_status(&self) -> SubmissionStatus {
        self.lock().submission_status
    }

    pub fn submission_result(&self) -> Option<SubmissionResult> {
        self.lock().submission_result.clone()
    }

    pub fn last_submission_error(&self) -> Option<String> {
        self.lock().last_submission_error.clone()
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }
}
