//! Step content resolver
//!
//! Projects the current step of a service plus the wizard state into a
//! render-ready `StepView`. Pure: views are rebuilt on every call.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{ServiceConfig, StepConfig};
use crate::definition::{FieldKind, StepKind};
use crate::submission::DocumentEntry;
use crate::types::{SubmissionStatus, UploadRecord, WizardState};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldView {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub options: Vec<String>,
    pub placeholder: Option<String>,
    pub value: String,
    pub error: Option<String>,
    pub required: bool,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub slot: String,
    pub label: String,
    pub category: String,
    pub required: bool,
    pub record: Option<UploadRecord>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanView {
    pub id: String,
    pub label: String,
    pub price: Option<Decimal>,
    pub selected: bool,
}

/// Everything collected so far, shown on a review step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub plan: String,
    /// (label, value) in step order, blanks skipped
    pub fields: Vec<(String, String)>,
    pub derived: BTreeMap<String, String>,
    pub documents: Vec<DocumentEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    /// 1-indexed
    pub index: usize,
    pub total: usize,
    pub key: String,
    pub title: String,
    pub description: String,
    pub kind: StepKind,
    pub fields: Vec<FieldView>,
    pub uploads: Vec<SlotView>,
    pub plans: Vec<PlanView>,
    pub review: Option<ReviewSummary>,
    pub can_go_back: bool,
    pub is_final: bool,
}

/// Resolve the view for `step` (1-indexed)
pub fn resolve(service: &ServiceConfig, step: &StepConfig, index: usize, state: &WizardState) -> StepView {
    let fields = step
        .def
        .fields
        .iter()
        .filter(|f| step.field_visible(&f.name, state))
        .map(|f| FieldView {
            name: f.name.clone(),
            label: f.label.clone(),
            kind: f.kind,
            options: f.options.clone(),
            placeholder: f.placeholder.clone(),
            value: state.lookup(&f.name).unwrap_or_default(),
            error: state.errors.get(&f.name).cloned(),
            required: step.is_required(&f.name, state),
            read_only: service.is_derived(&f.name),
        })
        .collect();

    let uploads = step
        .def
        .uploads
        .iter()
        .filter(|s| step.slot_visible(s, state))
        .map(|s| SlotView {
            slot: s.slot.clone(),
            label: s.label.clone(),
            category: s.category.clone(),
            required: s.required,
            record: state.uploads.get(&s.slot).cloned(),
            error: state.errors.get(&s.slot).cloned(),
        })
        .collect();

    let plans = match step.def.kind {
        StepKind::PlanSelection => service
            .def
            .plans
            .iter()
            .map(|p| PlanView {
                id: p.id.clone(),
                label: p.label.clone(),
                price: p.price,
                selected: p.id == state.selected_plan,
            })
            .collect(),
        _ => Vec::new(),
    };

    let review = match step.def.kind {
        StepKind::Review => Some(review_summary(service, state)),
        _ => None,
    };

    let total = service.total_steps();
    let in_flight = state.submission_status != SubmissionStatus::Draft;
    StepView {
        index,
        total,
        key: step.def.key.clone(),
        title: step.def.title.clone(),
        description: step.def.description.clone(),
        kind: step.def.kind,
        fields,
        uploads,
        plans,
        review,
        can_go_back: index > 1 && !in_flight,
        is_final: index == total,
    }
}

fn review_summary(service: &ServiceConfig, state: &WizardState) -> ReviewSummary {
    let fields = service
        .def
        .declared_fields()
        .filter_map(|f| {
            state
                .fields
                .get(&f.name)
                .filter(|v| !v.is_blank())
                .map(|v| (f.label.clone(), v.as_text()))
        })
        .collect();

    let documents = state
        .uploads
        .iter()
        .map(|(slot, record)| DocumentEntry {
            slot: slot.to_string(),
            display_name: record.original_file_name.clone(),
            remote_url: record.remote_url.clone(),
        })
        .collect();

    ReviewSummary {
        plan: state.selected_plan.clone(),
        fields,
        derived: state.derived.clone(),
        documents,
    }
}
