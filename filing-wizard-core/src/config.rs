//! Compiled service configuration
//!
//! A `ServiceConfig` is a validated `ServiceDefinition` with rules compiled
//! and derivations resolved. It is immutable and shared between sessions.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::definition::{FieldDef, ServiceDefinition, SlotDef, StepDef, StepKind};
use crate::derive::{Derivation, DerivationRegistry};
use crate::error::CatalogError;
use crate::predicates::PredicateRegistry;
use crate::rules::{Check, Rule, ValidationErrors};
use crate::types::WizardState;

/// A step with its compiled rules
#[derive(Debug, Clone)]
pub struct StepConfig {
    pub def: StepDef,
    pub rules: Vec<Rule>,
}

impl StepConfig {
    pub fn key(&self) -> &str {
        &self.def.key
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.def.fields.iter().find(|f| f.name == name)
    }

    pub fn slot(&self, slot: &str) -> Option<&SlotDef> {
        self.def.uploads.iter().find(|s| s.slot == slot)
    }

    /// A field declared on this step is shown for the current state
    pub fn field_visible(&self, name: &str, state: &WizardState) -> bool {
        match self.field(name).and_then(|f| f.visible_when.as_ref()) {
            Some(guard) => guard.holds(&|n| state.lookup(n), &state.selected_plan),
            None => true,
        }
    }

    pub fn slot_visible(&self, slot: &SlotDef, state: &WizardState) -> bool {
        match &slot.visible_when {
            Some(guard) => guard.holds(&|n| state.lookup(n), &state.selected_plan),
            None => true,
        }
    }

    /// Rules that apply to the current state, in declaration order
    pub fn active_rules<'a>(&'a self, state: &'a WizardState) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules
            .iter()
            .filter(move |r| r.is_active(state) && self.field_visible(&r.field, state))
    }

    /// An active `required` rule currently applies to the field
    pub fn is_required(&self, name: &str, state: &WizardState) -> bool {
        self.active_rules(state)
            .any(|r| r.field == name && matches!(r.check, Check::Required))
    }

    /// Every failing field (first failing rule wins) and every empty required slot
    pub fn validate(&self, state: &WizardState) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for rule in self.active_rules(state) {
            if !errors.contains(&rule.field) && !rule.passes(state) {
                errors.add(&rule.field, rule.message.clone());
            }
        }
        for slot in &self.def.uploads {
            if slot.required && self.slot_visible(slot, state) && !state.uploads.contains(&slot.slot) {
                errors.add(&slot.slot, format!("{} is required", slot.label));
            }
        }
        errors
    }
}

/// A derived field bound to its derivation
#[derive(Clone)]
pub struct DerivedField {
    pub field: String,
    pub derivation: Arc<dyn Derivation>,
}

impl std::fmt::Debug for DerivedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedField")
            .field("field", &self.field)
            .field("derivation", &self.derivation.name())
            .finish()
    }
}

/// Immutable, validated configuration for one service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub def: ServiceDefinition,
    steps: Vec<StepConfig>,
    derived: Vec<DerivedField>,
}

impl ServiceConfig {
    /// Validate a definition and compile its rules
    pub fn compile(
        def: ServiceDefinition,
        predicates: &PredicateRegistry,
        derivations: &DerivationRegistry,
    ) -> Result<Self, CatalogError> {
        let service = def.service.clone();
        let invalid = |reason: String| CatalogError::invalid(&service, reason);

        if def.steps.is_empty() {
            return Err(invalid("a service needs at least one step".into()));
        }
        if def.plans.is_empty() {
            return Err(invalid("a service needs at least one plan".into()));
        }
        if let Some(default) = &def.default_plan {
            if !def.has_plan(default) {
                return Err(invalid(format!("default plan '{default}' is not listed")));
            }
        }

        let mut keys = HashSet::new();
        for step in &def.steps {
            if !keys.insert(step.key.as_str()) {
                return Err(invalid(format!("duplicate step key '{}'", step.key)));
            }
        }

        let mut slots = HashSet::new();
        for slot in def.steps.iter().flat_map(|s| s.uploads.iter()) {
            if !slots.insert(slot.slot.as_str()) {
                return Err(invalid(format!("duplicate upload slot '{}'", slot.slot)));
            }
        }

        let mut derived = Vec::with_capacity(def.derived.len());
        for d in &def.derived {
            let derivation = derivations.get(&d.derivation).ok_or_else(|| {
                invalid(format!("field '{}' uses unknown derivation '{}'", d.field, d.derivation))
            })?;
            derived.push(DerivedField {
                field: d.field.clone(),
                derivation,
            });
        }

        let known = |name: &str| def.find_field(name).is_some() || def.is_derived(name);
        let mut steps = Vec::with_capacity(def.steps.len());
        for step in &def.steps {
            let guards = step
                .fields
                .iter()
                .filter_map(|f| f.visible_when.as_ref())
                .chain(step.uploads.iter().filter_map(|s| s.visible_when.as_ref()))
                .chain(step.rules.iter().filter_map(|r| r.when.as_ref()));
            for guard in guards {
                if let Some(name) = guard.referenced_fields().into_iter().find(|n| !known(*n)) {
                    return Err(invalid(format!(
                        "step '{}' has a condition on unknown field '{name}'",
                        step.key
                    )));
                }
            }

            let mut rules = Vec::with_capacity(step.rules.len());
            for rule in &step.rules {
                let field = step.fields.iter().find(|f| f.name == rule.field).ok_or_else(|| {
                    invalid(format!(
                        "step '{}' has a rule for undeclared field '{}'",
                        step.key, rule.field
                    ))
                })?;
                rules.push(Rule::compile(rule, &field.label, predicates).map_err(&invalid)?);
            }
            steps.push(StepConfig {
                def: step.clone(),
                rules,
            });
        }

        Ok(Self { def, steps, derived })
    }

    pub fn key(&self) -> &str {
        &self.def.service
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// 1-indexed step lookup
    pub fn step(&self, index: usize) -> Option<&StepConfig> {
        index.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    pub fn steps(&self) -> &[StepConfig] {
        &self.steps
    }

    pub fn derived_fields(&self) -> &[DerivedField] {
        &self.derived
    }

    pub fn is_derived(&self, field: &str) -> bool {
        self.derived.iter().any(|d| d.field == field)
    }

    /// Declared on some step and not derived
    pub fn is_editable(&self, field: &str) -> bool {
        self.def.find_field(field).is_some() && !self.is_derived(field)
    }

    /// Last step on which the plan may still change: the plan selection
    /// step, or the first step when the service has none
    pub fn plan_step(&self) -> usize {
        self.steps
            .iter()
            .position(|s| s.def.kind == StepKind::PlanSelection)
            .map_or(1, |i| i + 1)
    }

    /// Recompute every derivation that reads `changed` (all of them when `None`)
    pub fn recompute_derived(&self, state: &mut WizardState, changed: Option<&str>) {
        for d in &self.derived {
            let affected = changed
                .map(|name| d.derivation.inputs().contains(&name))
                .unwrap_or(true);
            if !affected {
                continue;
            }
            match d.derivation.derive(&state.fields) {
                Some(value) => {
                    tracing::debug!(field = %d.field, value = %value, "derived field recomputed");
                    state.derived.insert(d.field.clone(), value);
                }
                None => {
                    state.derived.remove(&d.field);
                }
            }
        }
    }

    /// Derived values keyed by field, for callers that only need a snapshot
    pub fn derive_all(&self, state: &WizardState) -> BTreeMap<String, String> {
        self.derived
            .iter()
            .filter_map(|d| d.derivation.derive(&state.fields).map(|v| (d.field.clone(), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldValue, UploadRecord};

    const SERVICE: &str = r#"
service: professional_tax
title: Professional Tax
id_prefix: PT
plans:
  - { id: basic, label: Basic }
steps:
  - key: details
    title: Details
    fields:
      - { name: entityType, label: Entity type, kind: select, options: [Employer, Professional] }
      - { name: employeeCount, label: Number of employees, kind: number }
      - { name: pan, label: PAN }
    uploads:
      - { slot: panCard, label: PAN card, category: identity, required: true }
    rules:
      - { field: entityType, rule: required }
      - { field: employeeCount, rule: required, when: { field: entityType, equals: Employer } }
      - { field: employeeCount, rule: numeric, when: { field: entityType, equals: Employer } }
      - { field: pan, rule: required }
      - { field: pan, rule: custom, predicate: pan }
  - key: review
    title: Review
    kind: review
"#;

    fn compile(yaml: &str) -> Result<ServiceConfig, CatalogError> {
        let def: ServiceDefinition = serde_yaml::from_str(yaml).unwrap();
        ServiceConfig::compile(def, &PredicateRegistry::builtin(), &DerivationRegistry::builtin())
    }

    fn state() -> WizardState {
        WizardState::new("basic".into())
    }

    #[test]
    fn test_validate_collects_all_failures() {
        let config = compile(SERVICE).unwrap();
        let step = config.step(1).unwrap();
        let errors = step.validate(&state());
        let keys: Vec<_> = errors.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["entityType", "pan", "panCard"]);
        assert_eq!(errors.get("pan"), Some("PAN is required"));
    }

    #[test]
    fn test_conditional_rule_follows_guard() {
        let config = compile(SERVICE).unwrap();
        let step = config.step(1).unwrap();
        let mut state = state();
        state.fields.insert("pan".into(), FieldValue::text("ABCDE1234F"));
        state.uploads.put(
            "panCard",
            UploadRecord {
                original_file_name: "pan.pdf".into(),
                stored_name: "x.pdf".into(),
                remote_url: "memory://x".into(),
                remote_id: "x".into(),
            },
        );

        state.fields.insert("entityType".into(), FieldValue::text("Employer"));
        let errors = step.validate(&state);
        assert_eq!(errors.get("employeeCount"), Some("Number of employees is required"));
        assert!(step.is_required("employeeCount", &state));

        state.fields.insert("entityType".into(), FieldValue::text("Professional"));
        assert!(step.validate(&state).is_empty());
        assert!(!step.is_required("employeeCount", &state));
    }

    #[test]
    fn test_step_lookup_is_one_indexed() {
        let config = compile(SERVICE).unwrap();
        assert_eq!(config.total_steps(), 2);
        assert!(config.step(0).is_none());
        assert_eq!(config.step(2).unwrap().key(), "review");
        assert!(config.step(3).is_none());
        assert!(config.step(2).unwrap().validate(&state()).is_empty());
    }

    #[test]
    fn test_rejects_rule_on_undeclared_field() {
        let yaml = SERVICE.replace("{ field: pan, rule: required }", "{ field: tan, rule: required }");
        let err = compile(&yaml).unwrap_err();
        assert!(err.to_string().contains("undeclared field 'tan'"));
    }

    #[test]
    fn test_rejects_unknown_guard_field() {
        let yaml = SERVICE.replacen(
            "when: { field: entityType, equals: Employer }",
            "when: { field: entityKind, equals: Employer }",
            1,
        );
        let err = compile(&yaml).unwrap_err();
        assert!(err.to_string().contains("entityKind"));
    }

    #[test]
    fn test_rejects_duplicate_steps_and_bad_default() {
        let dup = SERVICE.replace("key: review", "key: details");
        assert!(compile(&dup).is_err());
        let bad_default = SERVICE.replace("id_prefix: PT", "id_prefix: PT\ndefault_plan: gold");
        assert!(compile(&bad_default).is_err());
    }

    #[test]
    fn test_recompute_derived_only_for_inputs() {
        let yaml = r#"
service: itr
title: ITR
id_prefix: ITR
plans: [{ id: basic, label: Basic }]
steps:
  - key: profile
    title: Profile
    fields:
      - { name: taxpayerType, label: Taxpayer type }
      - { name: sourceOfIncome, label: Source of income }
      - { name: fullName, label: Full name }
      - { name: itrFormType, label: ITR form }
derived:
  - { field: itrFormType, derivation: itr_form_type }
"#;
        let config = compile(yaml).unwrap();
        assert!(config.is_derived("itrFormType"));
        assert_eq!(config.derived_fields().len(), 1);
        assert_eq!(config.derived_fields()[0].derivation.name(), "itr_form_type");
        assert!(!config.is_editable("itrFormType"));
        assert!(config.is_editable("fullName"));

        let mut state = state();
        state.fields.insert("taxpayerType".into(), FieldValue::text("Company"));
        config.recompute_derived(&mut state, Some("fullName"));
        assert!(state.derived.is_empty());
        config.recompute_derived(&mut state, Some("taxpayerType"));
        assert_eq!(state.derived.get("itrFormType").map(String::as_str), Some("ITR-6"));
        assert_eq!(config.derive_all(&state), state.derived);

        state.fields.remove("taxpayerType");
        config.recompute_derived(&mut state, None);
        assert!(state.derived.is_empty());
    }

    #[test]
    fn test_rejects_unknown_derivation() {
        let yaml = r#"
service: x
title: X
id_prefix: X
plans: [{ id: basic, label: Basic }]
steps: [{ key: a, title: A }]
derived: [{ field: f, derivation: magic }]
"#;
        let err = compile(yaml).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_plan_step() {
        assert_eq!(compile(SERVICE).unwrap().plan_step(), 1);

        let yaml = r#"
service: x
title: X
id_prefix: X
plans: [{ id: basic, label: Basic }]
steps:
  - { key: intro, title: Intro }
  - { key: plan, title: Plan, kind: plan_selection }
  - { key: review, title: Review, kind: review }
"#;
        assert_eq!(compile(yaml).unwrap().plan_step(), 2);
    }
}
