//! Step validation
//!
//! Rules are compiled once per service (patterns built, predicates resolved)
//! and evaluated against the wizard state when the user presses Next.

use regex::Regex;
use std::collections::BTreeMap;

use crate::definition::{Guard, RuleCheck, RuleDef};
use crate::predicates::{PredicateFn, PredicateRegistry};
use crate::types::{FieldValue, WizardState};

/// Validation failures for one step, keyed by field name or slot key
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{} field(s) need attention", .errors.len())]
pub struct ValidationErrors {
    errors: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure unless the key already has one
    pub fn add(&mut self, key: &str, message: impl Into<String>) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.errors.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.errors.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.errors
    }
}

/// Compiled rule check
#[derive(Clone)]
pub enum Check {
    Required,
    ExactLength(usize),
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    OneOf(Vec<String>),
    Numeric,
    Custom(PredicateFn),
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required => write!(f, "Required"),
            Self::ExactLength(n) => write!(f, "ExactLength({n})"),
            Self::MinLength(n) => write!(f, "MinLength({n})"),
            Self::MaxLength(n) => write!(f, "MaxLength({n})"),
            Self::Pattern(re) => write!(f, "Pattern({})", re.as_str()),
            Self::OneOf(values) => write!(f, "OneOf({values:?})"),
            Self::Numeric => write!(f, "Numeric"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// A field rule ready for evaluation
#[derive(Debug, Clone)]
pub struct Rule {
    pub field: String,
    pub check: Check,
    pub when: Option<Guard>,
    pub optional: bool,
    pub message: String,
}

impl Rule {
    /// Resolve a rule definition. `label` is the field's display label.
    pub fn compile(def: &RuleDef, label: &str, predicates: &PredicateRegistry) -> Result<Self, String> {
        let (check, default_message) = match &def.check {
            RuleCheck::Required => (Check::Required, format!("{label} is required")),
            RuleCheck::ExactLength { len } => (
                Check::ExactLength(*len),
                format!("{label} must be exactly {len} characters"),
            ),
            RuleCheck::MinLength { len } => (
                Check::MinLength(*len),
                format!("{label} must be at least {len} characters"),
            ),
            RuleCheck::MaxLength { len } => (
                Check::MaxLength(*len),
                format!("{label} must be at most {len} characters"),
            ),
            RuleCheck::Pattern { regex } => {
                let re = Regex::new(&format!("^(?:{regex})$"))
                    .map_err(|e| format!("rule for '{}' has an invalid pattern: {e}", def.field))?;
                (Check::Pattern(re), format!("{label} is not in the expected format"))
            }
            RuleCheck::OneOf { values } => (
                Check::OneOf(values.clone()),
                format!("{label} must be one of: {}", values.join(", ")),
            ),
            RuleCheck::Numeric => (Check::Numeric, format!("{label} must be a number")),
            RuleCheck::Custom { predicate } => {
                let found = predicates.get(predicate).ok_or_else(|| {
                    format!("rule for '{}' uses unknown predicate '{predicate}'", def.field)
                })?;
                (Check::Custom(found.check.clone()), found.message.clone())
            }
        };

        Ok(Self {
            field: def.field.clone(),
            check,
            when: def.when.clone(),
            optional: def.optional,
            message: def.message.clone().unwrap_or(default_message),
        })
    }

    /// Guard holds for the current values and plan
    pub fn is_active(&self, state: &WizardState) -> bool {
        self.when
            .as_ref()
            .map(|g| g.holds(&|name| state.lookup(name), &state.selected_plan))
            .unwrap_or(true)
    }

    /// `true` when the value passes. Missing values read as empty.
    pub fn passes(&self, state: &WizardState) -> bool {
        let value = match state.fields.get(&self.field) {
            Some(value) => value.clone(),
            None => FieldValue::text(state.derived.get(&self.field).cloned().unwrap_or_default()),
        };
        if self.optional && value.is_blank() {
            return true;
        }

        let text = value.as_text();
        let text = text.trim();
        match &self.check {
            Check::Required => !value.is_blank(),
            Check::ExactLength(n) => text.chars().count() == *n,
            Check::MinLength(n) => text.chars().count() >= *n,
            Check::MaxLength(n) => text.chars().count() <= *n,
            Check::Pattern(re) => re.is_match(text),
            Check::OneOf(values) => values.iter().any(|v| v == text),
            Check::Numeric => value.as_decimal().is_some(),
            Check::Custom(predicate) => predicate(&value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(yaml: &str) -> Rule {
        let def: RuleDef = serde_yaml::from_str(yaml).unwrap();
        Rule::compile(&def, "Field", &PredicateRegistry::builtin()).unwrap()
    }

    fn state_with(name: &str, value: &str) -> WizardState {
        let mut state = WizardState::new("basic".into());
        state.fields.insert(name.into(), FieldValue::text(value));
        state
    }

    #[test]
    fn test_required() {
        let r = rule("field: a\nrule: required\n");
        assert!(r.passes(&state_with("a", "x")));
        assert!(!r.passes(&state_with("a", "   ")));
        assert!(!r.passes(&WizardState::new("basic".into())));
        assert_eq!(r.message, "Field is required");
    }

    #[test]
    fn test_lengths_count_characters() {
        let exact = rule("field: a\nrule: exact_length\nlen: 3\n");
        assert!(exact.passes(&state_with("a", "abc")));
        assert!(exact.passes(&state_with("a", " abc ")));
        assert!(!exact.passes(&state_with("a", "ab")));
        assert!(exact.passes(&state_with("a", "₹₹₹")));

        let min = rule("field: a\nrule: min_length\nlen: 2\n");
        assert!(!min.passes(&state_with("a", "a")));
        let max = rule("field: a\nrule: max_length\nlen: 2\n");
        assert!(!max.passes(&state_with("a", "abc")));
    }

    #[test]
    fn test_optional_skips_empty() {
        let r = rule("field: a\nrule: custom\npredicate: pan\noptional: true\n");
        assert!(r.passes(&WizardState::new("basic".into())));
        assert!(!r.passes(&state_with("a", "bad")));
        assert!(r.passes(&state_with("a", "ABCDE1234F")));
        assert_eq!(r.message, "Enter a valid 10-character PAN");
    }

    #[test]
    fn test_pattern_is_anchored() {
        let r = rule("field: a\nrule: pattern\nregex: '[0-9]{4}'\n");
        assert!(r.passes(&state_with("a", "2024")));
        assert!(!r.passes(&state_with("a", "20245")));
    }

    #[test]
    fn test_one_of_and_numeric() {
        let one_of = rule("field: a\nrule: one_of\nvalues: [Monthly, Quarterly]\n");
        assert!(one_of.passes(&state_with("a", "Monthly")));
        assert!(!one_of.passes(&state_with("a", "Weekly")));
        let numeric = rule("field: a\nrule: numeric\nmessage: Digits only\n");
        assert!(numeric.passes(&state_with("a", "12.5")));
        assert!(!numeric.passes(&state_with("a", "twelve")));
        assert_eq!(numeric.message, "Digits only");
    }

    #[test]
    fn test_guarded_rule() {
        let r = rule("field: n\nrule: required\nwhen: { field: kind, equals: Employer }\n");
        assert!(r.is_active(&state_with("kind", "Employer")));
        assert!(!r.is_active(&state_with("kind", "Professional")));
        assert!(!r.is_active(&WizardState::new("basic".into())));
    }

    #[test]
    fn test_compile_errors() {
        let predicates = PredicateRegistry::builtin();
        let bad_regex: RuleDef = serde_yaml::from_str("field: a\nrule: pattern\nregex: '('\n").unwrap();
        assert!(Rule::compile(&bad_regex, "A", &predicates).is_err());
        let unknown: RuleDef = serde_yaml::from_str("field: a\nrule: custom\npredicate: nope\n").unwrap();
        let err = Rule::compile(&unknown, "A", &predicates).unwrap_err();
        assert!(err.contains("nope"));
    }

    #[test]
    fn test_validation_errors_keep_first_message() {
        let mut errors = ValidationErrors::new();
        errors.add("cin", "first");
        errors.add("cin", "second");
        errors.add("pan", "other");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("cin"), Some("first"));
        assert_eq!(errors.to_string(), "2 field(s) need attention");
    }
}
