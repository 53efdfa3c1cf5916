//! Service Definition Types
//!
//! Each filing service is described by one YAML document: its plans, the
//! ordered wizard steps, per-step rules and the derived fields it computes.
//! Definitions are compiled into a `ServiceConfig` by the catalogue.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::FieldValue;

/// A complete service definition loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Service key (e.g., "income_tax_return")
    pub service: String,
    /// Human-readable title
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Prefix for generated submission ids (e.g., "ITR")
    pub id_prefix: String,

    /// Priced tiers selectable before or during the wizard
    pub plans: Vec<PlanDef>,
    /// Plan used when the session carries no (or an unknown) plan
    #[serde(default)]
    pub default_plan: Option<String>,

    /// Ordered steps; step 1 is the first entry
    pub steps: Vec<StepDef>,

    /// Read-only fields computed from other fields
    #[serde(default)]
    pub derived: Vec<DerivedDef>,
}

impl ServiceDefinition {
    /// The fallback plan: `default_plan`, else the first plan listed
    pub fn fallback_plan(&self) -> Option<&str> {
        self.default_plan
            .as_deref()
            .or_else(|| self.plans.first().map(|p| p.id.as_str()))
    }

    pub fn has_plan(&self, plan: &str) -> bool {
        self.plans.iter().any(|p| p.id == plan)
    }

    pub fn is_derived(&self, field: &str) -> bool {
        self.derived.iter().any(|d| d.field == field)
    }

    /// Every editable field declared by any step
    pub fn declared_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.steps
            .iter()
            .flat_map(|s| s.fields.iter())
            .filter(|f| !self.is_derived(&f.name))
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.steps
            .iter()
            .flat_map(|s| s.fields.iter())
            .find(|f| f.name == name)
    }

    pub fn find_slot(&self, slot: &str) -> Option<&SlotDef> {
        self.steps
            .iter()
            .flat_map(|s| s.uploads.iter())
            .find(|s| s.slot == slot)
    }
}

/// Plan tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDef {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// What a step renders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Form,
    PlanSelection,
    Review,
}

/// One wizard step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub uploads: Vec<SlotDef>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// Input kind, used to coerce raw strings from the presentation layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    Date,
    Select,
    Email,
    Phone,
}

impl FieldKind {
    /// Parse raw input for this kind. Unparseable input is kept as text.
    pub fn coerce(&self, raw: &str) -> FieldValue {
        let trimmed = raw.trim();
        match self {
            FieldKind::Number => trimmed
                .parse::<Decimal>()
                .map(FieldValue::Number)
                .unwrap_or_else(|_| FieldValue::text(raw)),
            FieldKind::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(FieldValue::Date)
                .unwrap_or_else(|_| FieldValue::text(raw)),
            _ => FieldValue::text(raw),
        }
    }
}

/// Field shown on a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub kind: FieldKind,
    /// Choices for `select` fields
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    /// Field is only shown (and its rules only apply) while this holds
    #[serde(default)]
    pub visible_when: Option<Guard>,
}

/// Logical document requirement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDef {
    pub slot: String,
    pub label: String,
    /// Category tag passed to the upload collaborator
    pub category: String,
    /// Step cannot advance until this slot holds an upload
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub visible_when: Option<Guard>,
}

/// Field rule declared on a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub field: String,
    #[serde(flatten)]
    pub check: RuleCheck,
    /// Rule only applies while this guard holds
    #[serde(default)]
    pub when: Option<Guard>,
    /// Skip the rule when the value is empty
    #[serde(default)]
    pub optional: bool,
    /// Overrides the default message
    #[serde(default)]
    pub message: Option<String>,
}

/// Rule check kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleCheck {
    /// Non-empty after trimming
    Required,
    ExactLength { len: usize },
    MinLength { len: usize },
    MaxLength { len: usize },
    /// Full-match regular expression
    Pattern { regex: String },
    OneOf { values: Vec<String> },
    Numeric,
    /// Named predicate from the predicate registry
    Custom { predicate: String },
}

/// Condition over the current field values and selected plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Guard {
    FieldEquals {
        field: String,
        equals: String,
    },
    FieldIn {
        field: String,
        #[serde(rename = "in")]
        values: Vec<String>,
    },
    PlanIn {
        plan: Vec<String>,
    },
    All {
        all: Vec<Guard>,
    },
    Not {
        not: Box<Guard>,
    },
}

impl Guard {
    /// Evaluate against a value lookup and the selected plan
    pub fn holds(&self, lookup: &dyn Fn(&str) -> Option<String>, plan: &str) -> bool {
        match self {
            Guard::FieldEquals { field, equals } => lookup(field)
                .map(|v| v.trim() == equals)
                .unwrap_or(false),
            Guard::FieldIn { field, values } => lookup(field)
                .map(|v| values.iter().any(|c| c == v.trim()))
                .unwrap_or(false),
            Guard::PlanIn { plan: plans } => plans.iter().any(|p| p == plan),
            Guard::All { all } => all.iter().all(|g| g.holds(lookup, plan)),
            Guard::Not { not } => !not.holds(lookup, plan),
        }
    }

    /// Field names this guard reads
    pub fn referenced_fields(&self) -> Vec<&str> {
        match self {
            Guard::FieldEquals { field, .. } | Guard::FieldIn { field, .. } => vec![field.as_str()],
            Guard::PlanIn { .. } => Vec::new(),
            Guard::All { all } => all.iter().flat_map(|g| g.referenced_fields()).collect(),
            Guard::Not { not } => not.referenced_fields(),
        }
    }
}

/// Derived field binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedDef {
    pub field: String,
    /// Name of a registered derivation
    pub derivation: String,
}
