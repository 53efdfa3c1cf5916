//! Derived fields
//!
//! A derivation is a pure function of the collected fields. The controller
//! re-runs it whenever one of its inputs changes and stores the result in a
//! read-only projection next to the editable fields.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::FieldMap;

pub trait Derivation: Send + Sync {
    fn name(&self) -> &str;

    /// Fields whose change triggers recomputation
    fn inputs(&self) -> &[&'static str];

    /// `None` when the inputs are not yet sufficient
    fn derive(&self, fields: &FieldMap) -> Option<String>;
}

fn text(fields: &FieldMap, name: &str) -> Option<String> {
    fields
        .get(name)
        .map(|v| v.as_text().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Income tax return form from taxpayer type and main source of income
pub struct ItrFormType;

impl Derivation for ItrFormType {
    fn name(&self) -> &str {
        "itr_form_type"
    }

    fn inputs(&self) -> &[&'static str] {
        &["taxpayerType", "sourceOfIncome"]
    }

    fn derive(&self, fields: &FieldMap) -> Option<String> {
        let taxpayer = text(fields, "taxpayerType")?;
        let form = match taxpayer.as_str() {
            "Company" => "ITR-6",
            "Firm" | "LLP" | "AOP/BOI" => "ITR-5",
            "Trust" => "ITR-7",
            "Individual" | "HUF" => {
                let source = text(fields, "sourceOfIncome")?;
                match (taxpayer.as_str(), source.as_str()) {
                    (_, "Business or Profession") => "ITR-3",
                    (_, "Presumptive Business") => "ITR-4",
                    (_, "Capital Gains") => "ITR-2",
                    ("HUF", _) => "ITR-2",
                    (_, "Salary" | "House Property" | "Other Sources") => "ITR-1",
                    _ => "ITR-2",
                }
            }
            _ => return None,
        };
        Some(form.to_string())
    }
}

/// TDS return form from the nature of payment and deductee residency
pub struct TdsFormType;

impl Derivation for TdsFormType {
    fn name(&self) -> &str {
        "tds_form_type"
    }

    fn inputs(&self) -> &[&'static str] {
        &["paymentNature", "deducteeResidency"]
    }

    fn derive(&self, fields: &FieldMap) -> Option<String> {
        let nature = text(fields, "paymentNature")?;
        let form = match nature.as_str() {
            "TCS" => "27EQ",
            "Salary" => "24Q",
            _ => match text(fields, "deducteeResidency").as_deref() {
                Some("Non-Resident") => "27Q",
                Some(_) => "26Q",
                None => return None,
            },
        };
        Some(form.to_string())
    }
}

/// GST return form from taxpayer category and the return being filed
pub struct GstReturnForm;

impl Derivation for GstReturnForm {
    fn name(&self) -> &str {
        "gst_return_form"
    }

    fn inputs(&self) -> &[&'static str] {
        &["taxpayerCategory", "returnType"]
    }

    fn derive(&self, fields: &FieldMap) -> Option<String> {
        let category = text(fields, "taxpayerCategory")?;
        let return_type = text(fields, "returnType")?;
        let form = match (category.as_str(), return_type.as_str()) {
            (_, "Annual") => "GSTR-9",
            ("Composition", "Quarterly") => "CMP-08",
            ("Composition", _) => "GSTR-4",
            (_, "Outward Supplies") => "GSTR-1",
            _ => "GSTR-3B",
        };
        Some(form.to_string())
    }
}

/// Derivations by name
#[derive(Clone, Default)]
pub struct DerivationRegistry {
    derivations: HashMap<String, Arc<dyn Derivation>>,
}

impl std::fmt::Debug for DerivationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivationRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl DerivationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ItrFormType));
        registry.register(Arc::new(TdsFormType));
        registry.register(Arc::new(GstReturnForm));
        registry
    }

    pub fn register(&mut self, derivation: Arc<dyn Derivation>) {
        self.derivations
            .insert(derivation.name().to_string(), derivation);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Derivation>> {
        self.derivations.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.derivations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::text(*v)))
            .collect()
    }

    #[test]
    fn test_company_is_always_itr6() {
        let itr = ItrFormType;
        assert_eq!(itr.derive(&fields(&[("taxpayerType", "Company")])).as_deref(), Some("ITR-6"));
        for source in ["Salary", "Capital Gains", "Business or Profession"] {
            let f = fields(&[("taxpayerType", "Company"), ("sourceOfIncome", source)]);
            assert_eq!(itr.derive(&f).as_deref(), Some("ITR-6"));
        }
    }

    #[test]
    fn test_individual_forms() {
        let itr = ItrFormType;
        let form = |source: &str| {
            itr.derive(&fields(&[("taxpayerType", "Individual"), ("sourceOfIncome", source)]))
        };
        assert_eq!(form("Salary").as_deref(), Some("ITR-1"));
        assert_eq!(form("Capital Gains").as_deref(), Some("ITR-2"));
        assert_eq!(form("Business or Profession").as_deref(), Some("ITR-3"));
        assert_eq!(form("Presumptive Business").as_deref(), Some("ITR-4"));
        assert_eq!(itr.derive(&fields(&[("taxpayerType", "Individual")])), None);
    }

    #[test]
    fn test_other_entities() {
        let itr = ItrFormType;
        assert_eq!(itr.derive(&fields(&[("taxpayerType", "LLP")])).as_deref(), Some("ITR-5"));
        assert_eq!(itr.derive(&fields(&[("taxpayerType", "Trust")])).as_deref(), Some("ITR-7"));
        let huf = fields(&[("taxpayerType", "HUF"), ("sourceOfIncome", "Salary")]);
        assert_eq!(itr.derive(&huf).as_deref(), Some("ITR-2"));
        assert_eq!(itr.derive(&fields(&[])), None);
    }

    #[test]
    fn test_tds_forms() {
        let tds = TdsFormType;
        let form = |nature: &str, residency: &str| {
            tds.derive(&fields(&[("paymentNature", nature), ("deducteeResidency", residency)]))
        };
        assert_eq!(form("Salary", "Resident").as_deref(), Some("24Q"));
        assert_eq!(form("Contract Payment", "Resident").as_deref(), Some("26Q"));
        assert_eq!(form("Contract Payment", "Non-Resident").as_deref(), Some("27Q"));
        assert_eq!(form("TCS", "Resident").as_deref(), Some("27EQ"));
        assert_eq!(tds.derive(&fields(&[("paymentNature", "Rent")])), None);
    }

    #[test]
    fn test_gst_forms() {
        let gst = GstReturnForm;
        let form = |category: &str, kind: &str| {
            gst.derive(&fields(&[("taxpayerCategory", category), ("returnType", kind)]))
        };
        assert_eq!(form("Regular", "Outward Supplies").as_deref(), Some("GSTR-1"));
        assert_eq!(form("Regular", "Monthly Summary").as_deref(), Some("GSTR-3B"));
        assert_eq!(form("Composition", "Quarterly").as_deref(), Some("CMP-08"));
        assert_eq!(form("Composition", "Annual").as_deref(), Some("GSTR-9"));
        assert_eq!(form("Composition", "Yearly Return").as_deref(), Some("GSTR-4"));
    }

    #[test]
    fn test_registry() {
        let registry = DerivationRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec!["gst_return_form", "itr_form_type", "tds_form_type"]
        );
        assert!(registry.get("itr_form_type").is_some());
        assert!(registry.get("missing").is_none());
    }
}
