//! Named validation predicates
//!
//! Rules of kind `custom` refer to a predicate by name. Names are resolved
//! when the catalogue compiles a service, so a typo fails at load time rather
//! than on the user's first click.

use chrono::{NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use crate::types::FieldValue;

pub type PredicateFn = Arc<dyn Fn(&FieldValue) -> bool + Send + Sync>;

/// A registered predicate and the message shown when it fails
#[derive(Clone)]
pub struct Predicate {
    pub check: PredicateFn,
    pub message: String,
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predicate")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Predicate>,
}

static PAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").unwrap());
static GSTIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").unwrap()
});
static TAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{4}[0-9]{5}[A-Z]$").unwrap());
static CIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[LU][0-9]{5}[A-Z]{2}[0-9]{4}[A-Z]{3}[0-9]{6}$").unwrap()
});
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
static MOBILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[6-9][0-9]{9}$").unwrap());
static PINCODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[1-9][0-9]{5}$").unwrap());

fn matches(re: &'static LazyLock<Regex>) -> impl Fn(&FieldValue) -> bool + Send + Sync {
    move |value| re.is_match(value.as_text().trim())
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the identifier and amount checks
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("pan", "Enter a valid 10-character PAN", matches(&PAN));
        registry.register("gstin", "Enter a valid 15-character GSTIN", matches(&GSTIN));
        registry.register("tan", "Enter a valid 10-character TAN", matches(&TAN));
        registry.register("cin", "Enter a valid 21-character CIN", matches(&CIN));
        registry.register("email", "Enter a valid email address", matches(&EMAIL));
        registry.register("mobile", "Enter a valid 10-digit mobile number", matches(&MOBILE));
        registry.register("pincode", "Enter a valid 6-digit PIN code", matches(&PINCODE));
        registry.register("positive_amount", "Enter an amount greater than zero", |value| {
            value.as_decimal().is_some_and(|d| d > Decimal::ZERO)
        });
        registry.register("not_future_date", "Date cannot be in the future", |value| {
            value
                .as_date()
                .is_some_and(|d| d <= today())
        });
        registry
    }

    /// Register (or replace) a predicate
    pub fn register<F>(&mut self, name: &str, message: &str, check: F)
    where
        F: Fn(&FieldValue) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(
            name.to_string(),
            Predicate {
                check: Arc::new(check),
                message: message.to_string(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Predicate> {
        self.predicates.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.predicates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, value: &str) -> bool {
        let registry = PredicateRegistry::builtin();
        let predicate = registry.get(name).unwrap();
        (predicate.check)(&FieldValue::text(value))
    }

    #[test]
    fn test_identifiers() {
        assert!(check("pan", "ABCDE1234F"));
        assert!(!check("pan", "ABCDE1234"));
        assert!(check("gstin", "27ABCDE1234F1Z5"));
        assert!(!check("gstin", "27ABCDE1234F1X5"));
        assert!(check("tan", "MUMA12345B"));
        assert!(check("cin", "U74999MH2015PTC123456"));
        assert!(!check("cin", "U74999MH2015PTC12345"));
    }

    #[test]
    fn test_contact_details() {
        assert!(check("email", "owner@example.in"));
        assert!(!check("email", "owner@example"));
        assert!(check("mobile", " 9876543210 "));
        assert!(!check("mobile", "1234567890"));
        assert!(check("pincode", "560001"));
        assert!(!check("pincode", "060001"));
    }

    #[test]
    fn test_amounts_and_dates() {
        assert!(check("positive_amount", "1500.50"));
        assert!(!check("positive_amount", "0"));
        assert!(!check("positive_amount", "abc"));
        assert!(check("not_future_date", "2020-01-01"));
        assert!(!check("not_future_date", "2999-01-01"));
        assert!(!check("not_future_date", "01/01/2020"));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = PredicateRegistry::new();
        registry.register("even", "Must be even", |v| {
            v.as_decimal().is_some_and(|d| d % Decimal::TWO == Decimal::ZERO)
        });
        assert_eq!(registry.names(), vec!["even"]);
        assert_eq!(registry.get("even").unwrap().message, "Must be even");
        assert!(registry.get("pan").is_none());
    }
}
