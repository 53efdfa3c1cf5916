//! Wizard State Types
//!
//! Field values, upload records and the per-session `WizardState`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::uploads::UploadRegistry;

/// Field name → value map (ordered so payloads serialize deterministically)
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A single collected field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Canonical text form used by rules, guards and derivations
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(d) => d.normalize().to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Empty after trimming (numbers and dates are never blank)
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) | Self::Date(_) => false,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Number(d) => Some(*d),
            Self::Text(s) => Decimal::from_str(s.trim()).ok(),
            Self::Date(_) => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            Self::Number(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        Self::Number(d)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

/// Result of a successful upload, as reported by the upload collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub original_file_name: String,
    pub stored_name: String,
    pub remote_url: String,
    pub remote_id: String,
}

/// A file picked by the user, not yet uploaded
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing the content type from its extension
    pub async fn read(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = content_type_for(&file_name).to_string();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    /// Lower-cased extension without the dot
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}

/// Stored submission lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    #[default]
    Draft,
    Submitting,
    Submitted,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitting => "SUBMITTING",
            Self::Submitted => "SUBMITTED",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque result handed back by the submission collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    /// Backend reference for the filing request
    pub reference: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Mutable per-session wizard state
#[derive(Debug, Clone)]
pub struct WizardState {
    /// 1-indexed, always within `[1, total_steps]`
    pub current_step: usize,
    pub selected_plan: String,
    pub fields: FieldMap,
    /// Read-only projection recomputed from `fields`
    pub derived: BTreeMap<String, String>,
    pub errors: BTreeMap<String, String>,
    pub uploads: UploadRegistry,
    pub submission_status: SubmissionStatus,
    pub submission_result: Option<SubmissionResult>,
    /// Message of the most recent failed attempt, until dismissed or retried
    pub last_submission_error: Option<String>,
}

impl WizardState {
    pub fn new(selected_plan: String) -> Self {
        Self {
            current_step: 1,
            selected_plan,
            fields: FieldMap::new(),
            derived: BTreeMap::new(),
            errors: BTreeMap::new(),
            uploads: UploadRegistry::default(),
            submission_status: SubmissionStatus::Draft,
            submission_result: None,
            last_submission_error: None,
        }
    }

    /// Field value or derived value, as text
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(FieldValue::as_text)
            .or_else(|| self.derived.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_text_forms() {
        assert_eq!(FieldValue::text("abc").as_text(), "abc");
        assert_eq!(FieldValue::Number(dec("1500.00")).as_text(), "1500");
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(FieldValue::Date(date).as_text(), "2024-03-31");
    }

    #[test]
    fn test_blank() {
        assert!(FieldValue::text("   ").is_blank());
        assert!(!FieldValue::text(" x ").is_blank());
        assert!(!FieldValue::Number(dec("0")).is_blank());
    }

    #[test]
    fn test_decimal_from_text() {
        assert_eq!(FieldValue::text(" 42.5 ").as_decimal(), Some(dec("42.5")));
        assert_eq!(FieldValue::text("forty").as_decimal(), None);
    }

    #[test]
    fn test_extension() {
        let file = LocalFile::new("Form16.PDF", "application/pdf", vec![1]);
        assert_eq!(file.extension().as_deref(), Some("pdf"));
        let bare = LocalFile::new("README", "text/plain", vec![1]);
        assert_eq!(bare.extension(), None);
    }

    #[test]
    fn test_lookup_prefers_fields_then_derived() {
        let mut state = WizardState::new("basic".to_string());
        state.derived.insert("itrFormType".into(), "ITR-6".into());
        state.fields.insert("taxpayerType".into(), FieldValue::text("Company"));
        assert_eq!(state.lookup("taxpayerType").as_deref(), Some("Company"));
        assert_eq!(state.lookup("itrFormType").as_deref(), Some("ITR-6"));
        assert_eq!(state.lookup("missing"), None);
    }
}
