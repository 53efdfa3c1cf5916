//! Runtime settings
//!
//! Read from an optional YAML file, then overridden by `FILING_WIZARD_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::submission::{SubmissionIdStrategy, TimestampIdStrategy, UuidIdStrategy};
use crate::uploads::UploadPolicy;

pub const ENV_CATALOG_DIR: &str = "FILING_WIZARD_CATALOG_DIR";
pub const ENV_UPLOAD_DIR: &str = "FILING_WIZARD_UPLOAD_DIR";
pub const ENV_SUBMISSIONS_DIR: &str = "FILING_WIZARD_SUBMISSIONS_DIR";
pub const ENV_MAX_UPLOAD_BYTES: &str = "FILING_WIZARD_MAX_UPLOAD_BYTES";
pub const ENV_ID_STRATEGY: &str = "FILING_WIZARD_ID_STRATEGY";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategyKind {
    #[default]
    Timestamp,
    Uuid,
}

impl IdStrategyKind {
    pub fn build(&self) -> Arc<dyn SubmissionIdStrategy> {
        match self {
            Self::Timestamp => Arc::new(TimestampIdStrategy::new()),
            Self::Uuid => Arc::new(UuidIdStrategy),
        }
    }
}

impl std::str::FromStr for IdStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Ok(Self::Timestamp),
            "uuid" => Ok(Self::Uuid),
            other => Err(format!("unknown id strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardSettings {
    /// Extra service definitions loaded on top of the built-in ones
    pub catalog_dir: Option<PathBuf>,
    pub upload_dir: PathBuf,
    pub submissions_dir: PathBuf,
    pub upload: UploadPolicy,
    pub id_strategy: IdStrategyKind,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            catalog_dir: None,
            upload_dir: PathBuf::from("data/uploads"),
            submissions_dir: PathBuf::from("data/submissions"),
            upload: UploadPolicy::default(),
            id_strategy: IdStrategyKind::default(),
        }
    }
}

impl WizardSettings {
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// File (if given) then process environment
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        settings.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(settings)
    }

    /// Apply `FILING_WIZARD_*` overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_CATALOG_DIR) {
            self.catalog_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup(ENV_UPLOAD_DIR) {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_SUBMISSIONS_DIR) {
            self.submissions_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(ENV_MAX_UPLOAD_BYTES) {
            self.upload.max_bytes = value.trim().parse().map_err(|_| SettingsError::InvalidEnv {
                var: ENV_MAX_UPLOAD_BYTES,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_ID_STRATEGY) {
            self.id_strategy = value.parse().map_err(|_| SettingsError::InvalidEnv {
                var: ENV_ID_STRATEGY,
                value: value.clone(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = WizardSettings::default();
        assert_eq!(settings.upload.max_bytes, 5 * 1024 * 1024);
        assert_eq!(settings.id_strategy, IdStrategyKind::Timestamp);
        assert!(settings.catalog_dir.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = WizardSettings::from_yaml(
            "upload_dir: /srv/uploads\nupload:\n  max_bytes: 1024\nid_strategy: uuid\n",
        )
        .unwrap();
        assert_eq!(settings.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(settings.upload.max_bytes, 1024);
        assert!(settings.upload.allowed_extensions.contains(&"pdf".to_string()));
        assert_eq!(settings.id_strategy, IdStrategyKind::Uuid);
        assert_eq!(settings.submissions_dir, PathBuf::from("data/submissions"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_SUBMISSIONS_DIR, "/tmp/out"),
            (ENV_MAX_UPLOAD_BYTES, "2048"),
            (ENV_ID_STRATEGY, "UUID"),
        ]
        .into_iter()
        .collect();

        let mut settings = WizardSettings::default();
        settings
            .apply_overrides(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.submissions_dir, PathBuf::from("/tmp/out"));
        assert_eq!(settings.upload.max_bytes, 2048);
        assert_eq!(settings.id_strategy, IdStrategyKind::Uuid);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut settings = WizardSettings::default();
        let err = settings
            .apply_overrides(|var| (var == ENV_MAX_UPLOAD_BYTES).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidEnv { var: ENV_MAX_UPLOAD_BYTES, .. }));
    }
}
