//! Document Uploads
//!
//! The per-session slot registry, the upload collaborator seam and a local
//! filesystem implementation of it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::{LocalFile, UploadRecord};

/// Error type for upload operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Unknown document slot: {0}")]
    UnknownSlot(String),

    #[error("Upload rejected: {reason}")]
    Rejected { reason: String },

    #[error("Upload failed: {0}")]
    Transport(String),

    #[error("Uploads are closed once the filing is submitted")]
    Closed,
}

impl UploadError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Retrying the same file may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Slot key → upload record. Overwrite only, no delete.
#[derive(Debug, Clone, Default)]
pub struct UploadRegistry {
    slots: BTreeMap<String, UploadRecord>,
}

impl UploadRegistry {
    /// Store a record, replacing whatever the slot held
    pub fn put(&mut self, slot: impl Into<String>, record: UploadRecord) -> Option<UploadRecord> {
        self.slots.insert(slot.into(), record)
    }

    pub fn get(&self, slot: &str) -> Option<&UploadRecord> {
        self.slots.get(slot)
    }

    pub fn contains(&self, slot: &str) -> bool {
        self.slots.contains_key(slot)
    }

    /// Records in slot-key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UploadRecord)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// External file upload service
#[async_trait]
pub trait UploadCollaborator: Send + Sync {
    /// Upload a file under a category tag, returning where it landed
    async fn upload(&self, file: &LocalFile, category: &str) -> Result<UploadRecord, UploadError>;
}

/// Size and type limits checked before the collaborator is called
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    /// Lower-case extensions without the dot
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            allowed_extensions: ["pdf", "jpg", "jpeg", "png"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl UploadPolicy {
    pub fn check(&self, file: &LocalFile) -> Result<(), UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::rejected(format!("{} is empty", file.file_name)));
        }
        if file.bytes.len() as u64 > self.max_bytes {
            return Err(UploadError::rejected(format!(
                "{} is {} bytes, the limit is {}",
                file.file_name,
                file.bytes.len(),
                self.max_bytes
            )));
        }
        if !self.allowed_extensions.is_empty() {
            let allowed = file
                .extension()
                .map(|ext| self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
                .unwrap_or(false);
            if !allowed {
                return Err(UploadError::rejected(format!(
                    "{} must be one of: {}",
                    file.file_name,
                    self.allowed_extensions.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Content-addressed store on the local filesystem
///
/// Files land at `<base>/<category>/<sha256>.<ext>` and are addressed by a
/// `file://` URL. Uploading identical bytes twice yields the same record.
pub struct LocalUploadStore {
    base_path: PathBuf,
}

impl LocalUploadStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn stored_name(file: &LocalFile, digest: &str) -> String {
        match file.extension() {
            Some(ext) => format!("{digest}.{ext}"),
            None => digest.to_string(),
        }
    }
}

#[async_trait]
impl UploadCollaborator for LocalUploadStore {
    async fn upload(&self, file: &LocalFile, category: &str) -> Result<UploadRecord, UploadError> {
        if category.is_empty() || category.contains(['/', '\\', '.']) {
            return Err(UploadError::rejected(format!("invalid category '{category}'")));
        }

        let digest = hex::encode(Sha256::digest(&file.bytes));
        let stored_name = Self::stored_name(file, &digest);
        let dir = self.base_path.join(category);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(&stored_name);
        tokio::fs::write(&path, &file.bytes).await?;

        Ok(UploadRecord {
            original_file_name: file.file_name.clone(),
            stored_name,
            remote_url: format!("file://{}", path.display()),
            remote_id: digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str) -> UploadRecord {
        UploadRecord {
            original_file_name: name.to_string(),
            stored_name: format!("stored-{name}"),
            remote_url: format!("memory://{name}"),
            remote_id: name.to_string(),
        }
    }

    #[test]
    fn test_registry_overwrites() {
        let mut registry = UploadRegistry::default();
        assert!(registry.get("panCard").is_none());

        assert!(registry.put("panCard", record("a.pdf")).is_none());
        let previous = registry.put("panCard", record("b.pdf"));
        assert_eq!(previous.unwrap().original_file_name, "a.pdf");
        assert_eq!(registry.get("panCard").unwrap().original_file_name, "b.pdf");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_iterates_in_slot_order() {
        let mut registry = UploadRegistry::default();
        registry.put("z", record("z.pdf"));
        registry.put("a", record("a.pdf"));
        let keys: Vec<_> = registry.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "z"]);
    }

    #[test]
    fn test_policy_limits() {
        let policy = UploadPolicy {
            max_bytes: 4,
            ..UploadPolicy::default()
        };
        assert!(policy.check(&LocalFile::new("a.pdf", "application/pdf", vec![1, 2])).is_ok());
        assert!(policy.check(&LocalFile::new("a.PNG", "image/png", vec![1])).is_ok());

        let too_big = policy.check(&LocalFile::new("a.pdf", "application/pdf", vec![0; 5]));
        assert!(matches!(too_big, Err(UploadError::Rejected { .. })));

        let empty = policy.check(&LocalFile::new("a.pdf", "application/pdf", vec![]));
        assert!(matches!(empty, Err(UploadError::Rejected { .. })));

        let exe = policy.check(&LocalFile::new("setup.exe", "application/octet-stream", vec![1]));
        assert!(matches!(exe, Err(UploadError::Rejected { .. })));
        assert!(!exe.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_local_store_writes_content_addressed_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalUploadStore::new(temp_dir.path());
        let file = LocalFile::new("Form16.pdf", "application/pdf", b"form sixteen".to_vec());

        let record = store.upload(&file, "income").await.unwrap();
        assert_eq!(record.original_file_name, "Form16.pdf");
        assert_eq!(record.remote_id.len(), 64);
        assert_eq!(record.stored_name, format!("{}.pdf", record.remote_id));
        assert!(record.remote_url.starts_with("file://"));

        let path = temp_dir.path().join("income").join(&record.stored_name);
        assert_eq!(tokio::fs::read(path).await.unwrap(), b"form sixteen");

        let again = store.upload(&file, "income").await.unwrap();
        assert_eq!(again, record);
    }

    #[tokio::test]
    async fn test_local_store_rejects_path_like_category() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalUploadStore::new(temp_dir.path());
        let file = LocalFile::new("a.pdf", "application/pdf", vec![1]);
        let err = store.upload(&file, "../escape").await.unwrap_err();
        assert!(matches!(err, UploadError::Rejected { .. }));
    }
}
