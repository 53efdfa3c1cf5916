//! Service Catalogue
//!
//! Loads service definitions from YAML and compiles them against the
//! predicate and derivation registries. The ten built-in services are
//! embedded in the library; deployments can load their own from a directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::definition::ServiceDefinition;
use crate::derive::DerivationRegistry;
use crate::error::{CatalogError, WizardError};
use crate::predicates::PredicateRegistry;

const BUILTIN_SERVICES: &[&str] = &[
    include_str!("../services/advance_tax.yaml"),
    include_str!("../services/company_registration.yaml"),
    include_str!("../services/esi_filing.yaml"),
    include_str!("../services/gst_audit.yaml"),
    include_str!("../services/gst_cancellation.yaml"),
    include_str!("../services/gst_returns.yaml"),
    include_str!("../services/income_tax_return.yaml"),
    include_str!("../services/professional_tax.yaml"),
    include_str!("../services/roc_annual_return.yaml"),
    include_str!("../services/tds_return.yaml"),
];

/// Compiled services by key
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    predicates: PredicateRegistry,
    derivations: DerivationRegistry,
    services: BTreeMap<String, Arc<ServiceConfig>>,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::new(PredicateRegistry::builtin(), DerivationRegistry::builtin())
    }
}

impl ServiceCatalog {
    /// Empty catalogue over the given registries
    pub fn new(predicates: PredicateRegistry, derivations: DerivationRegistry) -> Self {
        Self {
            predicates,
            derivations,
            services: BTreeMap::new(),
        }
    }

    /// Catalogue of the embedded services with the built-in registries
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for yaml in BUILTIN_SERVICES {
            catalog.add_yaml(yaml)?;
        }
        Ok(catalog)
    }

    /// Parse, compile and register one service
    pub fn add_yaml(&mut self, yaml: &str) -> Result<Arc<ServiceConfig>, CatalogError> {
        let def: ServiceDefinition = serde_yaml::from_str(yaml)?;
        self.add_definition(def)
    }

    pub fn add_definition(&mut self, def: ServiceDefinition) -> Result<Arc<ServiceConfig>, CatalogError> {
        if self.services.contains_key(&def.service) {
            return Err(CatalogError::Duplicate(def.service));
        }
        let config = Arc::new(ServiceConfig::compile(def, &self.predicates, &self.derivations)?);
        tracing::debug!(
            service = %config.key(),
            steps = config.total_steps(),
            "service registered"
        );
        self.services
            .insert(config.key().to_string(), Arc::clone(&config));
        Ok(config)
    }

    /// Load every `.yaml`/`.yml` file in a directory. A missing directory is empty.
    pub fn load_from_dir(&mut self, dir: &Path) -> Result<usize, CatalogError> {
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "service directory does not exist");
            return Ok(0);
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path
                .extension()
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false)
            {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            self.load_from_file(path)?;
        }
        Ok(paths.len())
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<Arc<ServiceConfig>, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        self.add_yaml(&content)
    }

    pub fn get(&self, service: &str) -> Result<Arc<ServiceConfig>, WizardError> {
        self.services
            .get(service)
            .cloned()
            .ok_or_else(|| WizardError::UnknownService(service.to_string()))
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceConfig> {
        self.services.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
service: minimal
title: Minimal
id_prefix: MIN
plans: [{ id: basic, label: Basic }]
steps: [{ key: review, title: Review, kind: review }]
"#;

    #[test]
    fn test_builtin_services_compile() {
        let catalog = ServiceCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 10);
        let keys: Vec<_> = catalog.services().map(|s| s.key().to_string()).collect();
        assert!(keys.contains(&"income_tax_return".to_string()));
        assert!(keys.contains(&"roc_annual_return".to_string()));

        for service in catalog.services() {
            assert!(service.total_steps() >= 3, "{} is too short", service.key());
            assert!(service.def.fallback_plan().is_some());
        }
    }

    #[test]
    fn test_unknown_service() {
        let catalog = ServiceCatalog::builtin().unwrap();
        assert_eq!(
            catalog.get("crypto_tax").unwrap_err(),
            WizardError::UnknownService("crypto_tax".into())
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = ServiceCatalog::default();
        catalog.add_yaml(MINIMAL).unwrap();
        assert!(matches!(
            catalog.add_yaml(MINIMAL),
            Err(CatalogError::Duplicate(key)) if key == "minimal"
        ));
    }

    #[test]
    fn test_bad_yaml_reports_parse_error() {
        let mut catalog = ServiceCatalog::default();
        assert!(matches!(catalog.add_yaml("service: [oops"), Err(CatalogError::Yaml(_))));
    }

    #[test]
    fn test_load_from_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("minimal.yaml"), MINIMAL).unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let mut catalog = ServiceCatalog::default();
        assert_eq!(catalog.load_from_dir(temp_dir.path()).unwrap(), 1);
        assert!(catalog.get("minimal").is_ok());

        let missing = temp_dir.path().join("absent");
        assert_eq!(catalog.load_from_dir(&missing).unwrap(), 0);
    }
}
