//! Resource registry
//!
//! Static, ordered description of the managed resources and their
//! capability sets. Loaded once per migration run, read-only afterwards.
//! Pure configuration data; no side effects beyond reading the file.

use crate::error::RegistryError;
use crate::types::{Capability, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// Registry entry describing one managed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Stable resource identifier
    pub id: ResourceId,
    /// Endpoint hint for the gateway layer (opaque to the orchestrator)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Operations the resource supports
    pub capabilities: BTreeSet<Capability>,
}

impl ResourceSpec {
    /// Create a spec with the given capabilities
    #[must_use]
    pub fn new(id: impl Into<ResourceId>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            id: id.into(),
            endpoint: None,
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// Whether the resource supports the given capability
    #[inline]
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// TOML file shape: a sequence of `[[resource]]` tables
#[derive(Debug, Deserialize)]
struct RegistryFile {
    resource: Vec<ResourceSpec>,
}

/// Ordered, validated collection of resource specs
#[derive(Debug, Clone)]
pub struct Registry {
    resources: Vec<ResourceSpec>,
}

impl Registry {
    /// Build a registry from specs, validating as the contract requires:
    /// duplicate ids and capability-less resources are configuration
    /// errors, caught before any plan is built.
    pub fn from_specs(resources: Vec<ResourceSpec>) -> Result<Self, RegistryError> {
        let mut seen: HashSet<&ResourceId> = HashSet::new();
        for spec in &resources {
            if !seen.insert(&spec.id) {
                return Err(RegistryError::DuplicateId(spec.id.clone()));
            }
            if spec.capabilities.is_empty() {
                return Err(RegistryError::NoCapabilities(spec.id.clone()));
            }
        }
        Ok(Self { resources })
    }

    /// Load and validate a registry from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)?;
        let file: RegistryFile = toml::from_str(&raw)?;
        Self::from_specs(file.resource)
    }

    /// Resources in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.resources.iter()
    }

    /// Number of resources
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Look up a resource by id
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| &r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ward(id: &str) -> ResourceSpec {
        ResourceSpec::new(id, [Capability::Grantable, Capability::Revocable])
    }

    #[test]
    fn accepts_distinct_resources() {
        let registry = Registry::from_specs(vec![ward("vat"), ward("jug")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get(&ResourceId::from("vat")).is_some());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let result = Registry::from_specs(vec![ward("vat"), ward("vat")]);
        assert!(matches!(result, Err(RegistryError::DuplicateId(id)) if id.as_str() == "vat"));
    }

    #[test]
    fn rejects_capability_less_resource() {
        let empty = ResourceSpec::new("husk", []);
        let result = Registry::from_specs(vec![empty]);
        assert!(matches!(result, Err(RegistryError::NoCapabilities(id)) if id.as_str() == "husk"));
    }

    #[test]
    fn preserves_declaration_order() {
        let registry =
            Registry::from_specs(vec![ward("vat"), ward("jug"), ward("pot")]).unwrap();
        let ids: Vec<&str> = registry.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["vat", "jug", "pot"]);
    }

    #[test]
    fn loads_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[[resource]]
id = "vat"
capabilities = ["grantable", "revocable"]

[[resource]]
id = "proxy"
endpoint = "0xffff"
capabilities = ["ownable"]
"#
        )
        .unwrap();

        let registry = Registry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 2);
        let proxy = registry.get(&ResourceId::from("proxy")).unwrap();
        assert!(proxy.has(Capability::Ownable));
        assert!(!proxy.has(Capability::Grantable));
        assert_eq!(proxy.endpoint.as_deref(), Some("0xffff"));
    }

    #[test]
    fn load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "resource = 3").unwrap();
        assert!(matches!(Registry::load(file.path()), Err(RegistryError::Parse(_))));
    }
}
