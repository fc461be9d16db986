//! Inventory provider: serves listers from a JSON account snapshot.
//!
//! The snapshot describes an account's resources, optional `depends_on`
//! edges and per-resource removal behavior. Removing a resource that a live
//! resource still depends on fails with a retryable dependency error, so a
//! run has to converge through several sweeps the same way it would against
//! the real provider.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::context::AccountContext;
use crate::core::errors::{Result, SweepError};
use crate::resource::registry::{ListerScope, RemoveOutcome, ResourceLister, ResourceRegistry};
use crate::resource::{GLOBAL_REGION, PropertyValue, Resource};

/// Resource types the snapshot provider always serves, with their scope.
/// A type missing from the snapshot lists empty instead of being unknown.
pub const CATALOGUE: &[(&str, ListerScope)] = &[
    ("DatabaseInstance", ListerScope::Regional),
    ("Function", ListerScope::Regional),
    ("IamPolicy", ListerScope::Global),
    ("IamRole", ListerScope::Global),
    ("IamUser", ListerScope::Global),
    ("Instance", ListerScope::Regional),
    ("LoadBalancer", ListerScope::Regional),
    ("NetworkInterface", ListerScope::Regional),
    ("Queue", ListerScope::Regional),
    ("SecurityGroup", ListerScope::Regional),
    ("Snapshot", ListerScope::Regional),
    ("StorageBucket", ListerScope::Regional),
    ("Subnet", ListerScope::Regional),
    ("Topic", ListerScope::Regional),
    ("Volume", ListerScope::Regional),
    ("Vpc", ListerScope::Regional),
];

fn catalogue_scope(resource_type: &str) -> Option<ListerScope> {
    CATALOGUE
        .iter()
        .find(|(name, _)| *name == resource_type)
        .map(|&(_, scope)| scope)
}

/// How the simulated provider reacts to a removal request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalBehavior {
    /// Removed synchronously.
    #[default]
    Immediate,
    /// Accepted, then disappears after one more liveness observation.
    Eventual,
    /// Refused with a non-retryable error (e.g. deletion protection).
    Denied,
    /// Refused with a retryable error on every attempt.
    Flaky,
}

/// Top-level snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryDocument {
    pub account: AccountContext,
    #[serde(default)]
    pub resources: Vec<InventoryResource>,
}

/// One resource entry in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub region: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    /// Identifiers of resources that cannot be removed while this one exists.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub removal: RemovalBehavior,
}

#[derive(Debug, Clone)]
struct Entry {
    resource: Resource,
    depends_on: Vec<String>,
    behavior: RemovalBehavior,
    /// Liveness observations left before an accepted removal completes.
    pending_observations: Option<u32>,
}

/// Shared mutable state behind every lister of one snapshot.
#[derive(Debug, Default)]
pub struct InventoryStore {
    entries: Mutex<BTreeMap<(String, String), Entry>>,
    remove_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl InventoryStore {
    /// Build a store from a parsed snapshot.
    pub fn from_document(doc: &InventoryDocument) -> Result<Arc<Self>> {
        let mut entries = BTreeMap::new();
        for item in &doc.resources {
            let key = (item.resource_type.clone(), item.id.clone());
            if entries.contains_key(&key) {
                return Err(SweepError::InvalidConfig {
                    details: format!(
                        "inventory lists {} {} more than once",
                        item.resource_type, item.id
                    ),
                });
            }
            let resource = Resource {
                resource_type: item.resource_type.clone(),
                region: item.region.clone(),
                identifier: item.id.clone(),
                label: item.label.clone(),
                properties: item.properties.clone(),
            };
            entries.insert(
                key,
                Entry {
                    resource,
                    depends_on: item.depends_on.clone(),
                    behavior: item.removal,
                    pending_observations: None,
                },
            );
        }
        Ok(Arc::new(Self {
            entries: Mutex::new(entries),
            remove_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }))
    }

    /// Number of removal requests served so far.
    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::Relaxed)
    }

    /// Number of listing requests served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Number of resources still present.
    pub fn remaining(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether a specific resource is still present.
    pub fn contains(&self, resource_type: &str, identifier: &str) -> bool {
        self.entries
            .lock()
            .contains_key(&(resource_type.to_string(), identifier.to_string()))
    }

    /// Catalogue types plus any extra type the snapshot carries.
    fn resource_types(&self) -> BTreeMap<String, ListerScope> {
        let entries = self.entries.lock();
        let mut scopes: BTreeMap<String, ListerScope> = CATALOGUE
            .iter()
            .map(|&(name, scope)| (name.to_string(), scope))
            .collect();
        for ((resource_type, _), entry) in entries.iter() {
            if catalogue_scope(resource_type).is_some() {
                continue;
            }
            let is_global = entry.resource.region == GLOBAL_REGION;
            scopes
                .entry(resource_type.clone())
                .and_modify(|scope| {
                    if !is_global {
                        *scope = ListerScope::Regional;
                    }
                })
                .or_insert(if is_global {
                    ListerScope::Global
                } else {
                    ListerScope::Regional
                });
        }
        scopes
    }

    fn list(&self, resource_type: &str, region: &str) -> Vec<Resource> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let entries = self.entries.lock();
        entries
            .values()
            .filter(|e| e.resource.resource_type == resource_type && e.resource.region == region)
            .map(|e| e.resource.clone())
            .collect()
    }

    fn remove(&self, resource: &Resource) -> Result<RemoveOutcome> {
        self.remove_calls.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        let key = (resource.resource_type.clone(), resource.identifier.clone());
        let Some(behavior) = entries.get(&key).map(|e| e.behavior) else {
            return Ok(RemoveOutcome::Gone);
        };

        let dependents: BTreeSet<String> = entries
            .values()
            .filter(|other| other.depends_on.iter().any(|d| d == &resource.identifier))
            .map(|other| other.resource.identifier.clone())
            .collect();
        if !dependents.is_empty() {
            return Err(SweepError::DependencyViolation {
                resource_type: resource.resource_type.clone(),
                identifier: resource.identifier.clone(),
                dependents: dependents.into_iter().collect(),
            });
        }

        match behavior {
            RemovalBehavior::Immediate => {
                entries.remove(&key);
                Ok(RemoveOutcome::Gone)
            }
            RemovalBehavior::Eventual => {
                if let Some(entry) = entries.get_mut(&key)
                    && entry.pending_observations.is_none()
                {
                    entry.pending_observations = Some(1);
                }
                Ok(RemoveOutcome::Accepted)
            }
            RemovalBehavior::Denied => Err(SweepError::Removal {
                resource_type: resource.resource_type.clone(),
                identifier: resource.identifier.clone(),
                details: "deletion protection enabled".to_string(),
                retryable: false,
            }),
            RemovalBehavior::Flaky => Err(SweepError::Removal {
                resource_type: resource.resource_type.clone(),
                identifier: resource.identifier.clone(),
                details: "request throttled".to_string(),
                retryable: true,
            }),
        }
    }

    fn still_present(&self, resource: &Resource) -> bool {
        let mut entries = self.entries.lock();
        let key = (resource.resource_type.clone(), resource.identifier.clone());
        let Some(entry) = entries.get_mut(&key) else {
            return false;
        };
        let pending = entry.pending_observations;
        match pending {
            Some(0) => {
                entries.remove(&key);
                false
            }
            Some(n) => {
                entry.pending_observations = Some(n - 1);
                true
            }
            None => true,
        }
    }
}

/// Lister for one resource type backed by an [`InventoryStore`].
pub struct InventoryLister {
    resource_type: String,
    scope: ListerScope,
    store: Arc<InventoryStore>,
}

impl InventoryLister {
    pub fn new(resource_type: impl Into<String>, scope: ListerScope, store: Arc<InventoryStore>) -> Self {
        Self {
            resource_type: resource_type.into(),
            scope,
            store,
        }
    }
}

impl ResourceLister for InventoryLister {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn scope(&self) -> ListerScope {
        self.scope
    }

    fn list(&self, region: &str) -> Result<Vec<Resource>> {
        Ok(self.store.list(&self.resource_type, region))
    }

    fn remove(&self, resource: &Resource) -> Result<RemoveOutcome> {
        self.store.remove(resource)
    }

    fn still_present(&self, resource: &Resource) -> Result<bool> {
        Ok(self.store.still_present(resource))
    }
}

/// A loaded snapshot: account identity, registry of listers, and the shared store.
pub struct Inventory {
    pub account: AccountContext,
    pub registry: ResourceRegistry,
    pub store: Arc<InventoryStore>,
}

impl Inventory {
    /// Build listers for every catalogue type and every other type present
    /// in the document.
    pub fn from_document(doc: &InventoryDocument) -> Result<Self> {
        let store = InventoryStore::from_document(doc)?;
        let mut registry = ResourceRegistry::new();
        for (resource_type, scope) in store.resource_types() {
            registry.register(Arc::new(InventoryLister::new(
                resource_type,
                scope,
                Arc::clone(&store),
            )))?;
        }
        Ok(Self {
            account: doc.account.clone(),
            registry,
            store,
        })
    }

    /// Parse a JSON snapshot from a string.
    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: InventoryDocument = serde_json::from_str(raw)?;
        Self::from_document(&doc)
    }

    /// Load a JSON snapshot from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| SweepError::io(path, source))?;
        Self::from_json(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "account": { "id": "111122223333", "alias": "sandbox" },
        "resources": [
            { "type": "Vpc", "region": "us-east-1", "id": "vpc-1" },
            { "type": "Subnet", "region": "us-east-1", "id": "subnet-1", "depends_on": ["vpc-1"] },
            { "type": "IamRole", "region": "global", "id": "admin", "removal": "denied" },
            { "type": "Instance", "region": "us-east-1", "id": "i-1", "removal": "eventual" }
        ]
    }"#;

    #[test]
    fn registry_scopes_follow_regions() {
        let inv = Inventory::from_json(SNAPSHOT).unwrap();
        assert_eq!(inv.account.alias.as_deref(), Some("sandbox"));
        assert_eq!(inv.registry.len(), CATALOGUE.len());
        assert_eq!(inv.registry.get("IamRole").unwrap().scope(), ListerScope::Global);
        assert_eq!(inv.registry.get("Vpc").unwrap().scope(), ListerScope::Regional);
    }

    #[test]
    fn catalogue_types_absent_from_snapshot_list_empty() {
        let inv = Inventory::from_json(SNAPSHOT).unwrap();
        let buckets = inv.registry.get("StorageBucket").unwrap();
        assert!(buckets.list("us-east-1").unwrap().is_empty());
        assert!(!inv.registry.contains("BogusType"));
    }

    #[test]
    fn extra_snapshot_types_take_scope_from_regions() {
        let raw = r#"{"account": {"id": "1"}, "resources": [
            {"type": "HostedZone", "region": "global", "id": "z-1"},
            {"type": "Cluster", "region": "us-east-1", "id": "c-1"}]}"#;
        let inv = Inventory::from_json(raw).unwrap();
        assert_eq!(inv.registry.len(), CATALOGUE.len() + 2);
        assert_eq!(inv.registry.get("HostedZone").unwrap().scope(), ListerScope::Global);
        assert_eq!(inv.registry.get("Cluster").unwrap().scope(), ListerScope::Regional);
    }

    #[test]
    fn dependency_blocks_removal_until_dependent_gone() {
        let inv = Inventory::from_json(SNAPSHOT).unwrap();
        let vpc = inv.registry.get("Vpc").unwrap();
        let subnet = inv.registry.get("Subnet").unwrap();
        let vpc_res = vpc.list("us-east-1").unwrap().remove(0);
        let subnet_res = subnet.list("us-east-1").unwrap().remove(0);

        let err = vpc.remove(&vpc_res).unwrap_err();
        assert_eq!(err.code(), "SWP-2003");
        assert!(err.is_retryable());

        assert_eq!(subnet.remove(&subnet_res).unwrap(), RemoveOutcome::Gone);
        assert_eq!(vpc.remove(&vpc_res).unwrap(), RemoveOutcome::Gone);
        assert_eq!(inv.store.remaining(), 2);
        assert_eq!(inv.store.remove_calls(), 3);
    }

    #[test]
    fn denied_removal_is_not_retryable() {
        let inv = Inventory::from_json(SNAPSHOT).unwrap();
        let role = inv.registry.get("IamRole").unwrap();
        let res = role.list(GLOBAL_REGION).unwrap().remove(0);
        let err = role.remove(&res).unwrap_err();
        assert!(!err.is_retryable());
        assert!(inv.store.contains("IamRole", "admin"));
    }

    #[test]
    fn eventual_removal_needs_one_more_observation() {
        let inv = Inventory::from_json(SNAPSHOT).unwrap();
        let lister = inv.registry.get("Instance").unwrap();
        let res = lister.list("us-east-1").unwrap().remove(0);
        assert_eq!(lister.remove(&res).unwrap(), RemoveOutcome::Accepted);
        assert!(lister.still_present(&res).unwrap());
        // A repeated request does not restart the countdown.
        assert_eq!(lister.remove(&res).unwrap(), RemoveOutcome::Accepted);
        assert!(!lister.still_present(&res).unwrap());
        assert!(!inv.store.contains("Instance", "i-1"));
    }

    #[test]
    fn duplicate_entries_rejected() {
        let raw = r#"{"account": {"id": "1"}, "resources": [
            {"type": "Vpc", "region": "r", "id": "a"},
            {"type": "Vpc", "region": "r", "id": "a"}]}"#;
        let err = Inventory::from_json(raw).err().expect("duplicate");
        assert_eq!(err.code(), "SWP-1001");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, SNAPSHOT).unwrap();
        let inv = Inventory::load(&path).unwrap();
        assert_eq!(inv.store.remaining(), 4);

        let missing = Inventory::load(&dir.path().join("nope.json")).err().expect("missing");
        assert_eq!(missing.code(), "SWP-3001");
    }
}
