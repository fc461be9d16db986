//! Resource registry: resource-type name → listing/removal capability.
//!
//! The registry is assembled once at startup and then only read. Listers are
//! shared with scheduler worker threads through `Arc`.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::errors::{Result, SweepError};
use crate::resource::{GLOBAL_REGION, Resource};

/// Which regions a lister applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListerScope {
    /// Only listed for the `global` region.
    Global,
    /// Listed for every configured region except `global`.
    Regional,
}

impl ListerScope {
    /// Whether a lister with this scope should run in `region`.
    #[must_use]
    pub fn applies_to(self, region: &str) -> bool {
        match self {
            Self::Global => region == GLOBAL_REGION,
            Self::Regional => region != GLOBAL_REGION,
        }
    }
}

/// Result of a removal request that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The provider confirmed the resource is gone.
    Gone,
    /// The request was accepted; the resource may still be visible for a while.
    Accepted,
}

/// Capability implemented once per cloud resource kind.
pub trait ResourceLister: Send + Sync {
    /// Registry key, e.g. `StorageBucket`.
    fn resource_type(&self) -> &str;

    fn scope(&self) -> ListerScope {
        ListerScope::Regional
    }

    /// Enumerate current resources in `region`.
    fn list(&self, region: &str) -> Result<Vec<Resource>>;

    /// Request removal of one resource.
    fn remove(&self, resource: &Resource) -> Result<RemoveOutcome>;

    /// Whether the resource is still visible. Defaults to a fresh listing.
    fn still_present(&self, resource: &Resource) -> Result<bool> {
        Ok(self
            .list(&resource.region)?
            .iter()
            .any(|r| r.identifier == resource.identifier))
    }
}

/// Mapping from resource-type name to its lister.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    listers: BTreeMap<String, Arc<dyn ResourceLister>>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lister. Registering the same type twice is a configuration error.
    pub fn register(&mut self, lister: Arc<dyn ResourceLister>) -> Result<()> {
        let name = lister.resource_type().to_string();
        if self.listers.contains_key(&name) {
            return Err(SweepError::InvalidConfig {
                details: format!("resource type {name:?} registered twice"),
            });
        }
        self.listers.insert(name, lister);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, resource_type: &str) -> Option<&Arc<dyn ResourceLister>> {
        self.listers.get(resource_type)
    }

    /// Like [`get`](Self::get) but reports an unknown type as an error.
    pub fn require(&self, resource_type: &str) -> Result<&Arc<dyn ResourceLister>> {
        self.get(resource_type)
            .ok_or_else(|| SweepError::UnknownResourceType {
                resource_type: resource_type.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, resource_type: &str) -> bool {
        self.listers.contains_key(resource_type)
    }

    /// Registered type names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.listers.keys().map(String::as_str).collect()
    }

    /// Iterate listers in sorted type-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ResourceLister>)> {
        self.listers.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listers.is_empty()
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("types", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        scope: ListerScope,
        items: Vec<Resource>,
    }

    impl ResourceLister for Fixed {
        fn resource_type(&self) -> &str {
            self.name
        }

        fn scope(&self) -> ListerScope {
            self.scope
        }

        fn list(&self, region: &str) -> Result<Vec<Resource>> {
            Ok(self
                .items
                .iter()
                .filter(|r| r.region == region)
                .cloned()
                .collect())
        }

        fn remove(&self, _resource: &Resource) -> Result<RemoveOutcome> {
            Ok(RemoveOutcome::Gone)
        }
    }

    fn fixed(name: &'static str, scope: ListerScope) -> Arc<dyn ResourceLister> {
        Arc::new(Fixed {
            name,
            scope,
            items: vec![Resource::new(name, "us-east-1", "a")],
        })
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = ResourceRegistry::new();
        reg.register(fixed("Vpc", ListerScope::Regional)).unwrap();
        reg.register(fixed("IamRole", ListerScope::Global)).unwrap();
        reg.register(fixed("Instance", ListerScope::Regional)).unwrap();
        assert_eq!(reg.names(), vec!["IamRole", "Instance", "Vpc"]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut reg = ResourceRegistry::new();
        reg.register(fixed("Vpc", ListerScope::Regional)).unwrap();
        let err = reg.register(fixed("Vpc", ListerScope::Regional)).unwrap_err();
        assert_eq!(err.code(), "SWP-1001");
    }

    #[test]
    fn require_reports_unknown_type() {
        let reg = ResourceRegistry::new();
        let err = reg.require("Nope").err().expect("unknown type");
        assert_eq!(err.code(), "SWP-1103");
    }

    #[test]
    fn scope_applies_to_regions() {
        assert!(ListerScope::Global.applies_to(GLOBAL_REGION));
        assert!(!ListerScope::Global.applies_to("us-east-1"));
        assert!(ListerScope::Regional.applies_to("us-east-1"));
        assert!(!ListerScope::Regional.applies_to(GLOBAL_REGION));
    }

    #[test]
    fn default_still_present_relists() {
        let lister = fixed("Vpc", ListerScope::Regional);
        let present = Resource::new("Vpc", "us-east-1", "a");
        let absent = Resource::new("Vpc", "us-east-1", "b");
        assert!(lister.still_present(&present).unwrap());
        assert!(!lister.still_present(&absent).unwrap());
    }
}
