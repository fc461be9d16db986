//! Lazy scan pipeline.
//!
//! Jobs are the enabled `(resource type, region)` pairs: types in sorted
//! order, regions in configuration order, global listers only for the
//! `global` region. Each job is listed on demand when the iterator runs dry,
//! so a consumer can stop early without paying for the rest of the account.
//! A listing failure becomes a [`ScanItem::Failure`] and the scan moves on.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::SweepError;
use crate::core::timeout::call_with_timeout;
use crate::filter::engine::{FilterDecision, FilterEngine};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, ResourceRef};
use crate::resource::Resource;
use crate::resource::registry::{ResourceLister, ResourceRegistry};

/// A listed resource with its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedResource {
    pub resource: Resource,
    pub decision: FilterDecision,
}

impl ClassifiedResource {
    #[must_use]
    pub fn is_candidate(&self) -> bool {
        !self.decision.filtered
    }
}

/// A `(type, region)` listing that could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub resource_type: String,
    pub region: String,
    pub error_code: String,
    pub message: String,
}

impl ScanFailure {
    fn new(resource_type: &str, region: &str, error: &SweepError) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            region: region.to_string(),
            error_code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScanItem {
    Classified(ClassifiedResource),
    Failure(ScanFailure),
}

/// Everything one scan produced, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub resources: Vec<ClassifiedResource>,
    pub failures: Vec<ScanFailure>,
}

impl ScanResult {
    pub fn candidates(&self) -> impl Iterator<Item = &ClassifiedResource> {
        self.resources.iter().filter(|c| c.is_candidate())
    }

    pub fn protected(&self) -> impl Iterator<Item = &ClassifiedResource> {
        self.resources.iter().filter(|c| !c.is_candidate())
    }

    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.candidates().count()
    }

    #[must_use]
    pub fn filtered_count(&self) -> usize {
        self.resources.len() - self.candidate_count()
    }
}

impl FromIterator<ScanItem> for ScanResult {
    fn from_iter<I: IntoIterator<Item = ScanItem>>(iter: I) -> Self {
        let mut result = Self::default();
        for item in iter {
            match item {
                ScanItem::Classified(c) => result.resources.push(c),
                ScanItem::Failure(f) => result.failures.push(f),
            }
        }
        result
    }
}

/// Borrowed view of everything a scan needs.
#[derive(Debug, Clone, Copy)]
pub struct Scanner<'a> {
    registry: &'a ResourceRegistry,
    engine: &'a FilterEngine,
    regions: &'a [String],
    call_timeout: Duration,
    logger: Option<&'a ActivityLoggerHandle>,
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub fn new(registry: &'a ResourceRegistry, engine: &'a FilterEngine, regions: &'a [String]) -> Self {
        Self {
            registry,
            engine,
            regions,
            call_timeout: Duration::ZERO,
            logger: None,
        }
    }

    /// Bound every `list` call. `Duration::ZERO` disables the bound.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Option<&'a ActivityLoggerHandle>) -> Self {
        self.logger = logger;
        self
    }

    /// The ordered `(type, region)` pairs this scanner will list.
    #[must_use]
    pub fn jobs(&self) -> Vec<(String, String)> {
        self.plan()
            .into_iter()
            .map(|(lister, region)| (lister.resource_type().to_string(), region))
            .collect()
    }

    #[must_use]
    pub fn iter(&self) -> ScanIter<'a> {
        ScanIter {
            scanner: *self,
            jobs: self.plan().into(),
            buffer: VecDeque::new(),
        }
    }

    /// Drain the whole scan.
    #[must_use]
    pub fn collect(&self) -> ScanResult {
        self.iter().collect()
    }

    fn plan(&self) -> Vec<(Arc<dyn ResourceLister>, String)> {
        let mut jobs = Vec::new();
        for (name, lister) in self.registry.iter() {
            if !self.engine.is_enabled(name) {
                continue;
            }
            for region in self.regions {
                if lister.scope().applies_to(region) {
                    jobs.push((Arc::clone(lister), region.clone()));
                }
            }
        }
        jobs
    }
}

/// Iterator returned by [`Scanner::iter`].
pub struct ScanIter<'a> {
    scanner: Scanner<'a>,
    jobs: VecDeque<(Arc<dyn ResourceLister>, String)>,
    buffer: VecDeque<ScanItem>,
}

impl ScanIter<'_> {
    fn run_job(&mut self, lister: &Arc<dyn ResourceLister>, region: &str) {
        let resource_type = lister.resource_type().to_string();
        let operation = format!("list {resource_type} in {region}");
        let call_lister = Arc::clone(lister);
        let call_region = region.to_string();
        let listed = call_with_timeout(&operation, self.scanner.call_timeout, move || {
            call_lister.list(&call_region)
        });

        match listed {
            Ok(mut resources) => {
                resources.sort_by(|a, b| a.identifier.cmp(&b.identifier));
                for resource in resources {
                    let decision = self.scanner.engine.classify(&resource);
                    if let Some(log) = self.scanner.logger {
                        log.send(ActivityEvent::ResourceClassified {
                            resource: ResourceRef::from(&resource),
                            filtered: decision.filtered,
                            reason: decision.reason.to_string(),
                        });
                    }
                    self.buffer
                        .push_back(ScanItem::Classified(ClassifiedResource { resource, decision }));
                }
            }
            Err(error) => {
                if let Some(log) = self.scanner.logger {
                    log.send(ActivityEvent::ScanFailed {
                        resource_type: resource_type.clone(),
                        region: region.to_string(),
                        error_code: error.code().to_string(),
                        error_message: error.to_string(),
                    });
                }
                self.buffer
                    .push_back(ScanItem::Failure(ScanFailure::new(&resource_type, region, &error)));
            }
        }
    }
}

impl Iterator for ScanIter<'_> {
    type Item = ScanItem;

    fn next(&mut self) -> Option<ScanItem> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            let (lister, region) = self.jobs.pop_front()?;
            self.run_job(&lister, &region);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Config, TypeSelection};
    use crate::core::errors::Result;
    use crate::filter::engine::DecisionReason;
    use crate::resource::inventory::Inventory;
    use crate::resource::registry::{ListerScope, RemoveOutcome};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CONFIG: &str = r#"
regions = ["global", "us-east-1", "eu-west-1"]
account_blocklist = ["999"]

[accounts."111".filters]
StorageBucket = ["keep-me"]
"#;

    const INVENTORY: &str = r#"{
  "account": {"id": "111", "alias": "sandbox"},
  "resources": [
    {"type": "StorageBucket", "region": "us-east-1", "id": "zeta"},
    {"type": "StorageBucket", "region": "us-east-1", "id": "keep-me"},
    {"type": "StorageBucket", "region": "eu-west-1", "id": "alpha"},
    {"type": "IamRole", "region": "global", "id": "admin"}
  ]
}"#;

    fn targets(names: &[&str]) -> TypeSelection {
        TypeSelection {
            targets: names.iter().map(ToString::to_string).collect(),
            excludes: Vec::new(),
        }
    }

    fn both() -> TypeSelection {
        targets(&["IamRole", "StorageBucket"])
    }

    fn setup(overrides: &TypeSelection) -> (Config, Inventory, FilterEngine) {
        let cfg = Config::from_toml_str(CONFIG).unwrap();
        let inv = Inventory::from_json(INVENTORY).unwrap();
        let engine = FilterEngine::for_account(&cfg, "111", overrides).unwrap();
        (cfg, inv, engine)
    }

    #[test]
    fn jobs_are_type_major_and_respect_scope() {
        let (cfg, inv, engine) = setup(&both());
        let scanner = Scanner::new(&inv.registry, &engine, &cfg.regions);
        assert_eq!(
            scanner.jobs(),
            vec![
                ("IamRole".to_string(), "global".to_string()),
                ("StorageBucket".to_string(), "us-east-1".to_string()),
                ("StorageBucket".to_string(), "eu-west-1".to_string()),
            ]
        );
    }

    #[test]
    fn resources_sorted_and_classified() {
        let (cfg, inv, engine) = setup(&both());
        let result = Scanner::new(&inv.registry, &engine, &cfg.regions).collect();
        let ids: Vec<&str> = result
            .resources
            .iter()
            .map(|c| c.resource.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["admin", "keep-me", "zeta", "alpha"]);
        assert_eq!(result.candidate_count(), 3);
        assert_eq!(result.filtered_count(), 1);
        let kept = &result.resources[1];
        assert!(matches!(kept.decision.reason, DecisionReason::Filter { index: 0, .. }));
    }

    #[test]
    fn disabled_types_never_listed() {
        let overrides = TypeSelection {
            excludes: vec!["StorageBucket".to_string()],
            ..both()
        };
        let (cfg, inv, engine) = setup(&overrides);
        let result = Scanner::new(&inv.registry, &engine, &cfg.regions).collect();
        assert_eq!(result.resources.len(), 1);
        assert_eq!(inv.store.list_calls(), 1);
    }

    #[test]
    fn iteration_is_lazy() {
        let (cfg, inv, engine) = setup(&both());
        let scanner = Scanner::new(&inv.registry, &engine, &cfg.regions);
        let first = scanner.iter().next();
        assert!(first.is_some());
        assert_eq!(inv.store.list_calls(), 1);
    }

    struct Broken {
        calls: AtomicUsize,
    }

    impl ResourceLister for Broken {
        fn resource_type(&self) -> &str {
            "Broken"
        }

        fn scope(&self) -> ListerScope {
            ListerScope::Regional
        }

        fn list(&self, region: &str) -> Result<Vec<Resource>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SweepError::Listing {
                resource_type: "Broken".to_string(),
                region: region.to_string(),
                details: "throttled".to_string(),
            })
        }

        fn remove(&self, _resource: &Resource) -> Result<RemoveOutcome> {
            Ok(RemoveOutcome::Gone)
        }
    }

    #[test]
    fn listing_failure_reported_and_scan_continues() {
        let (cfg, mut inv, engine) = setup(&targets(&["Broken", "IamRole", "StorageBucket"]));
        inv.registry
            .register(Arc::new(Broken {
                calls: AtomicUsize::new(0),
            }))
            .unwrap();
        let result = Scanner::new(&inv.registry, &engine, &cfg.regions).collect();
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].error_code, "SWP-2001");
        assert_eq!(result.failures[0].region, "us-east-1");
        assert_eq!(result.resources.len(), 4);
    }

    struct Slow;

    impl ResourceLister for Slow {
        fn resource_type(&self) -> &str {
            "Slow"
        }

        fn list(&self, _region: &str) -> Result<Vec<Resource>> {
            std::thread::sleep(Duration::from_millis(400));
            Ok(Vec::new())
        }

        fn remove(&self, _resource: &Resource) -> Result<RemoveOutcome> {
            Ok(RemoveOutcome::Gone)
        }
    }

    #[test]
    fn slow_listing_times_out() {
        let (_, _, engine) = setup(&targets(&["Slow"]));
        let mut registry = ResourceRegistry::new();
        registry.register(Arc::new(Slow)).unwrap();
        let regions = vec!["us-east-1".to_string()];
        let result = Scanner::new(&registry, &engine, &regions)
            .with_call_timeout(Duration::from_millis(20))
            .collect();
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].error_code, "SWP-2005");
    }
}
