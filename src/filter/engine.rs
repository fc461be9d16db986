//! Resource classification: targeting, region protection, then filter groups.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::{Config, TypeSelection};
use crate::core::errors::Result;
use crate::filter::rules::FilterGroup;
use crate::resource::Resource;

/// Why a resource was protected, or that it is a removal candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    Candidate,
    NotTargeted,
    Excluded,
    RegionProtected {
        region: String,
    },
    Filter {
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        fields: Vec<String>,
    },
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Candidate => f.write_str("would remove"),
            Self::NotTargeted => f.write_str("resource type not targeted"),
            Self::Excluded => f.write_str("resource type excluded"),
            Self::RegionProtected { region } => write!(f, "region {region} is protected"),
            Self::Filter {
                index,
                label,
                fields,
            } => {
                write!(f, "filter #{index}")?;
                if let Some(label) = label {
                    write!(f, " {label:?}")?;
                }
                write!(f, " on {}", fields.join(", "))
            }
        }
    }
}

/// Classification of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDecision {
    pub filtered: bool,
    pub reason: DecisionReason,
}

impl FilterDecision {
    #[must_use]
    pub fn candidate() -> Self {
        Self {
            filtered: false,
            reason: DecisionReason::Candidate,
        }
    }

    #[must_use]
    pub fn protected(reason: DecisionReason) -> Self {
        Self {
            filtered: true,
            reason,
        }
    }
}

/// Layered resource-type targeting.
///
/// Excludes from every layer are unioned. Each layer with a non-empty target
/// list narrows the enabled set, so a type must appear in all of them.
#[derive(Debug, Clone, Default)]
pub struct Targeting {
    target_layers: Vec<BTreeSet<String>>,
    excludes: BTreeSet<String>,
}

impl Targeting {
    pub fn from_layers<'a>(layers: impl IntoIterator<Item = &'a TypeSelection>) -> Self {
        let mut targeting = Self::default();
        for layer in layers {
            if !layer.targets.is_empty() {
                targeting
                    .target_layers
                    .push(layer.targets.iter().cloned().collect());
            }
            targeting.excludes.extend(layer.excludes.iter().cloned());
        }
        targeting
    }

    /// `None` when the type is enabled, otherwise the reason it is not.
    #[must_use]
    pub fn check(&self, resource_type: &str) -> Option<DecisionReason> {
        if self.excludes.contains(resource_type) {
            return Some(DecisionReason::Excluded);
        }
        if self
            .target_layers
            .iter()
            .any(|layer| !layer.contains(resource_type))
        {
            return Some(DecisionReason::NotTargeted);
        }
        None
    }

    #[must_use]
    pub fn is_enabled(&self, resource_type: &str) -> bool {
        self.check(resource_type).is_none()
    }
}

/// Per-account classifier built from the effective configuration.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    targeting: Targeting,
    protected_regions: BTreeSet<String>,
    groups: BTreeMap<String, FilterGroup>,
    now: DateTime<Utc>,
}

impl FilterEngine {
    #[must_use]
    pub fn new(
        targeting: Targeting,
        protected_regions: BTreeSet<String>,
        groups: BTreeMap<String, FilterGroup>,
    ) -> Self {
        Self {
            targeting,
            protected_regions,
            groups,
            now: Utc::now(),
        }
    }

    /// Build the engine for one account: global, account and `overrides`
    /// targeting layers, protected regions, and account + preset filters.
    pub fn for_account(config: &Config, account_id: &str, overrides: &TypeSelection) -> Result<Self> {
        let account = config.account(account_id)?;
        let targeting = Targeting::from_layers([
            &config.resource_types,
            &account.resource_types,
            overrides,
        ]);
        let groups = config
            .effective_filters(account_id)?
            .iter()
            .map(|(resource_type, specs)| {
                FilterGroup::compile(resource_type, specs).map(|g| (resource_type.clone(), g))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        let protected = config.protection.protected_regions.iter().cloned().collect();
        Ok(Self::new(targeting, protected, groups))
    }

    /// Pin the reference time used by age-based matchers.
    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    #[must_use]
    pub fn targeting(&self) -> &Targeting {
        &self.targeting
    }

    #[must_use]
    pub fn is_enabled(&self, resource_type: &str) -> bool {
        self.targeting.is_enabled(resource_type)
    }

    #[must_use]
    pub fn group(&self, resource_type: &str) -> Option<&FilterGroup> {
        self.groups.get(resource_type)
    }

    #[must_use]
    pub fn classify(&self, resource: &Resource) -> FilterDecision {
        if let Some(reason) = self.targeting.check(&resource.resource_type) {
            return FilterDecision::protected(reason);
        }
        if self.protected_regions.contains(&resource.region) {
            return FilterDecision::protected(DecisionReason::RegionProtected {
                region: resource.region.clone(),
            });
        }
        let hit = self
            .groups
            .get(&resource.resource_type)
            .and_then(|group| group.first_match(resource, self.now));
        match hit {
            Some((index, filter)) => FilterDecision::protected(DecisionReason::Filter {
                index,
                label: filter.label().map(str::to_string),
                fields: filter.fields(),
            }),
            None => FilterDecision::candidate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
regions = ["global", "us-east-1", "eu-west-1"]
account_blocklist = ["999"]

[resource_types]
excludes = ["IamUser"]

[protection]
protected_regions = ["eu-west-1"]

[accounts."111"]
resource_types = { targets = ["StorageBucket", "IamUser", "Instance"] }

[accounts."111".filters]
StorageBucket = [
    { label = "production", properties = { name = { type = "glob", value = "prod-*" } } },
]
"#;

    fn engine(overrides: &TypeSelection) -> FilterEngine {
        let cfg = Config::from_toml_str(CONFIG).unwrap();
        FilterEngine::for_account(&cfg, "111", overrides).unwrap()
    }

    fn bucket(region: &str, name: &str) -> Resource {
        Resource::new("StorageBucket", region, name).with_property("name", name)
    }

    #[test]
    fn glob_filter_protects_matching_bucket() {
        let e = engine(&TypeSelection::default());
        let prod = e.classify(&bucket("us-east-1", "prod-logs"));
        assert!(prod.filtered);
        assert_eq!(
            prod.reason,
            DecisionReason::Filter {
                index: 0,
                label: Some("production".to_string()),
                fields: vec!["name".to_string()],
            }
        );
        let dev = e.classify(&bucket("us-east-1", "dev-tmp"));
        assert_eq!(dev, FilterDecision::candidate());
    }

    #[test]
    fn protected_region_wins_over_candidate() {
        let e = engine(&TypeSelection::default());
        let d = e.classify(&bucket("eu-west-1", "dev-tmp"));
        assert_eq!(
            d.reason,
            DecisionReason::RegionProtected {
                region: "eu-west-1".to_string()
            }
        );
    }

    #[test]
    fn exclude_beats_target() {
        let e = engine(&TypeSelection::default());
        assert!(!e.is_enabled("IamUser"));
        assert!(e.is_enabled("Instance"));
        assert!(!e.is_enabled("Vpc"));
        let d = e.classify(&Resource::new("IamUser", "global", "alice"));
        assert_eq!(d.reason, DecisionReason::Excluded);
    }

    #[test]
    fn cli_layer_narrows_further() {
        let overrides = TypeSelection {
            targets: vec!["Instance".to_string()],
            excludes: Vec::new(),
        };
        let e = engine(&overrides);
        assert!(e.is_enabled("Instance"));
        assert!(!e.is_enabled("StorageBucket"));
        assert_eq!(
            e.classify(&bucket("us-east-1", "dev")).reason,
            DecisionReason::NotTargeted
        );
    }

    #[test]
    fn same_type_in_targets_and_excludes_is_disabled() {
        let t = Targeting::from_layers([&TypeSelection {
            targets: vec!["A".to_string()],
            excludes: vec!["A".to_string()],
        }]);
        assert_eq!(t.check("A"), Some(DecisionReason::Excluded));
    }

    #[test]
    fn reason_display() {
        let reason = DecisionReason::Filter {
            index: 2,
            label: Some("keep".to_string()),
            fields: vec!["@id".to_string()],
        };
        assert_eq!(reason.to_string(), "filter #2 \"keep\" on @id");
        assert_eq!(DecisionReason::Candidate.to_string(), "would remove");
    }
}
