//! Filters (AND of matchers) and per-type filter groups (OR of filters).

#![allow(missing_docs)]

use chrono::{DateTime, Utc};

use crate::core::config::{FilterSpec, PatternSpec};
use crate::core::errors::{Result, SweepError};
use crate::filter::matcher::Matcher;
use crate::resource::{PROP_ID, Resource};

/// A labelled conjunction of matchers.
#[derive(Debug, Clone)]
pub struct Filter {
    label: Option<String>,
    matchers: Vec<Matcher>,
}

impl Filter {
    /// A filter must constrain at least one property.
    pub fn new(label: Option<String>, matchers: Vec<Matcher>) -> Result<Self> {
        if matchers.is_empty() {
            return Err(SweepError::InvalidConfig {
                details: format!(
                    "filter {} has no properties",
                    label.as_deref().unwrap_or("<unlabelled>")
                ),
            });
        }
        Ok(Self { label, matchers })
    }

    pub fn compile(spec: &FilterSpec) -> Result<Self> {
        match spec {
            FilterSpec::Identifier(id) => {
                let matcher = Matcher::from_spec(PROP_ID, &PatternSpec::Exact(id.clone()))?;
                Self::new(None, vec![matcher])
            }
            FilterSpec::Rule(rule) => {
                let matchers = rule
                    .properties
                    .iter()
                    .map(|(field, pattern)| Matcher::from_spec(field, pattern))
                    .collect::<Result<Vec<_>>>()?;
                Self::new(rule.label.clone(), matchers)
            }
        }
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[must_use]
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Property names this filter constrains, in evaluation order.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        self.matchers.iter().map(|m| m.field().to_string()).collect()
    }

    #[must_use]
    pub fn matches(&self, resource: &Resource, now: DateTime<Utc>) -> bool {
        self.matchers.iter().all(|m| m.matches(resource, now))
    }
}

/// Ordered filters for one resource type.
#[derive(Debug, Clone)]
pub struct FilterGroup {
    resource_type: String,
    filters: Vec<Filter>,
}

impl FilterGroup {
    pub fn compile(resource_type: &str, specs: &[FilterSpec]) -> Result<Self> {
        let filters = specs
            .iter()
            .map(Filter::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            resource_type: resource_type.to_string(),
            filters,
        })
    }

    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// First filter (in declaration order) that matches, with its index.
    #[must_use]
    pub fn first_match(&self, resource: &Resource, now: DateTime<Utc>) -> Option<(usize, &Filter)> {
        self.filters
            .iter()
            .enumerate()
            .find(|(_, filter)| filter.matches(resource, now))
    }
}
