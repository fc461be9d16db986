//! Discovered cloud resources and the capability interface used to list and remove them.

#![allow(missing_docs)]

pub mod inventory;
pub mod registry;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Region name used by listers whose resources are not bound to a region.
pub const GLOBAL_REGION: &str = "global";

/// Pseudo-property resolving to the resource identifier.
pub const PROP_ID: &str = "@id";
/// Pseudo-property resolving to the human-readable label.
pub const PROP_LABEL: &str = "@label";
/// Pseudo-property resolving to the region.
pub const PROP_REGION: &str = "@region";
/// Pseudo-property resolving to the resource type name.
pub const PROP_TYPE: &str = "@type";
/// Prefix addressing one key of a tag-set property.
pub const TAG_PREFIX: &str = "tag:";

/// A matchable property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tags(BTreeMap<String, String>),
}

impl PropertyValue {
    /// Numeric view of the value, when it has one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(s) => s.trim().parse::<f64>().ok(),
            Self::Bool(_) | Self::Tags(_) => None,
        }
    }

    /// Every string rendering a matcher should try. Tag sets expand to `key=value` pairs.
    #[must_use]
    pub fn renderings(&self) -> Vec<Cow<'_, str>> {
        match self {
            Self::Str(s) => vec![Cow::Borrowed(s.as_str())],
            Self::Tags(tags) => tags
                .iter()
                .map(|(k, v)| Cow::Owned(format!("{k}={v}")))
                .collect(),
            other => vec![Cow::Owned(other.to_string())],
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::Tags(tags) => {
                let joined = tags
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(",");
                f.write_str(&joined)
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One discovered cloud object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub resource_type: String,
    pub region: String,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Resource {
    /// Create a resource with no properties and no label.
    pub fn new(
        resource_type: impl Into<String>,
        region: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            region: region.into(),
            identifier: identifier.into(),
            label: None,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style label setter.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Resolve a property by name, including the `@`-prefixed pseudo-properties
    /// and `tag:<key>` lookups into tag-set properties.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Cow<'_, PropertyValue>> {
        if let Some(value) = self.properties.get(name) {
            return Some(Cow::Borrowed(value));
        }
        match name {
            PROP_ID => Some(Cow::Owned(PropertyValue::Str(self.identifier.clone()))),
            PROP_LABEL => self
                .label
                .as_ref()
                .map(|l| Cow::Owned(PropertyValue::Str(l.clone()))),
            PROP_REGION => Some(Cow::Owned(PropertyValue::Str(self.region.clone()))),
            PROP_TYPE => Some(Cow::Owned(PropertyValue::Str(self.resource_type.clone()))),
            _ => {
                let key = name.strip_prefix(TAG_PREFIX)?;
                self.properties.values().find_map(|value| match value {
                    PropertyValue::Tags(tags) => tags
                        .get(key)
                        .map(|v| Cow::Owned(PropertyValue::Str(v.clone()))),
                    _ => None,
                })
            }
        }
    }

    /// Label if present, identifier otherwise.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.identifier)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.region, self.resource_type, self.identifier
        )?;
        if let Some(label) = &self.label
            && label != &self.identifier
        {
            write!(f, " ({label})")?;
        }
        Ok(())
    }
}
