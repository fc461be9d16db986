//! SWP-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SweepError>;

/// Top-level error type for the account sweeper.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("[SWP-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SWP-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SWP-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SWP-1004] invalid {mode} pattern {pattern:?}: {details}")]
    InvalidPattern {
        mode: &'static str,
        pattern: String,
        details: String,
    },

    #[error("[SWP-1101] account {account_id} is on the account blocklist")]
    AccountBlocked { account_id: String },

    #[error("[SWP-1102] account {account_id} is not configured")]
    AccountNotConfigured { account_id: String },

    #[error("[SWP-1103] unknown resource type {resource_type:?}")]
    UnknownResourceType { resource_type: String },

    #[error("[SWP-2001] listing {resource_type} in {region} failed: {details}")]
    Listing {
        resource_type: String,
        region: String,
        details: String,
    },

    #[error("[SWP-2002] removing {resource_type} {identifier} failed: {details}")]
    Removal {
        resource_type: String,
        identifier: String,
        details: String,
        retryable: bool,
    },

    #[error("[SWP-2003] {resource_type} {identifier} still has dependents: {dependents:?}")]
    DependencyViolation {
        resource_type: String,
        identifier: String,
        dependents: Vec<String>,
    },

    #[error("[SWP-2004] liveness check for {resource_type} {identifier} failed: {details}")]
    LivenessCheck {
        resource_type: String,
        identifier: String,
        details: String,
    },

    #[error("[SWP-2005] {operation} timed out after {after:?}")]
    Timeout {
        operation: String,
        after: Duration,
    },

    #[error("[SWP-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SWP-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SWP-3002] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[SWP-3003] operation cancelled: {details}")]
    Cancelled { details: String },

    #[error("[SWP-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SweepError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SWP-1001",
            Self::MissingConfig { .. } => "SWP-1002",
            Self::ConfigParse { .. } => "SWP-1003",
            Self::InvalidPattern { .. } => "SWP-1004",
            Self::AccountBlocked { .. } => "SWP-1101",
            Self::AccountNotConfigured { .. } => "SWP-1102",
            Self::UnknownResourceType { .. } => "SWP-1103",
            Self::Listing { .. } => "SWP-2001",
            Self::Removal { .. } => "SWP-2002",
            Self::DependencyViolation { .. } => "SWP-2003",
            Self::LivenessCheck { .. } => "SWP-2004",
            Self::Timeout { .. } => "SWP-2005",
            Self::Serialization { .. } => "SWP-2101",
            Self::Io { .. } => "SWP-3001",
            Self::ChannelClosed { .. } => "SWP-3002",
            Self::Cancelled { .. } => "SWP-3003",
            Self::Runtime { .. } => "SWP-3900",
        }
    }

    /// Whether retrying on a later sweep might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Removal { retryable, .. } => *retryable,
            Self::Listing { .. }
            | Self::DependencyViolation { .. }
            | Self::LivenessCheck { .. }
            | Self::Timeout { .. }
            | Self::Io { .. }
            | Self::ChannelClosed { .. }
            | Self::Runtime { .. } => true,
            _ => false,
        }
    }

    /// Whether the error must stop the run before any scan begins.
    #[must_use]
    pub const fn is_fatal_before_scan(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::InvalidPattern { .. }
                | Self::AccountBlocked { .. }
                | Self::AccountNotConfigured { .. }
                | Self::UnknownResourceType { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SweepError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for SweepError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
