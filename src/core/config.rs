//! Configuration system: TOML filter document + env var overrides + validation.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SweepError};
use crate::filter::matcher::MatchMode;
use crate::filter::rules::FilterGroup;
use crate::resource::registry::ResourceRegistry;

/// Full sweeper configuration model.
///
/// Field order matters for serialization: plain values first, then tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Regions to scan, in order. `global` selects global resource types.
    pub regions: Vec<String>,
    /// Accounts that must never be swept.
    pub account_blocklist: Vec<String>,
    /// Global resource-type targeting.
    #[serde(skip_serializing_if = "TypeSelection::is_empty")]
    pub resource_types: TypeSelection,
    pub protection: ProtectionConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
    pub accounts: BTreeMap<String, AccountConfig>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub presets: BTreeMap<String, PresetConfig>,
    /// Path the configuration was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// Target allow-list and exclude-list of resource-type names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct TypeSelection {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

impl TypeSelection {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.excludes.is_empty()
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &String> {
        self.targets.iter().chain(self.excludes.iter())
    }
}

/// Region-level protection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Every resource in these regions is treated as filtered.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protected_regions: Vec<String>,
}

/// Sweep loop knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Consecutive no-progress sweeps before aborting. 0 disables the stuck detector.
    pub max_wait_retries: u32,
    /// Removal attempts per resource before giving up. 0 means unlimited.
    pub max_attempts: u32,
    /// Pause between sweeps.
    pub sweep_interval_ms: u64,
    /// Upper bound for one list/remove/liveness call.
    pub call_timeout_ms: u64,
    /// Worker threads used to fan out registry calls.
    pub parallelism: usize,
    /// Delay window used instead of the interactive prompt with `--force`.
    pub force_sleep_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_wait_retries: 0,
            max_attempts: 0,
            sweep_interval_ms: 5_000,
            call_timeout_ms: 60_000,
            parallelism: 8,
            force_sleep_secs: 15,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    #[must_use]
    pub fn force_sleep(&self) -> Duration {
        Duration::from_secs(self.force_sleep_secs)
    }
}

/// Activity log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSONL activity log path. Unset disables the activity log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_log: Option<PathBuf>,
}

/// Per-account settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AccountConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub presets: Vec<String>,
    #[serde(skip_serializing_if = "TypeSelection::is_empty")]
    pub resource_types: TypeSelection,
    /// Resource type → ordered filters.
    pub filters: BTreeMap<String, Vec<FilterSpec>>,
}

/// Named reusable filter set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PresetConfig {
    pub filters: BTreeMap<String, Vec<FilterSpec>>,
}

/// One filter as written in the document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterSpec {
    /// Shorthand: exact match on the resource identifier.
    Identifier(String),
    Rule(FilterRule),
}

/// A labelled set of property patterns, all of which must match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FilterRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PatternSpec>,
}

/// A property pattern: a plain string for exact matching, or a detailed table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PatternSpec {
    Exact(String),
    Detailed {
        #[serde(rename = "type", default)]
        mode: MatchMode,
        value: ScalarValue,
        #[serde(default, skip_serializing_if = "is_false")]
        invert: bool,
    },
}

impl PatternSpec {
    #[must_use]
    pub fn mode(&self) -> MatchMode {
        match self {
            Self::Exact(_) => MatchMode::Exact,
            Self::Detailed { mode, .. } => *mode,
        }
    }

    #[must_use]
    pub fn value(&self) -> String {
        match self {
            Self::Exact(v) => v.clone(),
            Self::Detailed { value, .. } => value.to_string(),
        }
    }

    #[must_use]
    pub fn invert(&self) -> bool {
        matches!(self, Self::Detailed { invert: true, .. })
    }
}

/// Scalar pattern value accepted from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl Config {
    /// Load config from an explicit path, then apply env overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = Self::read(path)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate the document exactly as written, ignoring `SWEEPER_*`
    /// overrides. Used when the config is rendered back out.
    pub fn load_as_written(path: &Path) -> Result<Self> {
        let cfg = Self::read(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SweepError::MissingConfig {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path).map_err(|source| SweepError::io(path, source))?;
        let mut cfg = Self::parse(&raw)?;
        cfg.source_path = Some(path.to_path_buf());
        Ok(cfg)
    }

    /// Parse a TOML document without env overrides or validation.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Parse and validate a TOML document (no env overrides).
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg = Self::parse(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Render the configuration back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a over the canonical JSON rendering, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Resolve the settings for `account_id`, refusing blocklisted or unknown accounts.
    pub fn account(&self, account_id: &str) -> Result<&AccountConfig> {
        if self.account_blocklist.iter().any(|id| id == account_id) {
            return Err(SweepError::AccountBlocked {
                account_id: account_id.to_string(),
            });
        }
        self.accounts
            .get(account_id)
            .ok_or_else(|| SweepError::AccountNotConfigured {
                account_id: account_id.to_string(),
            })
    }

    /// Account filters followed by the filters of each included preset, per type.
    pub fn effective_filters(&self, account_id: &str) -> Result<BTreeMap<String, Vec<FilterSpec>>> {
        let account = self.account(account_id)?;
        let mut merged = account.filters.clone();
        for preset_name in &account.presets {
            let preset = self
                .presets
                .get(preset_name)
                .ok_or_else(|| SweepError::InvalidConfig {
                    details: format!(
                        "account {account_id} references unknown preset {preset_name:?}"
                    ),
                })?;
            for (resource_type, filters) in &preset.filters {
                merged
                    .entry(resource_type.clone())
                    .or_default()
                    .extend(filters.iter().cloned());
            }
        }
        Ok(merged)
    }

    /// Check every resource-type name in the document against a registry.
    pub fn validate_against(&self, registry: &ResourceRegistry) -> Result<()> {
        let mut names: BTreeSet<&String> = self.resource_types.names().collect();
        for account in self.accounts.values() {
            names.extend(account.resource_types.names());
            names.extend(account.filters.keys());
        }
        for preset in self.presets.values() {
            names.extend(preset.filters.keys());
        }
        for name in names {
            if !registry.contains(name) {
                return Err(SweepError::UnknownResourceType {
                    resource_type: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        set_env_u32(
            "SWEEPER_MAX_WAIT_RETRIES",
            &mut self.scheduler.max_wait_retries,
        )?;
        set_env_u32("SWEEPER_MAX_ATTEMPTS", &mut self.scheduler.max_attempts)?;
        set_env_u64(
            "SWEEPER_SWEEP_INTERVAL_MS",
            &mut self.scheduler.sweep_interval_ms,
        )?;
        set_env_u64(
            "SWEEPER_CALL_TIMEOUT_MS",
            &mut self.scheduler.call_timeout_ms,
        )?;
        set_env_usize("SWEEPER_PARALLELISM", &mut self.scheduler.parallelism)?;
        set_env_u64(
            "SWEEPER_FORCE_SLEEP_SECS",
            &mut self.scheduler.force_sleep_secs,
        )?;
        if let Some(raw) = env_var("SWEEPER_ACTIVITY_LOG") {
            self.logging.activity_log = Some(PathBuf::from(raw));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(SweepError::InvalidConfig {
                details: "at least one region must be configured".to_string(),
            });
        }
        let mut seen = BTreeSet::new();
        for region in &self.regions {
            if region.trim().is_empty() {
                return Err(SweepError::InvalidConfig {
                    details: "region names must not be empty".to_string(),
                });
            }
            if !seen.insert(region) {
                return Err(SweepError::InvalidConfig {
                    details: format!("region {region:?} listed twice"),
                });
            }
        }

        if self.account_blocklist.is_empty() {
            return Err(SweepError::InvalidConfig {
                details: "account_blocklist must list at least one production account".to_string(),
            });
        }
        for blocked in &self.account_blocklist {
            if self.accounts.contains_key(blocked) {
                return Err(SweepError::InvalidConfig {
                    details: format!("account {blocked} is both blocklisted and configured"),
                });
            }
        }

        if self.scheduler.parallelism == 0 {
            return Err(SweepError::InvalidConfig {
                details: "scheduler.parallelism must be >= 1".to_string(),
            });
        }
        if self.scheduler.call_timeout_ms == 0 {
            return Err(SweepError::InvalidConfig {
                details: "scheduler.call_timeout_ms must be > 0".to_string(),
            });
        }

        check_overlap("resource_types", &self.resource_types)?;
        for (account_id, account) in &self.accounts {
            check_overlap(
                &format!("accounts.{account_id}.resource_types"),
                &account.resource_types,
            )?;
            for preset in &account.presets {
                if !self.presets.contains_key(preset) {
                    return Err(SweepError::InvalidConfig {
                        details: format!(
                            "account {account_id} references unknown preset {preset:?}"
                        ),
                    });
                }
            }
            for (resource_type, filters) in &account.filters {
                FilterGroup::compile(resource_type, filters)?;
            }
        }
        for preset in self.presets.values() {
            for (resource_type, filters) in &preset.filters {
                FilterGroup::compile(resource_type, filters)?;
            }
        }

        Ok(())
    }
}

fn check_overlap(scope: &str, selection: &TypeSelection) -> Result<()> {
    if let Some(both) = selection
        .targets
        .iter()
        .find(|t| selection.excludes.contains(t))
    {
        return Err(SweepError::InvalidConfig {
            details: format!("{scope}: {both} is both targeted and excluded"),
        });
    }
    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u32(name: &str, slot: &mut u32) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u32>().map_err(|error| SweepError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| SweepError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_usize(name: &str, slot: &mut usize) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<usize>()
            .map_err(|error| SweepError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}
