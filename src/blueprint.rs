//! Blueprint generator: turn a scan into a configuration that protects
//! every resource currently present in the account.
//!
//! The output is the effective configuration plus one exact `@id` filter per
//! removal candidate, so loading it back and scanning the same account
//! yields zero candidates.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::core::config::{Config, FilterRule, FilterSpec, PatternSpec};
use crate::core::errors::{Result, SweepError};
use crate::resource::PROP_ID;
use crate::scanner::pipeline::ScanResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlueprintOptions {
    /// Append already-protected resources as comments with their reason.
    pub include_filtered: bool,
    /// Label each generated filter with the resource's display name.
    pub include_name: bool,
}

/// Render the blueprint TOML for `account_id` from a finished scan.
pub fn render_blueprint(
    config: &Config,
    account_id: &str,
    scan: &ScanResult,
    options: BlueprintOptions,
) -> Result<String> {
    let mut blueprint = config.clone();
    let account = blueprint
        .accounts
        .get_mut(account_id)
        .ok_or_else(|| SweepError::AccountNotConfigured {
            account_id: account_id.to_string(),
        })?;

    let mut seen = BTreeSet::new();
    let mut generated = 0_usize;
    for classified in scan.candidates() {
        let resource = &classified.resource;
        if !seen.insert((resource.resource_type.as_str(), resource.identifier.as_str())) {
            continue;
        }
        let filter = if options.include_name {
            FilterSpec::Rule(FilterRule {
                label: Some(resource.display_name().to_string()),
                properties: BTreeMap::from([(
                    PROP_ID.to_string(),
                    PatternSpec::Exact(resource.identifier.clone()),
                )]),
            })
        } else {
            FilterSpec::Identifier(resource.identifier.clone())
        };
        account
            .filters
            .entry(resource.resource_type.clone())
            .or_default()
            .push(filter);
        generated += 1;
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Blueprint for account {}: {generated} generated filter(s).",
        comment_safe(account_id)
    );
    out.push_str(&blueprint.to_toml_string()?);

    if options.include_filtered {
        let protected: Vec<_> = scan.protected().collect();
        if !protected.is_empty() {
            out.push_str("\n# Already protected:\n");
            for classified in protected {
                let r = &classified.resource;
                let _ = writeln!(
                    out,
                    "# {} {} {}: {}",
                    comment_safe(&r.resource_type),
                    comment_safe(&r.region),
                    comment_safe(&r.identifier),
                    comment_safe(&classified.decision.reason.to_string())
                );
            }
        }
    }

    Ok(out)
}

/// Escape control characters so provider-supplied text stays on one comment line.
fn comment_safe(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    out
}
