//! Single-property matchers.
//!
//! A matcher is compiled once from its configured pattern; regex and glob
//! patterns are turned into [`Regex`] values, numeric thresholds and age
//! windows are parsed up front. Evaluation never fails: a value that cannot
//! be interpreted for the mode simply does not match (before inversion).

#![allow(missing_docs)]

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::config::PatternSpec;
use crate::core::errors::{Result, SweepError};
use crate::resource::{PropertyValue, Resource};

/// How a pattern is compared with a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Exact,
    Contains,
    Glob,
    Regex,
    Gt,
    Lt,
    Exists,
    DateOlderThan,
}

impl MatchMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Contains => "contains",
            Self::Glob => "glob",
            Self::Regex => "regex",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Exists => "exists",
            Self::DateOlderThan => "date_older_than",
        }
    }
}

#[derive(Debug, Clone)]
enum Compiled {
    Literal,
    Pattern(Regex),
    Threshold(f64),
    Presence(bool),
    MaxAge(TimeDelta),
}

/// A compiled `(field, mode, pattern, invert)` tuple.
#[derive(Debug, Clone)]
pub struct Matcher {
    field: String,
    mode: MatchMode,
    pattern: String,
    invert: bool,
    compiled: Compiled,
}

impl Matcher {
    /// Compile a matcher. Malformed regex, glob, number or duration patterns
    /// are rejected with [`SweepError::InvalidPattern`].
    pub fn new(
        field: impl Into<String>,
        mode: MatchMode,
        pattern: impl Into<String>,
        invert: bool,
    ) -> Result<Self> {
        let pattern = pattern.into();
        let compiled = compile(mode, &pattern)?;
        Ok(Self {
            field: field.into(),
            mode,
            pattern,
            invert,
            compiled,
        })
    }

    pub fn from_spec(field: &str, spec: &PatternSpec) -> Result<Self> {
        Self::new(field, spec.mode(), spec.value(), spec.invert())
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    /// Same matcher with the invert flag flipped.
    #[must_use]
    pub fn negated(&self) -> Self {
        Self {
            invert: !self.invert,
            ..self.clone()
        }
    }

    /// Evaluate against the named property of `resource`.
    #[must_use]
    pub fn matches(&self, resource: &Resource, now: DateTime<Utc>) -> bool {
        let value = resource.lookup(&self.field);
        self.evaluate(value.as_deref(), now)
    }

    /// Evaluate against an already-resolved property value.
    #[must_use]
    pub fn evaluate(&self, value: Option<&PropertyValue>, now: DateTime<Utc>) -> bool {
        self.raw_match(value, now) != self.invert
    }

    fn raw_match(&self, value: Option<&PropertyValue>, now: DateTime<Utc>) -> bool {
        if let Compiled::Presence(expected) = self.compiled {
            return value.is_some() == expected;
        }
        let Some(value) = value else {
            return false;
        };
        match &self.compiled {
            Compiled::Literal if self.mode == MatchMode::Contains => value
                .renderings()
                .iter()
                .any(|r| r.contains(self.pattern.as_str())),
            Compiled::Literal => value
                .renderings()
                .iter()
                .any(|r| r.as_ref() == self.pattern.as_str()),
            Compiled::Pattern(re) => value.renderings().iter().any(|r| re.is_match(r)),
            Compiled::Threshold(threshold) => value.as_f64().is_some_and(|n| match self.mode {
                MatchMode::Gt => n > *threshold,
                _ => n < *threshold,
            }),
            Compiled::MaxAge(age) => parse_timestamp(value).is_some_and(|ts| now - ts > *age),
            Compiled::Presence(_) => false,
        }
    }
}

fn invalid(mode: MatchMode, pattern: &str, details: impl Into<String>) -> SweepError {
    SweepError::InvalidPattern {
        mode: mode.as_str(),
        pattern: pattern.to_string(),
        details: details.into(),
    }
}

fn compile(mode: MatchMode, pattern: &str) -> Result<Compiled> {
    match mode {
        MatchMode::Exact | MatchMode::Contains => Ok(Compiled::Literal),
        MatchMode::Glob => glob_to_regex(pattern).map(Compiled::Pattern),
        MatchMode::Regex => Regex::new(pattern)
            .map(Compiled::Pattern)
            .map_err(|e| invalid(mode, pattern, e.to_string())),
        MatchMode::Gt | MatchMode::Lt => pattern
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Compiled::Threshold)
            .ok_or_else(|| invalid(mode, pattern, "expected a number")),
        MatchMode::Exists => match pattern.trim() {
            "" | "true" => Ok(Compiled::Presence(true)),
            "false" => Ok(Compiled::Presence(false)),
            _ => Err(invalid(mode, pattern, "expected true or false")),
        },
        MatchMode::DateOlderThan => parse_age(pattern)
            .map(Compiled::MaxAge)
            .ok_or_else(|| invalid(mode, pattern, "expected a duration like 30d, 12h or 1h30m")),
    }
}

/// Convert a glob (`*`, `?`) to an anchored regex. All other characters are literal.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex_str = String::with_capacity(pattern.len() * 2 + 2);
    regex_str.push('^');
    let mut buf = [0_u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => regex_str.push_str(".*"),
            '?' => regex_str.push('.'),
            c => regex_str.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    regex_str.push('$');
    Regex::new(&regex_str).map_err(|e| invalid(MatchMode::Glob, pattern, e.to_string()))
}

/// Parse a compound age such as `30d`, `12h`, `1h30m` or `2w`.
fn parse_age(raw: &str) -> Option<TimeDelta> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut total: i64 = 0;
    let mut digits = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let amount: i64 = digits.parse().ok()?;
        digits.clear();
        let unit: i64 = match c {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            'w' => 604_800,
            _ => return None,
        };
        total = total.checked_add(amount.checked_mul(unit)?)?;
    }
    if !digits.is_empty() {
        return None;
    }
    TimeDelta::try_seconds(total)
}

/// Interpret a property as a point in time: unix seconds, RFC 3339, or a
/// plain `YYYY-MM-DD[THH:MM:SS]` date in UTC.
fn parse_timestamp(value: &PropertyValue) -> Option<DateTime<Utc>> {
    let raw = match value {
        PropertyValue::Int(secs) => return DateTime::from_timestamp(*secs, 0),
        PropertyValue::Str(s) => s.trim(),
        _ => return None,
    };
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn bucket(name: &str) -> Resource {
        Resource::new("StorageBucket", "us-east-1", name).with_property("name", name)
    }

    #[test]
    fn exact_and_contains() {
        let exact = Matcher::new("name", MatchMode::Exact, "prod-logs", false).unwrap();
        assert!(exact.matches(&bucket("prod-logs"), now()));
        assert!(!exact.matches(&bucket("prod-logs-2"), now()));

        let contains = Matcher::new("name", MatchMode::Contains, "logs", false).unwrap();
        assert!(contains.matches(&bucket("prod-logs-2"), now()));
        assert!(!contains.matches(&bucket("prod-data"), now()));
    }

    #[test]
    fn glob_is_anchored_and_literal_elsewhere() {
        let m = Matcher::new("name", MatchMode::Glob, "prod-*", false).unwrap();
        assert!(m.matches(&bucket("prod-logs"), now()));
        assert!(!m.matches(&bucket("dev-logs"), now()));
        assert!(!m.matches(&bucket("x-prod-logs"), now()));

        let dotted = Matcher::new("name", MatchMode::Glob, "a.b?", false).unwrap();
        assert!(dotted.matches(&bucket("a.bc"), now()));
        assert!(!dotted.matches(&bucket("axbc"), now()));
    }

    #[test]
    fn regex_is_unanchored() {
        let m = Matcher::new("name", MatchMode::Regex, "^prod-.*$", false).unwrap();
        assert!(m.matches(&bucket("prod-logs"), now()));
        let loose = Matcher::new("name", MatchMode::Regex, "log", false).unwrap();
        assert!(loose.matches(&bucket("prod-logs"), now()));
    }

    #[test]
    fn invalid_regex_rejected() {
        let err = Matcher::new("name", MatchMode::Regex, "(", false).unwrap_err();
        assert_eq!(err.code(), "SWP-1004");
    }

    #[test]
    fn invert_on_missing_property_matches() {
        let m = Matcher::new("owner", MatchMode::Exact, "alice", true).unwrap();
        assert!(m.matches(&bucket("prod-logs"), now()));
        let plain = Matcher::new("owner", MatchMode::Exact, "alice", false).unwrap();
        assert!(!plain.matches(&bucket("prod-logs"), now()));
    }

    #[test]
    fn numeric_comparisons() {
        let r = bucket("b").with_property("size", 100_i64);
        assert!(Matcher::new("size", MatchMode::Gt, "50", false).unwrap().matches(&r, now()));
        assert!(!Matcher::new("size", MatchMode::Gt, "100", false).unwrap().matches(&r, now()));
        assert!(Matcher::new("size", MatchMode::Lt, "100.5", false).unwrap().matches(&r, now()));
        assert!(!Matcher::new("name", MatchMode::Lt, "10", false).unwrap().matches(&r, now()));
        assert!(Matcher::new("size", MatchMode::Gt, "abc", false).is_err());
    }

    #[test]
    fn exists_checks_presence() {
        let r = bucket("b");
        assert!(Matcher::new("name", MatchMode::Exists, "", false).unwrap().matches(&r, now()));
        assert!(Matcher::new("owner", MatchMode::Exists, "false", false).unwrap().matches(&r, now()));
        assert!(!Matcher::new("owner", MatchMode::Exists, "true", false).unwrap().matches(&r, now()));
        assert!(Matcher::new("owner", MatchMode::Exists, "maybe", false).is_err());
    }

    #[test]
    fn date_older_than_accepts_common_formats() {
        let m = Matcher::new("created", MatchMode::DateOlderThan, "30d", false).unwrap();
        let old = bucket("a").with_property("created", "2024-01-01");
        let recent = bucket("b").with_property("created", "2024-05-25T10:00:00Z");
        let unix = bucket("c").with_property("created", 1_700_000_000_i64);
        let garbage = bucket("d").with_property("created", "yesterday");
        assert!(m.matches(&old, now()));
        assert!(!m.matches(&recent, now()));
        assert!(m.matches(&unix, now()));
        assert!(!m.matches(&garbage, now()));
    }

    #[test]
    fn age_parsing() {
        assert_eq!(parse_age("90m"), TimeDelta::try_seconds(5_400));
        assert_eq!(parse_age("1h30m"), TimeDelta::try_seconds(5_400));
        assert_eq!(parse_age("2w"), TimeDelta::try_seconds(1_209_600));
        assert_eq!(parse_age("30"), None);
        assert_eq!(parse_age("3x"), None);
        assert_eq!(parse_age(""), None);
    }

    #[test]
    fn tag_sets_match_on_key_value_pairs() {
        let mut tags = std::collections::BTreeMap::new();
        tags.insert("env".to_string(), "prod".to_string());
        let r = bucket("b").with_property("tags", PropertyValue::Tags(tags));
        assert!(Matcher::new("tags", MatchMode::Exact, "env=prod", false).unwrap().matches(&r, now()));
        assert!(Matcher::new("tag:env", MatchMode::Exact, "prod", false).unwrap().matches(&r, now()));
    }

    #[test]
    fn pseudo_property_matching() {
        let m = Matcher::new("@region", MatchMode::Exact, "us-east-1", false).unwrap();
        assert!(m.matches(&bucket("x"), now()));
    }

    proptest! {
        #[test]
        fn negation_flips_every_mode(
            value in "[a-z0-9.-]{0,12}",
            pattern in "[a-z0-9*?-]{0,6}",
            present in any::<bool>(),
        ) {
            let prop = PropertyValue::Str(value);
            let v = present.then_some(&prop);
            for mode in [MatchMode::Exact, MatchMode::Contains, MatchMode::Glob, MatchMode::Regex] {
                let Ok(m) = Matcher::new("f", mode, pattern.clone(), false) else { continue };
                prop_assert_eq!(m.evaluate(v, now()), !m.negated().evaluate(v, now()));
            }
        }

        #[test]
        fn numeric_negation(value in -1_000_i64..1_000, threshold in -1_000_i64..1_000) {
            let prop = PropertyValue::Int(value);
            for mode in [MatchMode::Gt, MatchMode::Lt] {
                let m = Matcher::new("n", mode, threshold.to_string(), false).unwrap();
                prop_assert_eq!(m.evaluate(Some(&prop), now()), !m.negated().evaluate(Some(&prop), now()));
            }
        }
    }
}
