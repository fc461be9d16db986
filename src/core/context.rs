//! Explicit per-run account context threaded through pipeline and scheduler.

use serde::{Deserialize, Serialize};

/// Identity of the account a run operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    /// Provider account identifier.
    pub id: String,
    /// Human-readable account alias, when the provider has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl AccountContext {
    /// Create a context without an alias.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: None,
        }
    }

    /// Builder-style alias setter.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The string an operator must type to confirm a live run.
    #[must_use]
    pub fn confirmation_phrase(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_phrase_prefers_alias() {
        let ctx = AccountContext::new("123456789012").with_alias("sandbox");
        assert_eq!(ctx.confirmation_phrase(), "sandbox");
        assert_eq!(AccountContext::new("1").confirmation_phrase(), "1");
    }
}
