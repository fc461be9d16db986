//! Per-resource lifecycle records.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::SweepError;
use crate::filter::engine::FilterDecision;
use crate::resource::Resource;
use crate::scanner::pipeline::ClassifiedResource;

/// Lifecycle of one resource across a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    New,
    Filtered,
    Pending,
    Removing,
    Waiting,
    Removed,
    Failed,
    Skipped,
}

impl LifecycleState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Filtered => "filtered",
            Self::Pending => "pending",
            Self::Removing => "removing",
            Self::Waiting => "waiting",
            Self::Removed => "removed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filtered | Self::Removed | Self::Failed | Self::Skipped
        )
    }

    /// Edges of the lifecycle graph.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use LifecycleState::{Failed, Filtered, New, Pending, Removed, Removing, Skipped, Waiting};
        matches!(
            (self, next),
            (New, Filtered | Pending)
                | (Pending, Removing | Removed | Failed | Skipped)
                | (Removing, Pending | Waiting | Removed | Failed)
                | (Waiting, Removing | Removed | Failed | Skipped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error captured on a record for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&SweepError> for RecordError {
    fn from(error: &SweepError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// One row of the scheduler's record table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionRecord {
    pub resource: Resource,
    pub decision: FilterDecision,
    pub state: LifecycleState,
    /// Removal calls issued so far.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RecordError>,
    /// Why the record was skipped, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl DeletionRecord {
    /// Record for a classified resource: `Filtered` or `Pending`.
    #[must_use]
    pub fn from_classified(classified: ClassifiedResource) -> Self {
        let mut record = Self {
            resource: classified.resource,
            decision: classified.decision,
            state: LifecycleState::New,
            attempts: 0,
            last_error: None,
            skip_reason: None,
        };
        let next = if record.decision.filtered {
            LifecycleState::Filtered
        } else {
            LifecycleState::Pending
        };
        record.transition(next);
        record
    }

    /// Move to `next` if the lifecycle graph allows it. Returns whether it moved.
    pub fn transition(&mut self, next: LifecycleState) -> bool {
        let allowed = self.state.can_transition_to(next);
        debug_assert!(allowed, "illegal transition {} -> {next}", self.state);
        if allowed {
            self.state = next;
        }
        allowed
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        if self.transition(LifecycleState::Skipped) {
            self.skip_reason = Some(reason.into());
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
