//! Run report and exit-status mapping.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::core::context::AccountContext;
use crate::scanner::pipeline::ScanFailure;
use crate::scheduler::record::{DeletionRecord, LifecycleState};
use crate::scheduler::sweep::SweepOutcome;

/// Every candidate removed, dry run, or nothing to do.
pub const EXIT_OK: i32 = 0;
/// Configuration or bootstrap error.
pub const EXIT_CONFIG: i32 = 1;
/// Declined at the gate or cancelled.
pub const EXIT_ABORTED: i32 = 2;
/// Stuck detector tripped.
pub const EXIT_STUCK: i32 = 3;
/// Converged with failed or skipped records.
pub const EXIT_INCOMPLETE: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    DryRun,
    Converged,
    Stuck,
    Cancelled,
    Aborted,
}

impl RunOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DryRun => "dry_run",
            Self::Converged => "converged",
            Self::Stuck => "stuck",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        }
    }
}

impl From<SweepOutcome> for RunOutcome {
    fn from(outcome: SweepOutcome) -> Self {
        match outcome {
            SweepOutcome::Converged => Self::Converged,
            SweepOutcome::Stuck => Self::Stuck,
            SweepOutcome::Cancelled => Self::Cancelled,
        }
    }
}

/// Final state of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub resource_type: String,
    pub region: String,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub state: LifecycleState,
    pub attempts: u32,
    /// Filter reason, last error, or skip reason.
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<&DeletionRecord> for ResourceOutcome {
    fn from(record: &DeletionRecord) -> Self {
        let reason = match record.state {
            LifecycleState::Filtered => record.decision.reason.to_string(),
            LifecycleState::Skipped => record
                .skip_reason
                .clone()
                .unwrap_or_else(|| "skipped".to_string()),
            LifecycleState::Failed => record
                .last_error
                .as_ref()
                .map_or_else(|| "failed".to_string(), |e| e.message.clone()),
            LifecycleState::Removed => "removed".to_string(),
            _ => record.decision.reason.to_string(),
        };
        Self {
            resource_type: record.resource.resource_type.clone(),
            region: record.resource.region.clone(),
            identifier: record.resource.identifier.clone(),
            label: record.resource.label.clone(),
            state: record.state,
            attempts: record.attempts,
            reason,
            error_code: record.last_error.as_ref().map(|e| e.code.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub total: usize,
    pub filtered: usize,
    pub candidates: usize,
    pub removed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Candidates never driven to a terminal state (dry run).
    pub pending: usize,
}

impl ReportCounts {
    fn tally(records: &[DeletionRecord]) -> Self {
        let mut counts = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.state {
                LifecycleState::Filtered => counts.filtered += 1,
                LifecycleState::Removed => counts.removed += 1,
                LifecycleState::Failed => counts.failed += 1,
                LifecycleState::Skipped => counts.skipped += 1,
                LifecycleState::New
                | LifecycleState::Pending
                | LifecycleState::Removing
                | LifecycleState::Waiting => counts.pending += 1,
            }
        }
        counts.candidates = counts.total - counts.filtered;
        counts
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub account: AccountContext,
    pub outcome: RunOutcome,
    pub sweeps: u32,
    pub counts: ReportCounts,
    pub resources: Vec<ResourceOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scan_failures: Vec<ScanFailure>,
}

impl RunReport {
    #[must_use]
    pub fn new(
        account: AccountContext,
        outcome: RunOutcome,
        sweeps: u32,
        records: &[DeletionRecord],
        scan_failures: Vec<ScanFailure>,
    ) -> Self {
        Self {
            account,
            outcome,
            sweeps,
            counts: ReportCounts::tally(records),
            resources: records.iter().map(ResourceOutcome::from).collect(),
            scan_failures,
        }
    }

    /// Process exit status for this report.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::DryRun => EXIT_OK,
            RunOutcome::Aborted | RunOutcome::Cancelled => EXIT_ABORTED,
            RunOutcome::Stuck => EXIT_STUCK,
            RunOutcome::Converged if self.counts.failed + self.counts.skipped > 0 => {
                EXIT_INCOMPLETE
            }
            RunOutcome::Converged => EXIT_OK,
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code() == EXIT_OK
    }

    /// One-line tally in the classic format.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let c = &self.counts;
        if self.outcome == RunOutcome::DryRun {
            format!(
                "Scan complete: {} total, {} removable, {} filtered.",
                c.total, c.pending, c.filtered
            )
        } else {
            format!(
                "Removal requested: {} waiting, {} failed, {} skipped, {} finished",
                c.pending, c.failed, c.skipped, c.removed
            )
        }
    }
}
