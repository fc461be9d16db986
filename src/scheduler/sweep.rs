//! Iterative deletion loop.
//!
//! Each sweep has two phases, both fanned out over the worker pool and both
//! ending in a barrier:
//!
//! 1. **Removal**: every `Pending` or `Waiting` record gets a removal call.
//! 2. **Liveness**: every record still non-terminal is re-checked; a record
//!    reported absent becomes `Removed`. Errors count as "still present".
//!
//! After both phases the retry budget is enforced and progress is measured.
//! Consecutive sweeps without a single terminal transition feed the stuck
//! detector.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::SchedulerConfig;
use crate::core::errors::{Result, SweepError};
use crate::core::timeout::call_with_timeout;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, ResourceRef};
use crate::resource::Resource;
use crate::resource::registry::{RemoveOutcome, ResourceLister, ResourceRegistry};
use crate::scheduler::cancel::CancelToken;
use crate::scheduler::clock::{Clock, sleep_unless_cancelled};
use crate::scheduler::pool::fan_out;
use crate::scheduler::record::{DeletionRecord, LifecycleState, RecordError};

/// Runtime knobs for the sweep loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSettings {
    pub max_wait_retries: u32,
    pub max_attempts: u32,
    pub sweep_interval: Duration,
    pub call_timeout: Duration,
    pub parallelism: usize,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SweepSettings {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            max_wait_retries: cfg.max_wait_retries,
            max_attempts: cfg.max_attempts,
            sweep_interval: cfg.sweep_interval(),
            call_timeout: cfg.call_timeout(),
            parallelism: cfg.parallelism,
        }
    }
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Converged,
    Stuck,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub records: Vec<DeletionRecord>,
    pub outcome: SweepOutcome,
    pub sweeps: u32,
}

enum RemovalResult {
    Issued(Result<RemoveOutcome>),
    NotIssued,
}

struct RemovalJob {
    index: usize,
    attempt: u32,
    previous: LifecycleState,
    lister: Arc<dyn ResourceLister>,
    resource: Resource,
}

struct LivenessJob {
    index: usize,
    lister: Arc<dyn ResourceLister>,
    resource: Resource,
}

/// Drives candidate records to a terminal state.
pub struct DeletionScheduler<'a> {
    registry: &'a ResourceRegistry,
    settings: SweepSettings,
    clock: &'a dyn Clock,
    cancel: &'a CancelToken,
    logger: Option<&'a ActivityLoggerHandle>,
}

impl<'a> DeletionScheduler<'a> {
    #[must_use]
    pub fn new(
        registry: &'a ResourceRegistry,
        settings: SweepSettings,
        clock: &'a dyn Clock,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            registry,
            settings,
            clock,
            cancel,
            logger: None,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Option<&'a ActivityLoggerHandle>) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    /// Run sweeps until every record is terminal, the stuck detector trips,
    /// or the cancel token fires.
    #[must_use]
    pub fn run(&self, mut records: Vec<DeletionRecord>) -> SweepSummary {
        let mut sweeps: u32 = 0;
        let mut idle_sweeps: u32 = 0;

        let outcome = loop {
            if records.iter().all(DeletionRecord::is_terminal) {
                break SweepOutcome::Converged;
            }
            if self.cancel.is_cancelled() {
                self.skip_remaining(&mut records, sweeps, "cancelled before removal was issued");
                break SweepOutcome::Cancelled;
            }
            if sweeps > 0
                && !sleep_unless_cancelled(self.clock, self.settings.sweep_interval, self.cancel)
            {
                continue;
            }

            sweeps += 1;
            let started = self.clock.elapsed();
            let progressed = self.sweep_once(&mut records, sweeps);
            let remaining = records.iter().filter(|r| !r.is_terminal()).count();
            self.log(ActivityEvent::SweepCompleted {
                sweep: sweeps,
                progressed,
                remaining,
                duration_ms: duration_ms(self.clock.elapsed().saturating_sub(started)),
            });

            if remaining == 0 {
                continue;
            }
            if progressed == 0 {
                idle_sweeps += 1;
            } else {
                idle_sweeps = 0;
            }
            if self.settings.max_wait_retries > 0 && idle_sweeps >= self.settings.max_wait_retries {
                let reason = format!("no progress in {idle_sweeps} consecutive sweeps");
                self.skip_remaining(&mut records, sweeps, &reason);
                break SweepOutcome::Stuck;
            }
        };

        SweepSummary {
            records,
            outcome,
            sweeps,
        }
    }

    /// One full sweep. Returns the number of records that became terminal.
    fn sweep_once(&self, records: &mut [DeletionRecord], sweep: u32) -> usize {
        let before = records.iter().filter(|r| r.is_terminal()).count();
        self.removal_phase(records, sweep);
        self.liveness_phase(records, sweep);
        self.enforce_budget(records, sweep);
        records.iter().filter(|r| r.is_terminal()).count() - before
    }

    // ──────────────────── removal ────────────────────

    fn removal_phase(&self, records: &mut [DeletionRecord], sweep: u32) {
        let mut jobs = Vec::new();
        for (index, record) in records.iter_mut().enumerate() {
            if !matches!(record.state, LifecycleState::Pending | LifecycleState::Waiting) {
                continue;
            }
            let Some(lister) = self.registry.get(&record.resource.resource_type) else {
                let error = SweepError::UnknownResourceType {
                    resource_type: record.resource.resource_type.clone(),
                };
                record.last_error = Some(RecordError::from(&error));
                self.move_to(record, LifecycleState::Failed, sweep);
                continue;
            };
            let previous = record.state;
            record.attempts += 1;
            self.move_to(record, LifecycleState::Removing, sweep);
            jobs.push(RemovalJob {
                index,
                attempt: record.attempts,
                previous,
                lister: Arc::clone(lister),
                resource: record.resource.clone(),
            });
        }

        let mut results = fan_out(self.settings.parallelism, jobs, |job| {
            if self.cancel.is_cancelled() {
                return (job.index, job.previous, RemovalResult::NotIssued);
            }
            self.log(ActivityEvent::RemovalRequested {
                resource: ResourceRef::from(&job.resource),
                sweep,
                attempt: job.attempt,
            });
            let operation = format!("remove {} {}", job.resource.resource_type, job.resource.identifier);
            let lister = job.lister;
            let resource = job.resource;
            let outcome = call_with_timeout(&operation, self.settings.call_timeout, move || {
                lister.remove(&resource)
            });
            (job.index, job.previous, RemovalResult::Issued(outcome))
        });
        results.sort_by_key(|(index, _, _)| *index);

        for (index, previous, result) in results {
            let record = &mut records[index];
            match result {
                RemovalResult::NotIssued => {
                    record.attempts -= 1;
                    self.move_to(record, previous, sweep);
                }
                RemovalResult::Issued(Ok(RemoveOutcome::Gone)) => {
                    record.last_error = None;
                    self.move_to(record, LifecycleState::Removed, sweep);
                }
                RemovalResult::Issued(Ok(RemoveOutcome::Accepted)) => {
                    record.last_error = None;
                    self.move_to(record, LifecycleState::Waiting, sweep);
                }
                RemovalResult::Issued(Err(error)) => {
                    let retryable = error.is_retryable();
                    self.log(ActivityEvent::RemovalFailed {
                        resource: ResourceRef::from(&record.resource),
                        sweep,
                        attempt: record.attempts,
                        error_code: error.code().to_string(),
                        error_message: error.to_string(),
                        retryable,
                    });
                    record.last_error = Some(RecordError::from(&error));
                    let next = if retryable {
                        LifecycleState::Pending
                    } else {
                        LifecycleState::Failed
                    };
                    self.move_to(record, next, sweep);
                }
            }
        }
    }

    // ──────────────────── liveness ────────────────────

    fn liveness_phase(&self, records: &mut [DeletionRecord], sweep: u32) {
        let jobs: Vec<LivenessJob> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_terminal())
            .filter_map(|(index, r)| {
                self.registry
                    .get(&r.resource.resource_type)
                    .map(|lister| LivenessJob {
                        index,
                        lister: Arc::clone(lister),
                        resource: r.resource.clone(),
                    })
            })
            .collect();

        let results = fan_out(self.settings.parallelism, jobs, |job| {
            let operation = format!(
                "check {} {}",
                job.resource.resource_type, job.resource.identifier
            );
            let lister = job.lister;
            let resource = job.resource;
            let present = call_with_timeout(&operation, self.settings.call_timeout, move || {
                lister.still_present(&resource)
            });
            (job.index, present)
        });

        let mut gone: Vec<usize> = results
            .into_iter()
            .filter_map(|(index, present)| matches!(present, Ok(false)).then_some(index))
            .collect();
        gone.sort_unstable();
        for index in gone {
            self.move_to(&mut records[index], LifecycleState::Removed, sweep);
        }
    }

    // ──────────────────── budget ────────────────────

    fn enforce_budget(&self, records: &mut [DeletionRecord], sweep: u32) {
        let budget = self.settings.max_attempts;
        if budget == 0 {
            return;
        }
        for record in records.iter_mut() {
            if record.is_terminal() || record.attempts < budget {
                continue;
            }
            if record.state == LifecycleState::Pending && record.last_error.is_some() {
                self.move_to(record, LifecycleState::Failed, sweep);
            } else {
                record.skip_reason = Some(format!("still present after {budget} attempts"));
                self.move_to(record, LifecycleState::Skipped, sweep);
            }
        }
    }

    // ──────────────────── helpers ────────────────────

    fn skip_remaining(&self, records: &mut [DeletionRecord], sweep: u32, reason: &str) {
        for record in records.iter_mut().filter(|r| !r.is_terminal()) {
            record.skip_reason = Some(reason.to_string());
            self.move_to(record, LifecycleState::Skipped, sweep);
        }
    }

    fn move_to(&self, record: &mut DeletionRecord, next: LifecycleState, sweep: u32) {
        let from = record.state;
        if from == next || !record.transition(next) {
            return;
        }
        self.log(ActivityEvent::StateChanged {
            resource: ResourceRef::from(&record.resource),
            sweep,
            from: from.as_str(),
            to: next.as_str(),
        });
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = self.logger {
            logger.send(event);
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
