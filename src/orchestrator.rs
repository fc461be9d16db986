//! Run orchestration: bootstrap checks, scan, confirmation gate, deletion
//! scheduler, report.
//!
//! A [`Sweeper`] is built once per run. Construction refuses blocklisted or
//! unconfigured accounts and configs naming unknown resource types, so no
//! lister is ever called for a run that would be rejected.

#![allow(missing_docs)]

use std::time::Duration;

use crate::blueprint::{BlueprintOptions, render_blueprint};
use crate::core::config::{Config, TypeSelection};
use crate::core::context::AccountContext;
use crate::core::errors::{Result, SweepError};
use crate::filter::engine::FilterEngine;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::report::{RunOutcome, RunReport};
use crate::resource::registry::ResourceRegistry;
use crate::scanner::pipeline::{ScanResult, Scanner};
use crate::scheduler::cancel::CancelToken;
use crate::scheduler::clock::Clock;
use crate::scheduler::gate::{ConfirmationGate, GateOutcome, Prompter};
use crate::scheduler::record::DeletionRecord;
use crate::scheduler::sweep::{DeletionScheduler, SweepSettings};

/// Per-invocation switches layered over the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Scan and report only. On unless explicitly disabled.
    pub dry_run: bool,
    /// Replace the typed confirmation with a cancellable delay.
    pub force: bool,
    /// Delay window for `force`; falls back to the config value.
    pub force_sleep: Option<Duration>,
    pub max_wait_retries: Option<u32>,
    /// Innermost targeting layer.
    pub overrides: TypeSelection,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            force: false,
            force_sleep: None,
            max_wait_retries: None,
            overrides: TypeSelection::default(),
        }
    }
}

pub struct Sweeper<'a> {
    config: &'a Config,
    account: AccountContext,
    registry: &'a ResourceRegistry,
    engine: FilterEngine,
    options: RunOptions,
    settings: SweepSettings,
    clock: &'a dyn Clock,
    cancel: &'a CancelToken,
    logger: Option<&'a ActivityLoggerHandle>,
}

impl<'a> Sweeper<'a> {
    pub fn new(
        config: &'a Config,
        account: AccountContext,
        registry: &'a ResourceRegistry,
        options: RunOptions,
        clock: &'a dyn Clock,
        cancel: &'a CancelToken,
    ) -> Result<Self> {
        config.account(&account.id)?;
        config.validate_against(registry)?;
        for name in options.overrides.names() {
            if !registry.contains(name) {
                return Err(SweepError::UnknownResourceType {
                    resource_type: name.clone(),
                });
            }
        }
        let engine = FilterEngine::for_account(config, &account.id, &options.overrides)?;

        let mut settings = SweepSettings::from(&config.scheduler);
        if let Some(retries) = options.max_wait_retries {
            settings.max_wait_retries = retries;
        }

        Ok(Self {
            config,
            account,
            registry,
            engine,
            options,
            settings,
            clock,
            cancel,
            logger: None,
        })
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Option<&'a ActivityLoggerHandle>) -> Self {
        self.logger = logger;
        self
    }

    /// Replace the filter engine, e.g. to pin the reference time.
    #[must_use]
    pub fn with_engine(mut self, engine: FilterEngine) -> Self {
        self.engine = engine;
        self
    }

    #[must_use]
    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    #[must_use]
    pub fn engine(&self) -> &FilterEngine {
        &self.engine
    }

    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    #[must_use]
    pub fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = self.logger {
            logger.send(event);
        }
    }

    /// Start a run: log it, then list and classify every enabled type in
    /// every configured region.
    #[must_use]
    pub fn scan(&self) -> ScanResult {
        self.log(ActivityEvent::RunStarted {
            account: self.account.id.clone(),
            dry_run: self.options.dry_run,
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self
                .config
                .stable_hash()
                .unwrap_or_else(|_| "unknown".to_string()),
        });
        self.scanner().with_logger(self.logger).collect()
    }

    fn scanner(&self) -> Scanner<'_> {
        Scanner::new(self.registry, &self.engine, &self.config.regions)
            .with_call_timeout(self.settings.call_timeout)
    }

    /// Turn a finished scan into a report, removing candidates unless this
    /// is a dry run.
    pub fn execute(&self, scan: ScanResult, prompter: &mut dyn Prompter) -> Result<RunReport> {
        let started = self.clock.elapsed();
        let ScanResult {
            resources,
            failures,
        } = scan;
        let mut records: Vec<DeletionRecord> = resources
            .into_iter()
            .map(DeletionRecord::from_classified)
            .collect();
        let candidates: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_terminal())
            .map(|(i, _)| i)
            .collect();

        let (outcome, sweeps) = if self.options.dry_run {
            (RunOutcome::DryRun, 0)
        } else if candidates.is_empty() {
            (RunOutcome::Converged, 0)
        } else {
            let force_sleep = self
                .options
                .force_sleep
                .unwrap_or_else(|| self.config.scheduler.force_sleep());
            let gate = ConfirmationGate::from_flags(self.options.force, force_sleep);
            match gate.pass(
                &self.account,
                candidates.len(),
                prompter,
                self.clock,
                self.cancel,
            )? {
                GateOutcome::Confirmed => {
                    let table = candidates.iter().map(|&i| records[i].clone()).collect();
                    let summary = DeletionScheduler::new(
                        self.registry,
                        self.settings.clone(),
                        self.clock,
                        self.cancel,
                    )
                    .with_logger(self.logger)
                    .run(table);
                    for (&i, record) in candidates.iter().zip(summary.records) {
                        records[i] = record;
                    }
                    (RunOutcome::from(summary.outcome), summary.sweeps)
                }
                GateOutcome::Declined => {
                    skip_all(&mut records, &candidates, "confirmation declined");
                    (RunOutcome::Aborted, 0)
                }
                GateOutcome::Cancelled => {
                    skip_all(&mut records, &candidates, "cancelled before removal");
                    (RunOutcome::Cancelled, 0)
                }
            }
        };

        let report = RunReport::new(self.account.clone(), outcome, sweeps, &records, failures);
        let elapsed = self.clock.elapsed().saturating_sub(started);
        self.log(ActivityEvent::RunFinished {
            account: self.account.id.clone(),
            outcome: outcome.as_str().to_string(),
            exit_code: report.exit_code(),
            sweeps,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
        Ok(report)
    }

    /// Scan, then execute.
    pub fn run(&self, prompter: &mut dyn Prompter) -> Result<RunReport> {
        let scan = self.scan();
        self.execute(scan, prompter)
    }

    /// Scan and render a blueprint that protects everything present.
    /// Not a run: nothing reaches the activity log.
    pub fn blueprint(&self, options: BlueprintOptions) -> Result<String> {
        let scan = self.scanner().collect();
        render_blueprint(self.config, &self.account.id, &scan, options)
    }
}

fn skip_all(records: &mut [DeletionRecord], indices: &[usize], reason: &str) {
    for &i in indices {
        records[i].skip(reason);
    }
}
