//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use account_sweeper::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, FilterSpec, PatternSpec, TypeSelection};
pub use crate::core::context::AccountContext;
pub use crate::core::errors::{Result, SweepError};

// Filters
pub use crate::filter::engine::{DecisionReason, FilterDecision, FilterEngine};
pub use crate::filter::matcher::{MatchMode, Matcher};
pub use crate::filter::rules::{Filter, FilterGroup};

// Resources
pub use crate::resource::inventory::Inventory;
pub use crate::resource::registry::{RemoveOutcome, ResourceLister, ResourceRegistry};
pub use crate::resource::{PropertyValue, Resource};

// Run
pub use crate::blueprint::{BlueprintOptions, render_blueprint};
pub use crate::orchestrator::{RunOptions, Sweeper};
pub use crate::report::{RunOutcome, RunReport};
pub use crate::scanner::pipeline::{ScanResult, Scanner};
pub use crate::scheduler::cancel::CancelToken;
pub use crate::scheduler::clock::{Clock, ManualClock, SystemClock};
pub use crate::scheduler::gate::{Prompter, ScriptedPrompter, StdinPrompter};
pub use crate::scheduler::sweep::{DeletionScheduler, SweepOutcome, SweepSettings};
