#![forbid(unsafe_code)]

//! Account Sweeper: remove every resource in a cloud account that the
//! configured filters do not protect.
//!
//! A run has three stages:
//! 1. **Scan**: list every enabled resource type in every configured region
//!    and classify each resource against the filter language
//! 2. **Gate**: require the operator to type the account alias (or wait out
//!    a cancellable delay under `--force`)
//! 3. **Sweep**: issue removals in parallel and re-check liveness until
//!    every candidate is terminal or progress stalls
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use account_sweeper::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use account_sweeper::core::config::Config;
//! use account_sweeper::filter::engine::FilterEngine;
//! ```

pub mod prelude;

pub mod blueprint;
pub mod core;
pub mod filter;
pub mod logger;
pub mod orchestrator;
pub mod report;
pub mod resource;
pub mod scanner;
pub mod scheduler;
#[cfg(feature = "signals")]
pub mod signals;
