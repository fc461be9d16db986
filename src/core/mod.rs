//! Core types: errors, configuration, account context, bounded calls.

pub mod config;
pub mod context;
pub mod errors;
pub mod timeout;
