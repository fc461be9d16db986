//! Filter language: property matchers, per-type filter groups, and the engine
//! that classifies discovered resources as protected or removal candidates.

pub mod engine;
pub mod matcher;
pub mod rules;
