//! Activity logging: a background thread writing append-only JSONL.

pub mod activity;
pub mod jsonl;
