//! Deletion scheduler: record state machine, confirmation gate, worker pool,
//! and the sweep loop that drives candidates to a terminal state.

pub mod cancel;
pub mod clock;
pub mod gate;
pub mod pool;
pub mod record;
pub mod sweep;
