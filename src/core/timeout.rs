//! Bounded provider calls.
//!
//! Each call runs on a short-lived helper thread; the caller waits on a
//! single-slot channel with `recv_timeout`. A call that overruns is abandoned
//! (its thread finishes in the background and its result is dropped).

use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;

use crate::core::errors::{Result, SweepError};

/// Run `call` with an upper bound of `timeout`. `Duration::ZERO` runs it inline.
pub fn call_with_timeout<T, F>(operation: &str, timeout: Duration, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    if timeout.is_zero() {
        return call();
    }

    let (tx, rx) = channel::bounded::<Result<T>>(1);
    thread::Builder::new()
        .name("sweep-call".to_string())
        .spawn(move || {
            // Receiver may be gone after a timeout.
            let _ = tx.send(call());
        })
        .map_err(|e| SweepError::Runtime {
            details: format!("failed to spawn call thread for {operation}: {e}"),
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(channel::RecvTimeoutError::Timeout) => Err(SweepError::Timeout {
            operation: operation.to_string(),
            after: timeout,
        }),
        Err(channel::RecvTimeoutError::Disconnected) => Err(SweepError::ChannelClosed {
            component: "call_with_timeout",
        }),
    }
}
