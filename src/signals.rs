//! Signal handling: SIGINT/SIGTERM cancel the run.
//!
//! Uses `signal-hook` flag registration; the gate, the sweep loop and the
//! workers poll the shared [`CancelToken`]. A second interrupt while the
//! token is already set terminates the process immediately with exit code 2.

#![allow(missing_docs)]

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::scheduler::cancel::CancelToken;

/// Exit status used when a second signal forces termination.
const FORCED_EXIT_CODE: i32 = 2;

/// Registered signal hooks feeding one cancel token.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    token: CancelToken,
}

impl SignalHandler {
    /// Register OS signal hooks for `token`.
    ///
    /// Registration is best-effort; failures are reported on stderr but not fatal.
    pub fn install(token: &CancelToken) -> Self {
        for (name, signal) in [("SIGINT", SIGINT), ("SIGTERM", SIGTERM)] {
            // Conditional shutdown must be registered before the flag itself.
            if let Err(e) =
                signal_hook::flag::register_conditional_shutdown(signal, FORCED_EXIT_CODE, token.flag())
            {
                eprintln!("[SWP-SIGNAL] failed to register forced exit for {name}: {e}");
            }
            if let Err(e) = signal_hook::flag::register(signal, token.flag()) {
                eprintln!("[SWP-SIGNAL] failed to register {name}: {e}");
            }
        }
        Self {
            token: token.clone(),
        }
    }

    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}
