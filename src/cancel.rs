//! Cooperative cancellation between install steps.
//!
//! A running `hdiutil` or `installer` is never interrupted. The token is only
//! polled before the next step starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use crate::error::JdkstrapError;

/// Exit status used when a second signal arrives before the run stopped.
const FORCED_EXIT_CODE: i32 = 1;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fails with `Cancelled` if cancellation was requested.
    ///
    /// `next_step` names the step that is about to be skipped.
    pub fn check(&self, next_step: &str) -> Result<(), JdkstrapError> {
        if self.is_cancelled() {
            tracing::warn!("cancellation requested, not starting {}", next_step);
            return Err(JdkstrapError::Cancelled(next_step.to_string()));
        }
        Ok(())
    }

    /// Sets the flag on SIGINT and SIGTERM.
    ///
    /// The first signal only requests cancellation. A second one, sent while
    /// a download or child process is still blocking, exits the process with
    /// status 1.
    pub fn register_signals(&self) -> Result<()> {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            // Registered first so it sees the flag as it was before this signal.
            signal_hook::flag::register_conditional_shutdown(
                signal,
                FORCED_EXIT_CODE,
                Arc::clone(&self.flag),
            )
            .with_context(|| format!("failed to register shutdown for signal {}", signal))?;
            signal_hook::flag::register(signal, Arc::clone(&self.flag))
                .with_context(|| format!("failed to register handler for signal {}", signal))?;
        }
        Ok(())
    }
}
