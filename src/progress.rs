//! Cooperative cancellation and progress reporting shared by the index
//! builder and the KM/SKiM drivers (§4.10). Neither of those components
//! starts its own timers or threads; they just check this token at the
//! checkpoints the caller's job runtime expects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::{Error, Result};

#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns a cancellation error if the token has been tripped. Callers
    /// invoke this at each checkpoint named in §5 rather than polling.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }
}

/// Sink for the monotone `[0.0, 1.0)` progress value a long job reports.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64);
}

pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _fraction: f64) {}
}

/// Clamps a `done/total` ratio to `< 1.0` until genuinely complete, per the
/// §4.3 / §4.6 progress contract: full completion is the only time callers
/// should see `1.0`.
pub fn clamp_progress(done: usize, total: usize) -> f64 {
    if total == 0 || done >= total {
        1.0
    } else {
        (done as f64 / total as f64).min(0.9999)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_never_reports_1_0_before_done() {
        assert!(clamp_progress(999, 1000) < 1.0);
        assert_eq!(clamp_progress(1000, 1000), 1.0);
    }

    #[test]
    fn cancellation_is_observed_after_cancel() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(token.check().is_err());
    }
}
