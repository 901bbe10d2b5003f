//! Cooperative cancellation shared by the bootstrap, the queue and the mover.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};

/// Granularity of cancellable waits.
const WAIT_SLICE: Duration = Duration::from_millis(25);

/// Cloneable cancellation flag. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `EngineError::Cancelled` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early with an error on cancellation.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());

        token.cancel();
        assert!(clone.is_cancelled());
        assert!(clone.check().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_sleep_returns_early_when_cancelled() {
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        let started = Instant::now();
        let result = token.sleep(Duration::from_secs(10));
        handle.join().expect("Canceller thread panicked");

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_zero_sleep_completes() {
        assert!(CancelToken::new().sleep(Duration::ZERO).is_ok());
    }
}
