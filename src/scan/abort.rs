//! Cooperative scan cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::error::{AlignError, AlignResult};

/// Shared flag checked by scans once per coordinate.
///
/// Cloning shares the flag, so a UI thread or a signal handler can hold one
/// clone while the scan holds another.
///
/// ```
/// use rust_align::scan::ScanAbort;
///
/// let abort = ScanAbort::new();
/// let handle = abort.clone();
/// handle.trigger("operator stop");
/// assert!(abort.is_triggered());
/// assert!(abort.check(0).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScanAbort {
    flag: Arc<AtomicBool>,
    reason: Arc<RwLock<Option<String>>>,
}

impl ScanAbort {
    /// Create an untriggered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn trigger(&self, reason: impl Into<String>) {
        *self.reason.write() = Some(reason.into());
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Reason given to [`trigger`](Self::trigger).
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Clear the flag so the next scan can run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
        *self.reason.write() = None;
    }

    /// Fail with [`AlignError::Aborted`] if triggered; `index` is the
    /// coordinate about to be visited.
    pub fn check(&self, index: usize) -> AlignResult<()> {
        if !self.is_triggered() {
            return Ok(());
        }
        let reason = self.reason().unwrap_or_else(|| "no reason given".to_string());
        warn!(index, %reason, "scan aborted");
        Err(AlignError::Aborted(format!(
            "{} (before coordinate {})",
            reason, index
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn reset_clears_reason() {
        let abort = ScanAbort::new();
        abort.trigger("door opened");
        assert_eq!(abort.reason().as_deref(), Some("door opened"));
        assert_eq!(abort.check(3).unwrap_err().kind(), ErrorKind::Aborted);

        abort.reset();
        assert!(abort.check(3).is_ok());
        assert!(abort.reason().is_none());
    }
}
