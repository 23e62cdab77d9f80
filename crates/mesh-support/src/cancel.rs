//! Cooperative cancellation shared by every generation phase.

use mesh_core::{ProgressCallback, ProgressTracker};

/// A borrowed view of the caller's progress callback plus the tracker that
/// remembers whether it ever asked to stop.
///
/// Copying the handle is cheap; all copies share one sticky flag.
#[derive(Clone, Copy)]
pub struct CancelCheck<'a> {
    tracker: &'a ProgressTracker,
    callback: Option<&'a ProgressCallback>,
}

impl<'a> CancelCheck<'a> {
    pub fn new(tracker: &'a ProgressTracker, callback: Option<&'a ProgressCallback>) -> Self {
        Self { tracker, callback }
    }

    /// Start a new phase of `total` steps.
    pub fn begin(&self, total: u64) {
        self.tracker.begin_phase(total);
    }

    /// Record `steps` finished units of work in the current phase.
    pub fn advance(&self, steps: u64) {
        self.tracker.increment_by(steps);
    }

    /// Poll the callback. Returns `false` once cancellation has been requested.
    pub fn keep_going(&self, message: &str) -> bool {
        self.tracker.checkpoint(self.callback, message)
    }

    pub fn is_cancelled(&self) -> bool {
        self.tracker.is_cancelled()
    }
}

impl std::fmt::Debug for CancelCheck<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelCheck")
            .field("cancelled", &self.is_cancelled())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_callback_never_cancels() {
        let tracker = ProgressTracker::new(0);
        let check = CancelCheck::new(&tracker, None);
        check.begin(3);
        check.advance(2);
        assert!(check.keep_going("phase"));
        assert_eq!(tracker.current(), 2);
        assert!(!check.is_cancelled());
    }

    #[test]
    fn test_copies_share_flag() {
        let callback: ProgressCallback = Box::new(|_| false);
        let tracker = ProgressTracker::new(0);
        let check = CancelCheck::new(&tracker, Some(&callback));
        let copy = check;
        assert!(!copy.keep_going("stop"));
        assert!(check.is_cancelled());
    }
}
