//! Progress reporting and cooperative cancellation for long-running operations.
//!
//! Long operations poll a [`ProgressCallback`] at coarse checkpoints. The
//! callback receives a [`Progress`] snapshot and returns `true` to continue
//! or `false` to request cancellation. Cancellation is cooperative: nothing
//! is interrupted preemptively, the operation notices the request at its next
//! checkpoint and abandons the current phase.
//!
//! # Example
//!
//! ```
//! use mesh_core::progress::{Progress, ProgressCallback, ProgressTracker};
//!
//! let callback: ProgressCallback = Box::new(|progress: &Progress| {
//!     println!("{}% complete: {}", progress.percent(), progress.message);
//!     true // Continue processing (return false to cancel)
//! });
//!
//! let tracker = ProgressTracker::new(100);
//! for _ in 0..100 {
//!     tracker.increment();
//!     if !tracker.checkpoint(Some(&callback), "working") {
//!         break;
//!     }
//! }
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Progress information passed to callbacks.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Current step (0-based).
    pub current: u64,

    /// Total number of steps.
    pub total: u64,

    /// Human-readable message describing current operation.
    pub message: String,

    /// Elapsed time since operation started.
    pub elapsed: Duration,

    /// Estimated time remaining (if available).
    pub estimated_remaining: Option<Duration>,
}

impl Progress {
    /// Create a new progress report.
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            elapsed: Duration::ZERO,
            estimated_remaining: None,
        }
    }

    /// Get progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64) / (self.total as f64)
        }
    }

    /// Get progress as a percentage (0 to 100).
    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }

    /// Check if the operation is complete.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Callback function for progress reporting.
///
/// Returns `true` to continue, `false` to request cancellation.
pub type ProgressCallback = Box<dyn Fn(&Progress) -> bool + Send + Sync>;

/// A thread-safe progress tracker with a sticky cancellation flag.
///
/// Once the callback has returned `false` (or [`cancel`](Self::cancel) was
/// called) every later checkpoint reports cancellation without invoking the
/// callback again.
#[derive(Debug)]
pub struct ProgressTracker {
    current: AtomicU64,
    total: AtomicU64,
    cancelled: AtomicBool,
    start_time: Instant,
    last_callback_time: Mutex<Option<Instant>>,
    callback_interval: Duration,
}

impl ProgressTracker {
    /// Create a new progress tracker that invokes the callback at every
    /// checkpoint.
    pub fn new(total: u64) -> Self {
        Self::with_interval(total, Duration::ZERO)
    }

    /// Create a tracker that invokes the callback at most once per `interval`.
    ///
    /// The first checkpoint always reaches the callback.
    pub fn with_interval(total: u64, interval: Duration) -> Self {
        Self {
            current: AtomicU64::new(0),
            total: AtomicU64::new(total),
            cancelled: AtomicBool::new(false),
            start_time: Instant::now(),
            last_callback_time: Mutex::new(None),
            callback_interval: interval,
        }
    }

    /// Increment progress by one.
    #[inline]
    pub fn increment(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment progress by a specific amount.
    #[inline]
    pub fn increment_by(&self, amount: u64) {
        self.current.fetch_add(amount, Ordering::Relaxed);
    }

    /// Set the current progress value.
    #[inline]
    pub fn set(&self, value: u64) {
        self.current.store(value, Ordering::Relaxed);
    }

    /// Reset the counter for a new phase with a new total.
    pub fn begin_phase(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.current.store(0, Ordering::Relaxed);
    }

    /// Get the current progress value.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Get the total count.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Check if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Get progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.current() as f64) / (total as f64)
        }
    }

    /// Get elapsed time.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Estimate remaining time based on current progress.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let current = self.current();
        if current == 0 {
            return None;
        }

        let rate = current as f64 / self.elapsed().as_secs_f64();
        if rate > 0.0 {
            let remaining = self.total().saturating_sub(current) as f64 / rate;
            Some(Duration::from_secs_f64(remaining))
        } else {
            None
        }
    }

    /// Create a Progress snapshot.
    pub fn snapshot(&self, message: impl Into<String>) -> Progress {
        Progress {
            current: self.current(),
            total: self.total(),
            message: message.into(),
            elapsed: self.elapsed(),
            estimated_remaining: self.estimated_remaining(),
        }
    }

    /// Poll the callback at a cancellation checkpoint.
    ///
    /// Returns `false` if cancellation has been requested, now or earlier.
    pub fn checkpoint(&self, callback: Option<&ProgressCallback>, message: &str) -> bool {
        if self.is_cancelled() {
            return false;
        }

        let Some(callback) = callback else {
            return true;
        };

        if !self.callback_interval.is_zero() {
            let now = Instant::now();
            let mut last = self
                .last_callback_time
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(prev) = *last
                && now.duration_since(prev) < self.callback_interval
            {
                return true;
            }
            *last = Some(now);
        }

        let should_continue = callback(&self.snapshot(message));
        if !should_continue {
            self.cancel();
        }
        should_continue
    }
}
