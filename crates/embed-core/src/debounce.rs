#![forbid(unsafe_code)]

//! Trailing-edge debouncer driven by host-supplied time.
//!
//! Each [`push`](Debouncer::push) replaces the pending value and restarts the
//! quiet window. [`poll`](Debouncer::poll) releases the value once `now`
//! reaches the deadline. Only the last value pushed within a quiet window is
//! ever released ("latest wins").
//!
//! ```
//! use core::time::Duration;
//! use embed_core::Debouncer;
//!
//! let mut d = Debouncer::new(Duration::from_millis(500));
//! d.push(10, Duration::from_millis(0));
//! d.push(20, Duration::from_millis(100));
//! assert_eq!(d.poll(Duration::from_millis(599)), None);
//! assert_eq!(d.poll(Duration::from_millis(600)), Some(20));
//! assert_eq!(d.poll(Duration::from_millis(2000)), None);
//! ```

use core::time::Duration;

#[derive(Debug, Clone)]
struct Pending<T> {
    value: T,
    deadline: Duration,
}

/// Trailing-edge debouncer.
///
/// Not thread-safe; owned by a single event loop.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<Pending<T>>,
    replaced: u64,
}

impl<T> Debouncer<T> {
    /// Create a debouncer with the given quiet window.
    #[must_use]
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
            replaced: 0,
        }
    }

    #[must_use]
    pub const fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Schedule `value`, discarding any value still waiting.
    ///
    /// Returns `true` if a pending value was replaced.
    pub fn push(&mut self, value: T, now: Duration) -> bool {
        let replaced = self.pending.is_some();
        if replaced {
            self.replaced = self.replaced.saturating_add(1);
        }
        self.pending = Some(Pending {
            value,
            deadline: now.saturating_add(self.quiet),
        });
        replaced
    }

    /// Release the pending value if its quiet window has elapsed.
    pub fn poll(&mut self, now: Duration) -> Option<T> {
        if self.pending.as_ref().is_some_and(|p| now >= p.deadline) {
            self.pending.take().map(|p| p.value)
        } else {
            None
        }
    }

    /// Drop the pending value without releasing it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }

    /// When the pending value will be released.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.pending.as_ref().map(|p| &p.value)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of values discarded because a newer one arrived in time.
    #[must_use]
    pub const fn replaced_count(&self) -> u64 {
        self.replaced
    }
}
