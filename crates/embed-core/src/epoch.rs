#![forbid(unsafe_code)]

//! Epoch-stamped result gate for cooperative cancellation.
//!
//! Every new request advances the gate's epoch. Work started under an older
//! epoch may still run to completion, but when it reports back its epoch no
//! longer matches and the result is dropped. This is the suppression half of
//! cancellation: nothing is aborted, stale effects are simply never applied.
//!
//! ```
//! use embed_core::{EpochGate, GateDecision};
//!
//! let mut gate = EpochGate::new();
//! let first = gate.advance();
//! let second = gate.advance();
//!
//! assert_eq!(gate.accept(second, "fresh"), GateDecision::Applied);
//! assert_eq!(gate.accept(first, "stale"), GateDecision::Stale);
//! assert_eq!(gate.value(), Some(&"fresh"));
//! ```

use core::fmt;

/// Monotonic request generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    /// The epoch before any request was made.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of offering a result to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The result belonged to the current epoch and is now visible.
    Applied,
    /// A newer epoch exists; the result was dropped.
    Stale,
    /// The current epoch already has a result; the duplicate was dropped.
    AlreadySettled,
}

/// Holds the current epoch and the last applied result.
#[derive(Debug, Clone)]
pub struct EpochGate<R> {
    current: Epoch,
    settled: bool,
    applied: Option<(Epoch, R)>,
}

impl<R> EpochGate<R> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: Epoch::ZERO,
            settled: false,
            applied: None,
        }
    }

    /// Start a new generation. Older epochs become stale immediately.
    ///
    /// The previously applied value stays visible until replaced or cleared.
    pub fn advance(&mut self) -> Epoch {
        self.current = self.current.next();
        self.settled = false;
        self.current
    }

    #[must_use]
    pub const fn current(&self) -> Epoch {
        self.current
    }

    #[must_use]
    pub fn is_current(&self, epoch: Epoch) -> bool {
        epoch == self.current
    }

    /// Whether the current epoch already has a result.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.settled
    }

    /// Offer a result produced under `epoch`.
    pub fn accept(&mut self, epoch: Epoch, value: R) -> GateDecision {
        if epoch != self.current {
            return GateDecision::Stale;
        }
        if self.settled {
            return GateDecision::AlreadySettled;
        }
        self.settled = true;
        self.applied = Some((epoch, value));
        GateDecision::Applied
    }

    /// Remove the visible value.
    pub fn clear_value(&mut self) -> Option<R> {
        self.applied.take().map(|(_, value)| value)
    }

    #[must_use]
    pub fn value(&self) -> Option<&R> {
        self.applied.as_ref().map(|(_, value)| value)
    }

    /// Epoch the visible value was produced under.
    #[must_use]
    pub fn value_epoch(&self) -> Option<Epoch> {
        self.applied.as_ref().map(|(epoch, _)| *epoch)
    }
}

impl<R> Default for EpochGate<R> {
    fn default() -> Self {
        Self::new()
    }
}
