#![forbid(unsafe_code)]

//! Debounce + single-flight + stale-result suppression.
//!
//! [`RequestCoordinator`] composes a [`Debouncer`] (which input to resolve,
//! and when) with an [`EpochGate`] (whose result may become visible). It is
//! generic over the input and result types and knows nothing about how a
//! resolution is performed: the host polls for [`CoordinatorEvent`]s, runs
//! the work however it likes, and reports back with
//! [`complete`](RequestCoordinator::complete).
//!
//! # Guarantees
//!
//! - Only the last input submitted within a quiet window is dispatched.
//! - At most one ticket is in flight; a newer submit abandons it.
//! - A result is applied only if its epoch is current and unsettled, so an
//!   older resolution finishing late can never overwrite a fresher one.
//! - An in-flight ticket that exceeds the response timeout is surfaced as
//!   [`CoordinatorEvent::TimedOut`] exactly once; the caller settles it with a
//!   fallback and any late real result is dropped as a duplicate.
//!
//! # Example
//!
//! ```
//! use core::time::Duration;
//! use embed_core::{CoordinatorConfig, CoordinatorEvent, GateDecision, RequestCoordinator};
//!
//! let ms = Duration::from_millis;
//! let mut coord = RequestCoordinator::new(CoordinatorConfig::default());
//! coord.submit(10, ms(0));
//! coord.submit(20, ms(100));
//! coord.submit(30, ms(200));
//!
//! assert!(coord.poll(ms(600)).is_none());
//! let Some(CoordinatorEvent::Dispatch(ticket)) = coord.poll(ms(700)) else {
//!     panic!("expected a dispatch");
//! };
//! assert_eq!(ticket.input, 30);
//! assert_eq!(coord.complete(ticket.epoch, "thirty"), GateDecision::Applied);
//! assert_eq!(coord.current(), Some(&"thirty"));
//! ```

use core::time::Duration;

use crate::debounce::Debouncer;
use crate::epoch::{Epoch, EpochGate, GateDecision};

/// Default quiet window before an input is resolved.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Default bound on how long a dispatched ticket may stay unresolved.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of [`RequestCoordinator::complete`].
pub type Completion = GateDecision;

/// Coordinator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Trailing-edge debounce window.
    pub debounce: Duration,
    /// Bounded wait for a dispatched ticket.
    pub response_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

/// One logical request: an input stamped with the epoch it was submitted under.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket<I> {
    pub epoch: Epoch,
    pub input: I,
}

/// Work the host must perform after a [`poll`](RequestCoordinator::poll).
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent<I> {
    /// The debounce window elapsed; resolve this ticket.
    Dispatch(Ticket<I>),
    /// The in-flight ticket exceeded the response timeout; settle it with a fallback.
    TimedOut(Ticket<I>),
}

/// Monotonic counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub submitted: u64,
    pub dispatched: u64,
    pub applied: u64,
    pub stale_dropped: u64,
    pub duplicate_dropped: u64,
    pub abandoned: u64,
    pub timed_out: u64,
    pub cleared: u64,
}

#[derive(Debug, Clone)]
struct InFlight<I> {
    ticket: Ticket<I>,
    started_at: Duration,
}

/// Debounced, single-flight request coordinator with last-input-wins semantics.
///
/// One instance per logical input stream. The epoch counter and the applied
/// result slot are owned exclusively by the instance.
#[derive(Debug, Clone)]
pub struct RequestCoordinator<I, R> {
    config: CoordinatorConfig,
    debouncer: Debouncer<Ticket<I>>,
    gate: EpochGate<R>,
    in_flight: Option<InFlight<I>>,
    stats: CoordinatorStats,
}

impl<I: Clone, R> RequestCoordinator<I, R> {
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            debouncer: Debouncer::new(config.debounce),
            gate: EpochGate::new(),
            in_flight: None,
            stats: CoordinatorStats::default(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Submit a new input. Restarts the debounce window and abandons any
    /// in-flight ticket.
    pub fn submit(&mut self, input: I, now: Duration) -> Epoch {
        let epoch = self.gate.advance();
        self.abandon_in_flight();
        self.debouncer.push(Ticket { epoch, input }, now);
        self.stats.submitted = self.stats.submitted.saturating_add(1);
        tracing::trace!(
            target: "embed.coordinator",
            epoch = epoch.get(),
            deadline_ms = now.saturating_add(self.config.debounce).as_millis() as u64,
            "input submitted"
        );
        epoch
    }

    /// Drop everything: pending input, in-flight ticket and visible result.
    pub fn clear(&mut self) -> Epoch {
        let epoch = self.gate.advance();
        self.abandon_in_flight();
        self.debouncer.cancel();
        self.gate.clear_value();
        self.stats.cleared = self.stats.cleared.saturating_add(1);
        tracing::trace!(target: "embed.coordinator", epoch = epoch.get(), "cleared");
        epoch
    }

    /// Advance timers. Returns at most one event per call.
    pub fn poll(&mut self, now: Duration) -> Option<CoordinatorEvent<I>> {
        let timeout = self.config.response_timeout;
        if let Some(flight) = self
            .in_flight
            .take_if(|flight| now >= flight.started_at.saturating_add(timeout))
        {
            let ticket = flight.ticket;
            self.stats.timed_out = self.stats.timed_out.saturating_add(1);
            tracing::warn!(
                target: "embed.coordinator",
                epoch = ticket.epoch.get(),
                timeout_ms = self.config.response_timeout.as_millis() as u64,
                "in-flight request timed out"
            );
            return Some(CoordinatorEvent::TimedOut(ticket));
        }

        let ticket = self.debouncer.poll(now)?;
        if !self.gate.is_current(ticket.epoch) {
            // Never dispatch superseded input.
            return None;
        }
        self.in_flight = Some(InFlight {
            ticket: ticket.clone(),
            started_at: now,
        });
        self.stats.dispatched = self.stats.dispatched.saturating_add(1);
        tracing::debug!(
            target: "embed.coordinator",
            epoch = ticket.epoch.get(),
            "dispatching request"
        );
        Some(CoordinatorEvent::Dispatch(ticket))
    }

    /// Report a result for `epoch`.
    pub fn complete(&mut self, epoch: Epoch, result: R) -> Completion {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|flight| flight.ticket.epoch == epoch)
        {
            self.in_flight = None;
        }
        let decision = self.gate.accept(epoch, result);
        match decision {
            GateDecision::Applied => {
                self.stats.applied = self.stats.applied.saturating_add(1);
            }
            GateDecision::Stale => {
                self.stats.stale_dropped = self.stats.stale_dropped.saturating_add(1);
                tracing::debug!(
                    target: "embed.coordinator",
                    epoch = epoch.get(),
                    current = self.gate.current().get(),
                    "dropping stale result"
                );
            }
            GateDecision::AlreadySettled => {
                self.stats.duplicate_dropped = self.stats.duplicate_dropped.saturating_add(1);
            }
        }
        decision
    }

    /// Like [`complete`](Self::complete), but builds the result from the
    /// in-flight input only when it can still be applied.
    pub fn complete_with<F>(&mut self, epoch: Epoch, build: F) -> Completion
    where
        F: FnOnce(&I) -> R,
    {
        let result = match self.in_flight.as_ref() {
            Some(flight) if flight.ticket.epoch == epoch => Some(build(&flight.ticket.input)),
            _ => None,
        };
        if let Some(result) = result {
            return self.complete(epoch, result);
        }
        if self.gate.is_current(epoch) {
            self.stats.duplicate_dropped = self.stats.duplicate_dropped.saturating_add(1);
            GateDecision::AlreadySettled
        } else {
            self.stats.stale_dropped = self.stats.stale_dropped.saturating_add(1);
            tracing::debug!(
                target: "embed.coordinator",
                epoch = epoch.get(),
                current = self.gate.current().get(),
                "dropping stale result"
            );
            GateDecision::Stale
        }
    }

    /// Currently visible result.
    #[must_use]
    pub fn current(&self) -> Option<&R> {
        self.gate.value()
    }

    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.gate.current()
    }

    /// The ticket currently awaiting a result, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<&Ticket<I>> {
        self.in_flight.as_ref().map(|flight| &flight.ticket)
    }

    /// Whether the latest input has not been settled yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending() || self.in_flight.is_some()
    }

    /// Earliest time at which [`poll`](Self::poll) can produce an event.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        let timeout = self
            .in_flight
            .as_ref()
            .map(|flight| flight.started_at.saturating_add(self.config.response_timeout));
        match (self.debouncer.deadline(), timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    fn abandon_in_flight(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            self.stats.abandoned = self.stats.abandoned.saturating_add(1);
            tracing::trace!(
                target: "embed.coordinator",
                epoch = flight.ticket.epoch.get(),
                "abandoning in-flight request"
            );
        }
    }
}
