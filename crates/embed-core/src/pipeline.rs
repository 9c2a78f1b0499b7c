#![forbid(unsafe_code)]

//! The request coordinator specialised to impact statements.
//!
//! [`ImpactPipeline`] validates raw input, debounces it, and resolves the
//! surviving input either locally (catalog) or by asking the host to fetch
//! from the remote statement service. Remote requests that exceed the
//! response timeout settle with fallback text.
//!
//! ```
//! use core::time::Duration;
//! use embed_core::{Cadence, ImpactPipeline, PipelineAction};
//!
//! let ms = Duration::from_millis;
//! let mut pipeline = ImpactPipeline::local_default();
//! pipeline.submit(10.0, Cadence::OneTime, ms(0)).unwrap();
//! pipeline.submit(40.0, Cadence::OneTime, ms(120)).unwrap();
//!
//! let Some(PipelineAction::Applied(statement)) = pipeline.poll(ms(620)) else {
//!     panic!("expected a local resolution");
//! };
//! assert!(statement.text.starts_with("£40 "));
//! assert!(pipeline.submit(-5.0, Cadence::OneTime, ms(700)).is_err());
//! assert!(pipeline.statement().is_none());
//! ```

use core::time::Duration;

use crate::amount::{Amount, Cadence};
use crate::catalog::StatementCatalog;
use crate::coordinator::{
    CoordinatorConfig, CoordinatorEvent, CoordinatorStats, RequestCoordinator,
};
use crate::epoch::{Epoch, GateDecision};
use crate::error::AmountError;
use crate::remote::{self, ImpactQuery, ImpactResponse, RemoteFailure};
use crate::resolver::{ImpactResolver, ResolvedStatement};

/// Where statements come from. Selected by deployment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResolutionStrategy {
    /// Synchronous lookup against the bundled catalog.
    #[default]
    Local,
    /// Round trip to a `GET /impact` endpoint performed by the host.
    Remote { endpoint: String },
}

/// Validated pipeline input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactInput {
    pub amount: Amount,
    pub cadence: Cadence,
}

/// A fetch the host must perform and report back via
/// [`ImpactPipeline::complete_remote`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFetch {
    pub epoch: Epoch,
    pub query: ImpactQuery,
    pub url: String,
}

/// Result of one [`ImpactPipeline::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineAction {
    /// A statement was resolved locally and is now visible.
    Applied(ResolvedStatement),
    /// The host must fetch `url`.
    Fetch(RemoteFetch),
    /// The remote lookup timed out; the fallback is now visible.
    TimedOut(ResolvedStatement),
}

/// Debounced, cancellation-safe impact statement resolution.
#[derive(Debug, Clone)]
pub struct ImpactPipeline {
    resolver: ImpactResolver,
    strategy: ResolutionStrategy,
    coordinator: RequestCoordinator<ImpactInput, ResolvedStatement>,
}

impl ImpactPipeline {
    #[must_use]
    pub fn new(
        resolver: ImpactResolver,
        strategy: ResolutionStrategy,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            resolver,
            strategy,
            coordinator: RequestCoordinator::new(config),
        }
    }

    /// Local strategy over the builtin catalog with default timings.
    #[must_use]
    pub fn local_default() -> Self {
        Self::new(
            ImpactResolver::new(StatementCatalog::builtin()),
            ResolutionStrategy::Local,
            CoordinatorConfig::default(),
        )
    }

    #[must_use]
    pub const fn resolver(&self) -> &ImpactResolver {
        &self.resolver
    }

    #[must_use]
    pub const fn strategy(&self) -> &ResolutionStrategy {
        &self.strategy
    }

    /// Feed a new raw amount.
    ///
    /// Invalid amounts clear the visible statement immediately and start no
    /// timer; the error is returned to the caller.
    pub fn submit(
        &mut self,
        raw: f64,
        cadence: Cadence,
        now: Duration,
    ) -> Result<Epoch, AmountError> {
        match Amount::new(raw) {
            Ok(amount) => Ok(self.coordinator.submit(ImpactInput { amount, cadence }, now)),
            Err(err) => {
                self.coordinator.clear();
                tracing::debug!(target: "embed.coordinator", error = %err, "input rejected");
                Err(err)
            }
        }
    }

    /// Clear input and visible statement.
    pub fn clear(&mut self) {
        self.coordinator.clear();
    }

    /// Advance timers and perform any due work.
    pub fn poll(&mut self, now: Duration) -> Option<PipelineAction> {
        match self.coordinator.poll(now)? {
            CoordinatorEvent::Dispatch(ticket) => {
                let ImpactInput { amount, cadence } = ticket.input;
                match &self.strategy {
                    ResolutionStrategy::Remote { endpoint } if cadence == Cadence::OneTime => {
                        let query = ImpactQuery::new(amount, cadence);
                        match query.url(endpoint) {
                            Ok(url) => Some(PipelineAction::Fetch(RemoteFetch {
                                epoch: ticket.epoch,
                                url,
                                query,
                            })),
                            Err(failure) => {
                                let statement =
                                    self.resolver.settle_remote(amount, cadence, Err(failure));
                                self.apply(ticket.epoch, statement).map(PipelineAction::Applied)
                            }
                        }
                    }
                    _ => {
                        let statement = self.resolver.resolve(amount, cadence);
                        self.apply(ticket.epoch, statement).map(PipelineAction::Applied)
                    }
                }
            }
            CoordinatorEvent::TimedOut(ticket) => {
                let ImpactInput { amount, cadence } = ticket.input;
                let statement =
                    self.resolver.settle_remote(amount, cadence, Err(RemoteFailure::TimedOut));
                self.apply(ticket.epoch, statement).map(PipelineAction::TimedOut)
            }
        }
    }

    /// Report the outcome of a [`RemoteFetch`]. Returns `true` if it became visible.
    pub fn complete_remote(
        &mut self,
        epoch: Epoch,
        outcome: Result<ImpactResponse, RemoteFailure>,
    ) -> bool {
        let resolver = &self.resolver;
        let decision = self.coordinator.complete_with(epoch, |input| {
            resolver.settle_remote(input.amount, input.cadence, outcome)
        });
        decision == GateDecision::Applied
    }

    /// Convenience for hosts holding a raw `(status, body)` pair.
    pub fn complete_response(&mut self, epoch: Epoch, status: u16, body: &str) -> bool {
        self.complete_remote(epoch, remote::parse_response(status, body))
    }

    /// Visible statement, if any.
    #[must_use]
    pub fn statement(&self) -> Option<&ResolvedStatement> {
        self.coordinator.current()
    }

    /// Whether a newer statement is on its way.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.coordinator.is_pending()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.coordinator.next_deadline()
    }

    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        self.coordinator.stats()
    }

    fn apply(&mut self, epoch: Epoch, statement: ResolvedStatement) -> Option<ResolvedStatement> {
        match self.coordinator.complete(epoch, statement.clone()) {
            GateDecision::Applied => Some(statement),
            GateDecision::Stale | GateDecision::AlreadySettled => None,
        }
    }
}
