#![forbid(unsafe_code)]

//! Core resolution logic for the embeddable impact widget.
//!
//! # Key Components
//!
//! - [`StatementCatalog`] - ordered amount ranges with statement templates
//! - [`ImpactResolver`] - turns an amount and cadence into display text
//! - [`Debouncer`] / [`EpochGate`] - the two primitives behind request coordination
//! - [`RequestCoordinator`] - debounce + single-flight + stale-result suppression
//! - [`ImpactPipeline`] - the coordinator specialised to impact resolution
//! - [`ImpactEndpoint`] - server-side `GET /impact` query semantics
//!
//! # Time
//!
//! Nothing in this crate reads a wall clock on its own. Every time-dependent
//! operation takes `now` as a monotonic [`Duration`](core::time::Duration)
//! supplied by the host, so browser event loops, native binaries and tests
//! all drive the same state machines.

pub mod amount;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod endpoint;
pub mod epoch;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod remote;
pub mod resolver;

pub use amount::{Amount, Cadence};
pub use catalog::{RangeOverlap, StatementCatalog, StatementRange};
pub use clock::{DeterministicClock, MonotonicClock, SystemClock};
pub use config::{EmbedConfig, EndpointSection, PipelineSection, StrategyKind};
pub use coordinator::{
    Completion, CoordinatorConfig, CoordinatorEvent, CoordinatorStats, RequestCoordinator, Ticket,
};
pub use debounce::Debouncer;
pub use endpoint::{EndpointReply, ImpactEndpoint};
pub use epoch::{Epoch, EpochGate, GateDecision};
pub use error::{AmountError, CatalogError, ConfigError};
pub use pipeline::{ImpactInput, ImpactPipeline, PipelineAction, RemoteFetch, ResolutionStrategy};
pub use remote::{ImpactQuery, ImpactResponse, RemoteFailure, ResponseRange};
pub use resolver::{ImpactResolver, ResolvedStatement, StatementTemplates};
