#![forbid(unsafe_code)]

//! Platform-independent widget state: impact pipeline plus resize emitter.
//!
//! The wasm layer forwards browser events here with a host timestamp and
//! performs whatever [`TickOutput::fetch`] asks for. Native tests drive the
//! same type with a fake [`FrameHost`].

use core::time::Duration;

use chrono::{DateTime, Utc};
use embed_bridge::{EmbedParams, EmitOutcome, FrameEmitter, FrameHost, TargetOrigin};
use embed_core::{
    AmountError, Cadence, Epoch, ImpactPipeline, PipelineAction, RemoteFailure, RemoteFetch,
    ResolvedStatement,
};

/// Everything the host needs to act on after one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    /// A remote lookup to perform; report back with `complete_fetch`.
    pub fetch: Option<RemoteFetch>,
    /// The visible statement changed and should be re-rendered.
    pub statement_changed: bool,
    pub resize: EmitOutcome,
}

pub struct WidgetCore<H> {
    pipeline: ImpactPipeline,
    emitter: FrameEmitter<H>,
    params: EmbedParams,
    cadence: Cadence,
    last_amount: Option<f64>,
    statement_changed: bool,
}

impl<H: FrameHost> WidgetCore<H> {
    pub fn new(
        pipeline: ImpactPipeline,
        host: H,
        target: TargetOrigin,
        params: EmbedParams,
    ) -> Self {
        Self {
            pipeline,
            emitter: FrameEmitter::new(host, target),
            cadence: params.cadence.unwrap_or_default(),
            params,
            last_amount: None,
            statement_changed: false,
        }
    }

    pub const fn params(&self) -> &EmbedParams {
        &self.params
    }

    pub const fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub const fn emitter(&self) -> &FrameEmitter<H> {
        &self.emitter
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.emitter.host_mut()
    }

    /// Document loaded: seed from the embed URL and report the first height.
    pub fn on_load(&mut self, now: Duration) -> EmitOutcome {
        if let Some(amount) = self.params.amount_f64() {
            // URL seeds are positive integers, so this cannot be rejected.
            let _ = self.set_amount(amount, now);
        }
        self.emitter.on_load()
    }

    /// The user edited the amount field.
    pub fn set_amount(&mut self, raw: f64, now: Duration) -> Result<Epoch, AmountError> {
        let had_statement = self.pipeline.statement().is_some();
        match self.pipeline.submit(raw, self.cadence, now) {
            Ok(epoch) => {
                self.last_amount = Some(raw);
                Ok(epoch)
            }
            Err(err) => {
                self.last_amount = None;
                if had_statement {
                    self.mark_changed();
                }
                Err(err)
            }
        }
    }

    /// The user switched between one-time and monthly.
    pub fn set_cadence(&mut self, cadence: Cadence, now: Duration) {
        if cadence == self.cadence {
            return;
        }
        self.cadence = cadence;
        if let Some(amount) = self.last_amount {
            let _ = self.set_amount(amount, now);
        }
    }

    /// Run due timers and flush at most one resize.
    pub fn tick(&mut self, now: Duration) -> TickOutput {
        let fetch = match self.pipeline.poll(now) {
            Some(PipelineAction::Fetch(fetch)) => Some(fetch),
            Some(PipelineAction::Applied(_) | PipelineAction::TimedOut(_)) => {
                self.mark_changed();
                None
            }
            None => None,
        };
        TickOutput {
            fetch,
            statement_changed: std::mem::take(&mut self.statement_changed),
            resize: self.emitter.on_frame(),
        }
    }

    /// Report the HTTP result of a fetch. Returns `true` if it became visible.
    pub fn complete_fetch(&mut self, epoch: Epoch, status: u16, body: &str) -> bool {
        let applied = self.pipeline.complete_response(epoch, status, body);
        if applied {
            self.mark_changed();
        }
        applied
    }

    /// Report a transport failure for a fetch.
    pub fn fail_fetch(&mut self, epoch: Epoch, message: impl Into<String>) -> bool {
        let applied = self
            .pipeline
            .complete_remote(epoch, Err(RemoteFailure::Transport(message.into())));
        if applied {
            self.mark_changed();
        }
        applied
    }

    /// Layout changed for reasons the core cannot see.
    pub fn notify_size_changed(&mut self) {
        self.emitter.notify_size_changed();
    }

    pub fn complete_donation(
        &mut self,
        amount: f64,
        donation_id: &str,
        timestamp: DateTime<Utc>,
    ) -> EmitOutcome {
        self.emitter.complete(amount, donation_id, timestamp)
    }

    pub fn statement(&self) -> Option<&ResolvedStatement> {
        self.pipeline.statement()
    }

    pub fn is_loading(&self) -> bool {
        self.pipeline.is_loading()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.pipeline.next_deadline()
    }

    fn mark_changed(&mut self) {
        self.statement_changed = true;
        self.emitter.notify_size_changed();
    }
}
