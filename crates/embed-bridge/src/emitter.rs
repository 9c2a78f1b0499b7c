#![forbid(unsafe_code)]

//! Widget-side half of the bridge.
//!
//! [`FrameEmitter`] turns size-change notifications into at most one
//! `widget-resize` per rendered frame and guarantees a single
//! `donation-complete`. The browser is reached only through [`FrameHost`];
//! when the host reports it is not embedded every operation is a no-op.
//!
//! Notifications can come from a size observer bound to the content root
//! (call [`FrameEmitter::notify_size_changed`] from its callback) or from a
//! [`PollingSizeWatcher`] where no observer is available. Either way the
//! flush happens in [`FrameEmitter::on_frame`].

use core::time::Duration;

use chrono::{DateTime, Utc};

use crate::message::{BridgeMessage, DonationComplete};
use crate::origin::TargetOrigin;

/// Browser capabilities the emitter needs.
pub trait FrameHost {
    /// Whether the document runs inside a nested frame.
    fn is_embedded(&self) -> bool;

    /// Full scrollable content height of the document, in CSS pixels.
    fn content_height(&self) -> f64;

    /// `window.parent.postMessage(message, target)`.
    fn post_to_parent(&mut self, message: &BridgeMessage, target: &TargetOrigin);
}

/// What an emitter call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Sent,
    /// Not running inside a frame; nothing is ever sent.
    NotEmbedded,
    /// No size notification since the last frame.
    Idle,
    /// Height equals the last one sent.
    Unchanged,
    /// The host reported a negative or non-finite height.
    InvalidHeight,
    /// Completion was already reported.
    AlreadyCompleted,
}

/// Counters for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitterStats {
    pub notifications: u64,
    pub resizes_sent: u64,
    pub resizes_skipped: u64,
    pub completions_sent: u64,
}

/// Coalescing resize and completion sender.
#[derive(Debug)]
pub struct FrameEmitter<H> {
    host: H,
    target: TargetOrigin,
    embedded: bool,
    dirty: bool,
    last_height: Option<f64>,
    completed: bool,
    stats: EmitterStats,
}

impl<H: FrameHost> FrameEmitter<H> {
    /// Create an emitter. Embedding is detected once, here.
    pub fn new(host: H, target: TargetOrigin) -> Self {
        let embedded = host.is_embedded();
        if embedded && target.is_wildcard() {
            tracing::warn!(
                target: "embed.bridge",
                "emitter posting to wildcard target origin; any parent page can read widget messages"
            );
        }
        tracing::debug!(target: "embed.bridge", embedded, target_origin = %target, "emitter created");
        Self {
            host,
            target,
            embedded,
            dirty: false,
            last_height: None,
            completed: false,
            stats: EmitterStats::default(),
        }
    }

    #[must_use]
    pub const fn is_embedded(&self) -> bool {
        self.embedded
    }

    #[must_use]
    pub const fn target(&self) -> &TargetOrigin {
        &self.target
    }

    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[must_use]
    pub const fn last_height(&self) -> Option<f64> {
        self.last_height
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub const fn stats(&self) -> EmitterStats {
        self.stats
    }

    /// Initial report after the document loads. Sends immediately.
    pub fn on_load(&mut self) -> EmitOutcome {
        if !self.embedded {
            return EmitOutcome::NotEmbedded;
        }
        self.dirty = false;
        self.send_height()
    }

    /// Record that content size may have changed. Cheap; call freely.
    pub fn notify_size_changed(&mut self) {
        if self.embedded {
            self.dirty = true;
            self.stats.notifications = self.stats.notifications.saturating_add(1);
        }
    }

    /// Flush pending size changes. Call once per rendered frame.
    pub fn on_frame(&mut self) -> EmitOutcome {
        if !self.embedded {
            return EmitOutcome::NotEmbedded;
        }
        if !std::mem::take(&mut self.dirty) {
            return EmitOutcome::Idle;
        }
        self.send_height()
    }

    /// Report the terminal business event. Only the first call sends.
    pub fn complete(
        &mut self,
        amount: f64,
        donation_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> EmitOutcome {
        if !self.embedded {
            return EmitOutcome::NotEmbedded;
        }
        if self.completed {
            return EmitOutcome::AlreadyCompleted;
        }
        self.completed = true;
        let event = DonationComplete::new(amount, donation_id, timestamp);
        tracing::info!(
            target: "embed.bridge",
            amount,
            donation_id = %event.donation_id,
            "reporting completion to host"
        );
        self.host
            .post_to_parent(&BridgeMessage::DonationComplete(event), &self.target);
        self.stats.completions_sent = self.stats.completions_sent.saturating_add(1);
        EmitOutcome::Sent
    }

    fn send_height(&mut self) -> EmitOutcome {
        let height = self.host.content_height();
        if !height.is_finite() || height < 0.0 {
            tracing::debug!(target: "embed.bridge", height, "ignoring invalid content height");
            return EmitOutcome::InvalidHeight;
        }
        if self.last_height == Some(height) {
            self.stats.resizes_skipped = self.stats.resizes_skipped.saturating_add(1);
            return EmitOutcome::Unchanged;
        }
        self.host
            .post_to_parent(&BridgeMessage::resize(height), &self.target);
        self.last_height = Some(height);
        self.stats.resizes_sent = self.stats.resizes_sent.saturating_add(1);
        tracing::trace!(target: "embed.bridge", height, "resize sent");
        EmitOutcome::Sent
    }
}

/// Poll-based size source for hosts without a size observer.
///
/// Samples the height at most once per `interval` and reports a change when
/// it differs from the previous sample.
#[derive(Debug, Clone)]
pub struct PollingSizeWatcher {
    interval: Duration,
    next_sample: Option<Duration>,
    last_height: Option<f64>,
}

impl PollingSizeWatcher {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_sample: None,
            last_height: None,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a sample is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: Duration) -> bool {
        self.next_sample.is_none_or(|at| now >= at)
    }

    /// Offer a height sample. Returns `true` if it changed since the last one.
    ///
    /// Samples offered before the interval elapsed are ignored.
    pub fn sample(&mut self, now: Duration, height: f64) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.next_sample = Some(now.saturating_add(self.interval));
        let changed = self.last_height != Some(height);
        self.last_height = Some(height);
        changed
    }

    /// Sample `emitter`'s host and mark the emitter dirty on change.
    pub fn watch<H: FrameHost>(&mut self, now: Duration, emitter: &mut FrameEmitter<H>) -> bool {
        if !emitter.is_embedded() || !self.is_due(now) {
            return false;
        }
        let changed = self.sample(now, emitter.host().content_height());
        if changed {
            emitter.notify_size_changed();
        }
        changed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    /// In-memory frame host recording everything posted to the parent.
    #[derive(Debug, Default)]
    pub(crate) struct FakeFrame {
        pub embedded: bool,
        pub height: f64,
        pub posted: Vec<(BridgeMessage, TargetOrigin)>,
    }

    impl FakeFrame {
        pub(crate) fn embedded(height: f64) -> Self {
            Self {
                embedded: true,
                height,
                posted: Vec::new(),
            }
        }
    }

    impl FrameHost for FakeFrame {
        fn is_embedded(&self) -> bool {
            self.embedded
        }
        fn content_height(&self) -> f64 {
            self.height
        }
        fn post_to_parent(&mut self, message: &BridgeMessage, target: &TargetOrigin) {
            self.posted.push((message.clone(), target.clone()));
        }
    }

    fn target() -> TargetOrigin {
        TargetOrigin::Explicit("https://host.example".into())
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn load_sends_immediately_to_explicit_target() {
        let mut emitter = FrameEmitter::new(FakeFrame::embedded(640.0), target());
        assert_eq!(emitter.on_load(), EmitOutcome::Sent);
        assert_eq!(
            emitter.host().posted,
            vec![(BridgeMessage::resize(640.0), target())]
        );
    }

    #[test]
    fn many_notifications_one_message_per_frame() {
        let mut emitter = FrameEmitter::new(FakeFrame::embedded(500.0), target());
        emitter.on_load();
        for h in [520.0, 560.0, 610.0] {
            emitter.host_mut().height = h;
            emitter.notify_size_changed();
        }
        assert_eq!(emitter.on_frame(), EmitOutcome::Sent);
        assert_eq!(emitter.on_frame(), EmitOutcome::Idle);
        assert_eq!(emitter.host().posted.len(), 2);
        assert_eq!(emitter.last_height(), Some(610.0));
        assert_eq!(emitter.stats().notifications, 3);
    }

    #[test]
    fn unchanged_height_is_not_resent() {
        let mut emitter = FrameEmitter::new(FakeFrame::embedded(500.0), target());
        emitter.on_load();
        emitter.notify_size_changed();
        assert_eq!(emitter.on_frame(), EmitOutcome::Unchanged);
        assert_eq!(emitter.host().posted.len(), 1);
        assert_eq!(emitter.stats().resizes_skipped, 1);
    }

    #[test]
    fn not_embedded_is_a_no_op() {
        let mut emitter = FrameEmitter::new(FakeFrame::default(), TargetOrigin::Wildcard);
        assert_eq!(emitter.on_load(), EmitOutcome::NotEmbedded);
        emitter.notify_size_changed();
        assert_eq!(emitter.on_frame(), EmitOutcome::NotEmbedded);
        assert_eq!(emitter.complete(10.0, "d", ts()), EmitOutcome::NotEmbedded);
        assert!(emitter.host().posted.is_empty());
        assert_eq!(emitter.stats(), EmitterStats::default());
    }

    #[test]
    fn completion_is_sent_once() {
        let mut emitter = FrameEmitter::new(FakeFrame::embedded(500.0), target());
        assert_eq!(emitter.complete(40.0, "don_1", ts()), EmitOutcome::Sent);
        assert_eq!(emitter.complete(40.0, "don_1", ts()), EmitOutcome::AlreadyCompleted);
        assert_eq!(emitter.complete(50.0, "don_2", ts()), EmitOutcome::AlreadyCompleted);
        let completions: Vec<_> = emitter
            .host()
            .posted
            .iter()
            .filter(|(m, _)| matches!(m, BridgeMessage::DonationComplete(_)))
            .collect();
        assert_eq!(completions.len(), 1);
        assert!(emitter.is_completed());
    }

    #[test]
    fn invalid_height_is_skipped() {
        let mut emitter = FrameEmitter::new(FakeFrame::embedded(f64::NAN), target());
        assert_eq!(emitter.on_load(), EmitOutcome::InvalidHeight);
        assert!(emitter.host().posted.is_empty());
    }

    #[test]
    fn polling_watcher_samples_on_interval() {
        let ms = Duration::from_millis;
        let mut watcher = PollingSizeWatcher::new(ms(250));
        let mut emitter = FrameEmitter::new(FakeFrame::embedded(300.0), target());
        emitter.on_load();

        assert!(watcher.watch(ms(0), &mut emitter));
        assert_eq!(emitter.on_frame(), EmitOutcome::Unchanged);

        emitter.host_mut().height = 420.0;
        assert!(!watcher.watch(ms(100), &mut emitter));
        assert_eq!(emitter.on_frame(), EmitOutcome::Idle);

        assert!(watcher.watch(ms(250), &mut emitter));
        assert_eq!(emitter.on_frame(), EmitOutcome::Sent);
        assert!(!watcher.watch(ms(500), &mut emitter));
    }
}
