#![forbid(unsafe_code)]

//! Host-side half of the bridge.
//!
//! [`FrameBridgeListener`] receives every `message` event of the host window
//! as an [`InboundEnvelope`] and decides, deterministically, what to do with
//! it. Checks run in a fixed order: origin, source frame, decoding. Anything
//! that fails a check is dropped with a [`ListenerIgnoredReason`].
//!
//! Frames are matched by the identity of their content window, not by
//! origin, so several widgets served from one origin can coexist.
//!
//! Duplicate delivery is harmless: re-applying a height reports
//! [`ListenerOutcome::Unchanged`] and a repeated completion for the same
//! frame and donation id fires no callbacks.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::message::{BridgeMessage, Decoded, DonationComplete};
use crate::origin::OriginPolicy;

/// Handle for a frame registered with a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u32);

impl FrameId {
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Host-assigned identity of a frame's content window.
///
/// Whatever maps `event.source` to a managed frame hands out these ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

/// Handle for a registered completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u32);

/// One `message` event as seen by the host.
#[derive(Debug, Clone, Copy)]
pub struct InboundEnvelope<'a> {
    /// `event.origin`.
    pub origin: &'a str,
    /// Identity of `event.source`, if it maps to a known window.
    pub source: Option<WindowId>,
    /// `event.data`.
    pub data: &'a Value,
}

/// Upper bound on applied heights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxHeight {
    /// Absolute pixels.
    Fixed(f64),
    /// Fraction of the host viewport height (modal presentation).
    ViewportFraction(f64),
}

/// Listener tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    pub policy: OriginPolicy,
    /// Heights below this are raised to it.
    pub min_height: f64,
    /// Heights above this are clamped to it. Applied after `min_height`.
    pub max_height: Option<MaxHeight>,
}

impl ListenerConfig {
    /// Accept messages from exactly `origin`.
    #[must_use]
    pub fn for_origin(origin: &str) -> Self {
        Self {
            policy: OriginPolicy::exact([origin]),
            min_height: 0.0,
            max_height: None,
        }
    }

    #[must_use]
    pub fn with_min_height(mut self, min_height: f64) -> Self {
        self.min_height = min_height;
        self
    }

    #[must_use]
    pub fn with_max_height(mut self, max_height: MaxHeight) -> Self {
        self.max_height = Some(max_height);
        self
    }
}

/// Why an inbound message was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerIgnoredReason {
    OriginRejected,
    UnknownSource,
    UnknownType,
    Malformed,
}

/// What the listener did with one message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListenerOutcome {
    /// The frame should now render at `height`.
    SetHeight { frame: FrameId, height: f64 },
    /// The clamped height equals what the frame already has.
    Unchanged { frame: FrameId },
    /// Completion fanned out to `callbacks` subscribers (possibly zero).
    Delivered { frame: FrameId, callbacks: usize },
    /// This frame already reported this donation.
    DuplicateCompletion { frame: FrameId },
    Ignored(ListenerIgnoredReason),
}

type CompletionCallback = Box<dyn FnMut(FrameId, &DonationComplete)>;

#[derive(Debug)]
struct ManagedFrame {
    id: FrameId,
    source: WindowId,
    height: Option<f64>,
    completions: HashSet<String>,
}

/// Origin-checked, source-matched message handler for managed frames.
pub struct FrameBridgeListener {
    config: ListenerConfig,
    viewport_height: f64,
    frames: Vec<ManagedFrame>,
    callbacks: Vec<(CallbackId, CompletionCallback)>,
    next_frame: u32,
    next_callback: u32,
}

impl fmt::Debug for FrameBridgeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBridgeListener")
            .field("config", &self.config)
            .field("viewport_height", &self.viewport_height)
            .field("frames", &self.frames)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl FrameBridgeListener {
    #[must_use]
    pub fn new(config: ListenerConfig) -> Self {
        warn_if_wildcard(&config.policy);
        Self {
            config,
            viewport_height: 0.0,
            frames: Vec::new(),
            callbacks: Vec::new(),
            next_frame: 1,
            next_callback: 1,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Replace the origin policy. Frames and callbacks are kept.
    pub fn set_policy(&mut self, policy: OriginPolicy) {
        warn_if_wildcard(&policy);
        self.config.policy = policy;
    }

    pub fn set_min_height(&mut self, min_height: f64) {
        self.config.min_height = min_height;
    }

    pub fn set_max_height(&mut self, max_height: Option<MaxHeight>) {
        self.config.max_height = max_height;
    }

    /// Current host viewport height, used by [`MaxHeight::ViewportFraction`].
    pub fn set_viewport_height(&mut self, height: f64) {
        self.viewport_height = height;
    }

    /// Start managing the frame whose content window is `source`.
    pub fn register_frame(&mut self, source: WindowId) -> FrameId {
        let id = FrameId(self.next_frame);
        self.next_frame = self.next_frame.wrapping_add(1);
        self.frames.push(ManagedFrame {
            id,
            source,
            height: None,
            completions: HashSet::new(),
        });
        tracing::debug!(target: "embed.bridge", frame = id.0, source = source.0, "frame registered");
        id
    }

    pub fn unregister_frame(&mut self, frame: FrameId) -> bool {
        let before = self.frames.len();
        self.frames.retain(|f| f.id != frame);
        before != self.frames.len()
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Last height applied to `frame`.
    #[must_use]
    pub fn frame_height(&self, frame: FrameId) -> Option<f64> {
        self.frames.iter().find(|f| f.id == frame)?.height
    }

    /// Subscribe to completion events from any managed frame.
    pub fn on_donation_complete<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut(FrameId, &DonationComplete) + 'static,
    {
        let id = CallbackId(self.next_callback);
        self.next_callback = self.next_callback.wrapping_add(1);
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    pub fn remove_callback(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(cb, _)| *cb != id);
        before != self.callbacks.len()
    }

    /// Process one inbound message.
    pub fn handle(&mut self, envelope: &InboundEnvelope<'_>) -> ListenerOutcome {
        if !self.config.policy.allows(envelope.origin) {
            tracing::warn!(
                target: "embed.bridge",
                origin = envelope.origin,
                "rejected message from unexpected origin"
            );
            return ListenerOutcome::Ignored(ListenerIgnoredReason::OriginRejected);
        }
        let Some(index) = envelope
            .source
            .and_then(|source| self.frames.iter().position(|f| f.source == source))
        else {
            tracing::debug!(target: "embed.bridge", origin = envelope.origin, "message from unmanaged window");
            return ListenerOutcome::Ignored(ListenerIgnoredReason::UnknownSource);
        };

        match BridgeMessage::decode(envelope.data) {
            Decoded::Message(BridgeMessage::WidgetResize { height }) => self.apply_height(index, height),
            Decoded::Message(BridgeMessage::DonationComplete(event)) => self.deliver(index, &event),
            Decoded::Unknown(kind) => {
                tracing::debug!(target: "embed.bridge", kind = %kind, "ignoring unknown message type");
                ListenerOutcome::Ignored(ListenerIgnoredReason::UnknownType)
            }
            Decoded::Malformed(reason) => {
                tracing::debug!(target: "embed.bridge", reason = %reason, "ignoring malformed message");
                ListenerOutcome::Ignored(ListenerIgnoredReason::Malformed)
            }
        }
    }

    /// `max(height, min_height)`, then clamped to the configured maximum.
    #[must_use]
    pub fn clamp_height(&self, height: f64) -> f64 {
        let raised = height.max(self.config.min_height);
        match self.config.max_height {
            Some(MaxHeight::Fixed(max)) => raised.min(max),
            Some(MaxHeight::ViewportFraction(fraction)) if self.viewport_height > 0.0 => {
                raised.min(self.viewport_height * fraction)
            }
            _ => raised,
        }
    }

    fn apply_height(&mut self, index: usize, height: f64) -> ListenerOutcome {
        let height = self.clamp_height(height);
        let frame = &mut self.frames[index];
        if frame.height == Some(height) {
            return ListenerOutcome::Unchanged { frame: frame.id };
        }
        frame.height = Some(height);
        tracing::trace!(target: "embed.bridge", frame = frame.id.0, height, "frame resized");
        ListenerOutcome::SetHeight {
            frame: frame.id,
            height,
        }
    }

    fn deliver(&mut self, index: usize, event: &DonationComplete) -> ListenerOutcome {
        let frame = &mut self.frames[index];
        let id = frame.id;
        if !frame.completions.insert(event.donation_id.clone()) {
            tracing::debug!(
                target: "embed.bridge",
                frame = id.0,
                donation_id = %event.donation_id,
                "duplicate completion dropped"
            );
            return ListenerOutcome::DuplicateCompletion { frame: id };
        }
        for (_, callback) in &mut self.callbacks {
            callback(id, event);
        }
        tracing::info!(
            target: "embed.bridge",
            frame = id.0,
            amount = event.amount,
            donation_id = %event.donation_id,
            callbacks = self.callbacks.len(),
            "donation completed"
        );
        ListenerOutcome::Delivered {
            frame: id,
            callbacks: self.callbacks.len(),
        }
    }
}

fn warn_if_wildcard(policy: &OriginPolicy) {
    if policy.is_wildcard() {
        tracing::warn!(
            target: "embed.bridge",
            "listener accepts messages from any origin; spoofed messages will be acted upon"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    const WIDGET: &str = "https://widget.example";

    fn listener() -> FrameBridgeListener {
        FrameBridgeListener::new(ListenerConfig::for_origin(WIDGET))
    }

    fn envelope<'a>(origin: &'a str, source: u64, data: &'a Value) -> InboundEnvelope<'a> {
        InboundEnvelope {
            origin,
            source: Some(WindowId(source)),
            data,
        }
    }

    fn completion(id: &str) -> Value {
        BridgeMessage::DonationComplete(DonationComplete::new(
            40.0,
            id,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ))
        .to_value()
    }

    #[test]
    fn resize_applies_once_then_unchanged() {
        let mut l = listener();
        let frame = l.register_frame(WindowId(7));
        let data = json!({ "type": "widget-resize", "height": 700 });
        assert_eq!(
            l.handle(&envelope(WIDGET, 7, &data)),
            ListenerOutcome::SetHeight { frame, height: 700.0 }
        );
        assert_eq!(
            l.handle(&envelope(WIDGET, 7, &data)),
            ListenerOutcome::Unchanged { frame }
        );
        assert_eq!(l.frame_height(frame), Some(700.0));
    }

    #[test]
    fn spoofed_origin_is_rejected() {
        let mut l = listener();
        l.register_frame(WindowId(1));
        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        l.on_donation_complete(move |_, _| *counter.borrow_mut() += 1);

        let data = completion("don_1");
        assert_eq!(
            l.handle(&envelope("https://evil.example", 1, &data)),
            ListenerOutcome::Ignored(ListenerIgnoredReason::OriginRejected)
        );
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn frames_sharing_an_origin_are_matched_by_source() {
        let mut l = listener();
        let a = l.register_frame(WindowId(1));
        let b = l.register_frame(WindowId(2));
        let data = json!({ "type": "widget-resize", "height": 900 });
        assert_eq!(
            l.handle(&envelope(WIDGET, 2, &data)),
            ListenerOutcome::SetHeight { frame: b, height: 900.0 }
        );
        assert_eq!(l.frame_height(a), None);
        assert_eq!(
            l.handle(&envelope(WIDGET, 99, &data)),
            ListenerOutcome::Ignored(ListenerIgnoredReason::UnknownSource)
        );
        let no_source = InboundEnvelope {
            origin: WIDGET,
            source: None,
            data: &data,
        };
        assert_eq!(
            l.handle(&no_source),
            ListenerOutcome::Ignored(ListenerIgnoredReason::UnknownSource)
        );
    }

    #[test]
    fn completion_fans_out_once_per_donation() {
        let mut l = listener();
        let frame = l.register_frame(WindowId(3));
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Rc::clone(&seen);
            l.on_donation_complete(move |f, event| {
                seen.borrow_mut().push((tag, f, event.donation_id.clone()));
            });
        }

        let data = completion("don_9");
        assert_eq!(
            l.handle(&envelope(WIDGET, 3, &data)),
            ListenerOutcome::Delivered { frame, callbacks: 2 }
        );
        assert_eq!(
            l.handle(&envelope(WIDGET, 3, &data)),
            ListenerOutcome::DuplicateCompletion { frame }
        );
        assert_eq!(
            *seen.borrow(),
            vec![
                ("first", frame, "don_9".to_string()),
                ("second", frame, "don_9".to_string()),
            ]
        );
    }

    #[test]
    fn completion_without_subscribers_is_dropped_silently() {
        let mut l = listener();
        let frame = l.register_frame(WindowId(3));
        let id = l.on_donation_complete(|_, _| panic!("removed callback must not fire"));
        assert!(l.remove_callback(id));
        assert!(!l.remove_callback(id));
        assert_eq!(
            l.handle(&envelope(WIDGET, 3, &completion("x"))),
            ListenerOutcome::Delivered { frame, callbacks: 0 }
        );
    }

    #[test]
    fn unknown_and_malformed_messages_are_ignored() {
        let mut l = listener();
        l.register_frame(WindowId(1));
        let unknown = json!({ "type": "analytics" });
        let malformed = json!({ "type": "widget-resize", "height": "big" });
        assert_eq!(
            l.handle(&envelope(WIDGET, 1, &unknown)),
            ListenerOutcome::Ignored(ListenerIgnoredReason::UnknownType)
        );
        assert_eq!(
            l.handle(&envelope(WIDGET, 1, &malformed)),
            ListenerOutcome::Ignored(ListenerIgnoredReason::Malformed)
        );
    }

    #[test]
    fn heights_are_clamped() {
        let mut l = FrameBridgeListener::new(
            ListenerConfig::for_origin(WIDGET)
                .with_min_height(600.0)
                .with_max_height(MaxHeight::ViewportFraction(0.8)),
        );
        assert_eq!(l.clamp_height(200.0), 600.0);
        assert_eq!(l.clamp_height(5_000.0), 5_000.0);
        l.set_viewport_height(1_000.0);
        assert_eq!(l.clamp_height(5_000.0), 800.0);
        assert_eq!(l.clamp_height(700.0), 700.0);

        let fixed = FrameBridgeListener::new(
            ListenerConfig::for_origin(WIDGET).with_max_height(MaxHeight::Fixed(400.0)),
        );
        assert_eq!(fixed.clamp_height(900.0), 400.0);
    }

    #[test]
    fn unregistered_frame_stops_matching() {
        let mut l = listener();
        let frame = l.register_frame(WindowId(5));
        assert!(l.unregister_frame(frame));
        assert!(!l.unregister_frame(frame));
        let data = json!({ "type": "widget-resize", "height": 10 });
        assert_eq!(
            l.handle(&envelope(WIDGET, 5, &data)),
            ListenerOutcome::Ignored(ListenerIgnoredReason::UnknownSource)
        );
    }
}
