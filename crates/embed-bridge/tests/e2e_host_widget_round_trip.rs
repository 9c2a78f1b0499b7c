//! End-to-end bridge scenarios: a widget frame emitting through a simulated
//! `postMessage` channel into a host page running the injector.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{TimeZone, Utc};
use embed_bridge::{
    BridgeError, BridgeMessage, EmitOutcome, FrameEmitter, FrameHost, FrameSpec, HostDocument,
    HostInjector, InboundEnvelope, InjectorConfig, InsertPosition, ListenerIgnoredReason,
    ListenerOutcome, TargetOrigin, WindowId,
};
use pretty_assertions::assert_eq;
use serde_json::Value;

const WIDGET_ORIGIN: &str = "https://widget.example";
const HOST_ORIGIN: &str = "https://charity.example";

/// Messages in flight from widget to host: `(sender origin, target, data)`.
type Channel = Rc<RefCell<Vec<(String, TargetOrigin, Value)>>>;

struct WidgetFrame {
    origin: &'static str,
    height: f64,
    channel: Channel,
}

impl FrameHost for WidgetFrame {
    fn is_embedded(&self) -> bool {
        true
    }
    fn content_height(&self) -> f64 {
        self.height
    }
    fn post_to_parent(&mut self, message: &BridgeMessage, target: &TargetOrigin) {
        self.channel
            .borrow_mut()
            .push((self.origin.to_string(), target.clone(), message.to_value()));
    }
}

#[derive(Default)]
struct HostPage {
    next_window: u64,
    frames: BTreeMap<u64, FrameSpec>,
    heights: BTreeMap<u64, f64>,
}

impl HostDocument for HostPage {
    fn has_element(&self, selector: &str) -> bool {
        selector == "#donate"
    }
    fn create_frame(&mut self, spec: &FrameSpec) -> Result<WindowId, BridgeError> {
        self.next_window += 1;
        self.frames.insert(self.next_window, spec.clone());
        Ok(WindowId(self.next_window))
    }
    fn attach_frame(&mut self, _: WindowId, _: &str, _: InsertPosition) -> Result<(), BridgeError> {
        Ok(())
    }
    fn remove_frame(&mut self, frame: WindowId) -> bool {
        self.frames.remove(&frame.0).is_some()
    }
    fn set_frame_height(&mut self, frame: WindowId, height: f64) {
        self.heights.insert(frame.0, height);
    }
}

/// Deliver queued messages whose target admits the host origin.
fn pump(channel: &Channel, injector: &mut HostInjector<HostPage>, source: WindowId) -> Vec<ListenerOutcome> {
    let queued: Vec<_> = channel.borrow_mut().drain(..).collect();
    queued
        .into_iter()
        .filter(|(_, target, _)| target.is_wildcard() || target.as_str() == HOST_ORIGIN)
        .map(|(origin, _, data)| {
            injector.handle_message(&InboundEnvelope {
                origin: &origin,
                source: Some(source),
                data: &data,
            })
        })
        .collect()
}

fn setup() -> (Channel, HostInjector<HostPage>, WindowId) {
    let mut injector = HostInjector::new(
        HostPage::default(),
        InjectorConfig {
            min_height: 300.0,
            ..InjectorConfig::new(format!("{WIDGET_ORIGIN}/embed"), "#donate")
        },
    )
    .unwrap();
    assert!(injector.inject());
    let window = injector.frame_window().unwrap();
    (Rc::new(RefCell::new(Vec::new())), injector, window)
}

#[test]
fn widget_height_flows_to_host_iframe() {
    let (channel, mut injector, window) = setup();
    let mut emitter = FrameEmitter::new(
        WidgetFrame {
            origin: WIDGET_ORIGIN,
            height: 820.0,
            channel: Rc::clone(&channel),
        },
        TargetOrigin::parse(HOST_ORIGIN).unwrap(),
    );

    assert_eq!(emitter.on_load(), EmitOutcome::Sent);
    pump(&channel, &mut injector, window);
    assert_eq!(injector.document().heights.get(&window.0), Some(&820.0));

    // A burst of layout changes in one frame becomes one message.
    for h in [830.0, 850.0, 120.0] {
        emitter.host_mut().height = h;
        emitter.notify_size_changed();
    }
    emitter.on_frame();
    let outcomes = pump(&channel, &mut injector, window);
    assert_eq!(outcomes.len(), 1);
    // Clamped up to the configured minimum.
    assert_eq!(injector.document().heights.get(&window.0), Some(&300.0));
}

#[test]
fn duplicate_delivery_is_idempotent() {
    let (channel, mut injector, window) = setup();
    let fired = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&fired);
    injector.on_donation_complete(move |_, event| sink.borrow_mut().push(event.donation_id.clone()));

    let mut emitter = FrameEmitter::new(
        WidgetFrame {
            origin: WIDGET_ORIGIN,
            height: 500.0,
            channel: Rc::clone(&channel),
        },
        TargetOrigin::Wildcard,
    );
    emitter.on_load();
    emitter.complete(40.0, "don_42", Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap());

    // The channel duplicates everything.
    let copies: Vec<_> = channel.borrow().clone();
    channel.borrow_mut().extend(copies);

    let outcomes = pump(&channel, &mut injector, window);
    assert_eq!(outcomes.len(), 4);
    assert!(matches!(outcomes[2], ListenerOutcome::Unchanged { .. }));
    assert!(matches!(outcomes[3], ListenerOutcome::DuplicateCompletion { .. }));
    assert_eq!(*fired.borrow(), vec!["don_42".to_string()]);
}

#[test]
fn completion_from_spoofed_origin_is_discarded() {
    let (channel, mut injector, window) = setup();
    let fired = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&fired);
    injector.on_donation_complete(move |_, _| *counter.borrow_mut() += 1);

    let mut evil = FrameEmitter::new(
        WidgetFrame {
            origin: "https://evil.example",
            height: 10.0,
            channel: Rc::clone(&channel),
        },
        TargetOrigin::Wildcard,
    );
    evil.complete(1.0, "fake", Utc::now());

    let outcomes = pump(&channel, &mut injector, window);
    assert_eq!(
        outcomes,
        vec![ListenerOutcome::Ignored(ListenerIgnoredReason::OriginRejected)]
    );
    assert_eq!(*fired.borrow(), 0);
}

#[test]
fn explicit_target_for_another_host_is_never_delivered() {
    let (channel, mut injector, window) = setup();
    let mut emitter = FrameEmitter::new(
        WidgetFrame {
            origin: WIDGET_ORIGIN,
            height: 640.0,
            channel: Rc::clone(&channel),
        },
        TargetOrigin::parse("https://other-host.example").unwrap(),
    );
    emitter.on_load();
    assert!(pump(&channel, &mut injector, window).is_empty());
    assert!(injector.document().heights.is_empty());
}
