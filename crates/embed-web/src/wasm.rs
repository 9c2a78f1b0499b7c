#![forbid(unsafe_code)]

//! `wasm-bindgen` exports for the widget frame and the host page.
//!
//! Only compiled on `wasm32` targets. All timestamps come from the caller
//! (`performance.now()` is the usual choice) so the JS side owns scheduling.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use embed_bridge::{
    BridgeError, BridgeMessage, EmbedParams, EmitOutcome, FrameHost, FrameSpec, HostDocument,
    HostInjector, InboundEnvelope, InjectorConfig, InjectorConfigPatch, InsertPosition,
    TargetOrigin, WindowId,
};
use embed_core::{Cadence, EmbedConfig, Epoch};
use js_sys::{Object, Reflect};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, HtmlIFrameElement, MessageEvent, Window};

use super::widget_core::{TickOutput, WidgetCore};

fn console_error(msg: &str) {
    let global = js_sys::global();
    let Ok(console) = Reflect::get(&global, &"console".into()) else {
        return;
    };
    let Ok(error) = Reflect::get(&console, &"error".into()) else {
        return;
    };
    let Ok(error_fn) = error.dyn_into::<js_sys::Function>() else {
        return;
    };
    let _ = error_fn.call1(&console, &JsValue::from_str(msg));
}

fn install_panic_hook() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = if let Some(loc) = info.location() {
                format!(
                    "panic at {}:{}:{}: {info}",
                    loc.file(),
                    loc.line(),
                    loc.column()
                )
            } else {
                format!("panic: {info}")
            };
            console_error(&msg);
        }));
    });
}

fn set_js(obj: &Object, key: &str, value: JsValue) {
    let _ = Reflect::set(obj, &JsValue::from_str(key), &value);
}

fn js_error(msg: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&msg.to_string())
}

fn now_from_ms(now_ms: f64) -> Duration {
    if now_ms.is_finite() && now_ms > 0.0 {
        Duration::from_secs_f64(now_ms / 1_000.0)
    } else {
        Duration::ZERO
    }
}

fn browser_window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| js_error("no global window"))
}

fn json_to_js(value: &serde_json::Value) -> JsValue {
    js_sys::JSON::parse(&value.to_string()).unwrap_or(JsValue::NULL)
}

fn js_to_json(value: &JsValue) -> Option<serde_json::Value> {
    let text: String = js_sys::JSON::stringify(value).ok()?.into();
    serde_json::from_str(&text).ok()
}

// ---------------------------------------------------------------------------
// Widget frame
// ---------------------------------------------------------------------------

/// The widget's own window, seen as a [`FrameHost`].
struct BrowserFrame {
    window: Window,
}

impl FrameHost for BrowserFrame {
    fn is_embedded(&self) -> bool {
        match self.window.top() {
            Ok(Some(top)) => !Object::is(&top, &self.window),
            Ok(None) => false,
            // Access to `top` denied: we are certainly framed.
            Err(_) => true,
        }
    }

    fn content_height(&self) -> f64 {
        let Some(document) = self.window.document() else {
            return 0.0;
        };
        let body = document.body().map_or(0, |b| b.scroll_height());
        let root = document.document_element().map_or(0, |e| e.scroll_height());
        f64::from(body.max(root))
    }

    fn post_to_parent(&mut self, message: &BridgeMessage, target: &TargetOrigin) {
        let Ok(Some(parent)) = self.window.parent() else {
            return;
        };
        if let Err(err) = parent.post_message(&json_to_js(&message.to_value()), target.as_str()) {
            tracing::warn!(
                target: "embed.bridge",
                kind = message.kind(),
                error = ?err,
                "postMessage failed"
            );
        }
    }
}

fn tick_to_js(out: &TickOutput, core: &WidgetCore<BrowserFrame>) -> JsValue {
    let obj = Object::new();
    let fetch = match &out.fetch {
        Some(fetch) => {
            let f = Object::new();
            set_js(&f, "epoch", JsValue::from_f64(fetch.epoch.get() as f64));
            set_js(&f, "url", JsValue::from_str(&fetch.url));
            f.into()
        }
        None => JsValue::NULL,
    };
    set_js(&obj, "fetch", fetch);
    set_js(&obj, "statementChanged", JsValue::from_bool(out.statement_changed));
    set_js(&obj, "resized", JsValue::from_bool(out.resize == EmitOutcome::Sent));
    set_js(&obj, "loading", JsValue::from_bool(core.is_loading()));
    set_js(
        &obj,
        "nextDeadlineMs",
        core.next_deadline()
            .map_or(JsValue::NULL, |d| JsValue::from_f64(d.as_secs_f64() * 1_000.0)),
    );
    obj.into()
}

/// Widget-side runtime: amount input, statement resolution and size reports.
#[wasm_bindgen]
pub struct EmbedWidget {
    inner: WidgetCore<BrowserFrame>,
}

#[wasm_bindgen(start)]
pub fn wasm_start() {
    install_panic_hook();
}

#[wasm_bindgen]
impl EmbedWidget {
    /// `config_json` is an optional [`EmbedConfig`] document; `target_origin`
    /// is the host origin messages are addressed to (`"*"` for any).
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: Option<String>,
        target_origin: &str,
    ) -> Result<EmbedWidget, JsValue> {
        install_panic_hook();
        let config = match config_json.as_deref() {
            Some(json) => EmbedConfig::from_json_str(json).map_err(js_error)?,
            None => EmbedConfig::default(),
        };
        let pipeline = config.pipeline().map_err(js_error)?;
        let target = TargetOrigin::parse(target_origin)
            .ok_or_else(|| js_error(format!("invalid target origin: {target_origin}")))?;
        let window = browser_window()?;
        let search = window.location().search().unwrap_or_default();
        let params = EmbedParams::from_query(&search);
        Ok(Self {
            inner: WidgetCore::new(pipeline, BrowserFrame { window }, target, params),
        })
    }

    /// Amount seeded from the embed URL, if any.
    #[wasm_bindgen(getter, js_name = initialAmount)]
    pub fn initial_amount(&self) -> Option<f64> {
        self.inner.params().amount_f64()
    }

    #[wasm_bindgen(getter)]
    pub fn cadence(&self) -> String {
        self.inner.cadence().as_str().to_string()
    }

    #[wasm_bindgen(js_name = onLoad)]
    pub fn on_load(&mut self, now_ms: f64) -> bool {
        self.inner.on_load(now_from_ms(now_ms)) == EmitOutcome::Sent
    }

    /// Returns `false` if the amount was rejected and the statement cleared.
    #[wasm_bindgen(js_name = setAmount)]
    pub fn set_amount(&mut self, raw: f64, now_ms: f64) -> bool {
        self.inner.set_amount(raw, now_from_ms(now_ms)).is_ok()
    }

    /// `cadence` is `"one-time"` or `"monthly"`.
    #[wasm_bindgen(js_name = setCadence)]
    pub fn set_cadence(&mut self, cadence: &str, now_ms: f64) -> bool {
        match cadence.parse::<Cadence>() {
            Ok(cadence) => {
                self.inner.set_cadence(cadence, now_from_ms(now_ms));
                true
            }
            Err(_) => false,
        }
    }

    /// Drive timers. Call from `requestAnimationFrame` or a timer scheduled
    /// for `nextDeadlineMs`.
    pub fn tick(&mut self, now_ms: f64) -> JsValue {
        let out = self.inner.tick(now_from_ms(now_ms));
        tick_to_js(&out, &self.inner)
    }

    #[wasm_bindgen(js_name = completeFetch)]
    pub fn complete_fetch(&mut self, epoch: f64, status: u16, body: &str) -> bool {
        self.inner.complete_fetch(Epoch::new(epoch as u64), status, body)
    }

    #[wasm_bindgen(js_name = failFetch)]
    pub fn fail_fetch(&mut self, epoch: f64, message: &str) -> bool {
        self.inner.fail_fetch(Epoch::new(epoch as u64), message)
    }

    #[wasm_bindgen(js_name = notifySizeChanged)]
    pub fn notify_size_changed(&mut self) {
        self.inner.notify_size_changed();
    }

    /// Report a finished donation to the host page. Sent at most once.
    #[wasm_bindgen(js_name = completeDonation)]
    pub fn complete_donation(&mut self, amount: f64, donation_id: &str) -> bool {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(js_sys::Date::now() as i64)
            .unwrap_or_default();
        self.inner.complete_donation(amount, donation_id, timestamp) == EmitOutcome::Sent
    }

    /// Current statement text, or `undefined` when nothing is shown.
    pub fn statement(&self) -> Option<String> {
        self.inner.statement().map(|s| s.text.clone())
    }

    #[wasm_bindgen(getter, js_name = isFallback)]
    pub fn is_fallback(&self) -> bool {
        self.inner.statement().is_some_and(|s| s.is_fallback)
    }

    #[wasm_bindgen(getter)]
    pub fn loading(&self) -> bool {
        self.inner.is_loading()
    }
}

// ---------------------------------------------------------------------------
// Host page
// ---------------------------------------------------------------------------

/// The host page's DOM, seen as a [`HostDocument`].
struct DomDocument {
    window: Window,
    document: Document,
    frames: Vec<(WindowId, HtmlIFrameElement)>,
    next_id: u64,
}

impl DomDocument {
    fn new(window: Window) -> Result<Self, JsValue> {
        let document = window.document().ok_or_else(|| js_error("no document"))?;
        Ok(Self {
            window,
            document,
            frames: Vec::new(),
            next_id: 0,
        })
    }

    fn frame(&self, id: WindowId) -> Option<&HtmlIFrameElement> {
        self.frames.iter().find(|(w, _)| *w == id).map(|(_, f)| f)
    }

    /// Map a `MessageEvent.source` to a managed frame.
    fn window_for_source(&self, source: &Object) -> Option<WindowId> {
        self.frames.iter().find_map(|(id, frame)| {
            let content = frame.content_window()?;
            Object::is(&content, source).then_some(*id)
        })
    }
}

impl HostDocument for DomDocument {
    fn has_element(&self, selector: &str) -> bool {
        matches!(self.document.query_selector(selector), Ok(Some(_)))
    }

    fn create_frame(&mut self, spec: &FrameSpec) -> Result<WindowId, BridgeError> {
        let frame = self
            .document
            .create_element("iframe")
            .map_err(|e| BridgeError::Document(format!("{e:?}")))?
            .dyn_into::<HtmlIFrameElement>()
            .map_err(|_| BridgeError::Document("created element is not an iframe".into()))?;
        frame.set_id(&spec.element_id);
        frame.set_src(&spec.src);
        frame.set_title(&spec.title);
        let _ = frame.set_attribute("scrolling", "no");
        let style = frame.style();
        let _ = style.set_property("width", "100%");
        let _ = style.set_property("border", "none");
        let _ = style.set_property("overflow", "hidden");
        let _ = style.set_property("min-height", &format!("{}px", spec.min_height));
        self.next_id += 1;
        let id = WindowId(self.next_id);
        self.frames.push((id, frame));
        Ok(id)
    }

    fn attach_frame(
        &mut self,
        frame: WindowId,
        selector: &str,
        position: InsertPosition,
    ) -> Result<(), BridgeError> {
        let target = match self.document.query_selector(selector) {
            Ok(Some(el)) => el,
            _ => {
                return Err(BridgeError::TargetNotFound {
                    selector: selector.to_string(),
                });
            }
        };
        let element = self
            .frame(frame)
            .ok_or_else(|| BridgeError::Document("unknown frame".into()))?;
        target
            .insert_adjacent_element(position.as_str(), element)
            .map(|_| ())
            .map_err(|e| BridgeError::Document(format!("{e:?}")))
    }

    fn remove_frame(&mut self, frame: WindowId) -> bool {
        let Some(idx) = self.frames.iter().position(|(w, _)| *w == frame) else {
            return false;
        };
        let (_, element) = self.frames.swap_remove(idx);
        element.remove();
        true
    }

    fn set_frame_height(&mut self, frame: WindowId, height: f64) {
        if let Some(element) = self.frame(frame) {
            let _ = element.style().set_property("height", &format!("{height}px"));
        }
    }

    fn viewport_height(&self) -> f64 {
        self.window
            .inner_height()
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }
}

type MessageClosure = Closure<dyn FnMut(MessageEvent)>;

/// Host-page runtime: iframe injection plus the `message` listener.
///
/// Completion callbacks run while the injector is borrowed; calling back
/// into this object from inside one returns `false` instead of re-entering.
#[wasm_bindgen]
pub struct EmbedHost {
    inner: Rc<RefCell<HostInjector<DomDocument>>>,
    window: Window,
    on_message: Option<MessageClosure>,
}

#[wasm_bindgen]
impl EmbedHost {
    /// `config_json` is an [`InjectorConfig`] object (camelCase keys).
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<EmbedHost, JsValue> {
        install_panic_hook();
        let config: InjectorConfig = serde_json::from_str(config_json).map_err(js_error)?;
        let window = browser_window()?;
        let document = DomDocument::new(window.clone())?;
        let injector = HostInjector::new(document, config).map_err(js_error)?;
        Ok(Self {
            inner: Rc::new(RefCell::new(injector)),
            window,
            on_message: None,
        })
    }

    /// Start listening for `message` events. Idempotent.
    pub fn start(&mut self) -> Result<(), JsValue> {
        if self.on_message.is_some() {
            return Ok(());
        }
        let inner = Rc::clone(&self.inner);
        let closure = MessageClosure::new(move |event: MessageEvent| {
            let Ok(mut injector) = inner.try_borrow_mut() else {
                return;
            };
            let Some(data) = js_to_json(&event.data()) else {
                return;
            };
            let source = event
                .source()
                .and_then(|s| injector.document().window_for_source(&s));
            let origin = event.origin();
            injector.handle_message(&InboundEnvelope {
                origin: &origin,
                source,
                data: &data,
            });
        });
        self.window
            .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())?;
        self.on_message = Some(closure);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(closure) = self.on_message.take() {
            let _ = self
                .window
                .remove_event_listener_with_callback("message", closure.as_ref().unchecked_ref());
        }
    }

    pub fn inject(&self) -> bool {
        self.inner
            .try_borrow_mut()
            .is_ok_and(|mut injector| injector.inject())
    }

    pub fn remove(&self) -> bool {
        self.inner
            .try_borrow_mut()
            .is_ok_and(|mut injector| injector.remove())
    }

    /// Merge a partial config and reinject if mounted.
    #[wasm_bindgen(js_name = updateConfig)]
    pub fn update_config(&self, patch_json: &str) -> bool {
        let patch: InjectorConfigPatch = match serde_json::from_str(patch_json) {
            Ok(patch) => patch,
            Err(err) => {
                console_error(&format!("invalid config patch: {err}"));
                return false;
            }
        };
        self.inner
            .try_borrow_mut()
            .is_ok_and(|mut injector| injector.update_config(&patch))
    }

    #[wasm_bindgen(getter, js_name = isInjected)]
    pub fn is_injected(&self) -> bool {
        self.inner.try_borrow().is_ok_and(|i| i.is_injected())
    }

    /// Register `callback({ amount, donationId, timestamp })`.
    #[wasm_bindgen(js_name = onDonationComplete)]
    pub fn on_donation_complete(&self, callback: js_sys::Function) -> bool {
        let Ok(mut injector) = self.inner.try_borrow_mut() else {
            return false;
        };
        injector.on_donation_complete(move |_, event| {
            let payload = serde_json::to_value(event).map_or(JsValue::NULL, |v| json_to_js(&v));
            if let Err(err) = callback.call1(&JsValue::NULL, &payload) {
                console_error(&format!("donation-complete callback threw: {err:?}"));
            }
        });
        true
    }
}

impl Drop for EmbedHost {
    fn drop(&mut self) {
        self.stop();
    }
}
