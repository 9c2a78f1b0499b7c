#![forbid(unsafe_code)]

//! Host-page injector: creates the widget iframe and owns its listener.
//!
//! Document access goes through [`HostDocument`]. The injector registers the
//! new frame with its [`FrameBridgeListener`] before attaching it, so a
//! resize posted the moment the widget loads is never missed.
//!
//! Integration failures (missing target element, document errors) are
//! logged and reported as `false`; nothing here panics or propagates into
//! the host page.

use serde::{Deserialize, Deserializer, Serialize};

use embed_core::{Cadence, query};

use crate::embed_url::EmbedParams;
use crate::error::BridgeError;
use crate::listener::{
    CallbackId, FrameBridgeListener, FrameId, InboundEnvelope, ListenerConfig, ListenerOutcome,
    MaxHeight, WindowId,
};
use crate::message::DonationComplete;
use crate::origin::{OriginPolicy, normalize_origin};

/// `id` attribute given to the injected iframe.
pub const FRAME_ELEMENT_ID: &str = "impact-embed-frame";

const FRAME_TITLE: &str = "Donation widget";

/// Where the iframe goes relative to the selector's element
/// (the `insertAdjacentElement` positions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    BeforeBegin,
    AfterBegin,
    #[default]
    BeforeEnd,
    AfterEnd,
}

impl InsertPosition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeBegin => "beforebegin",
            Self::AfterBegin => "afterbegin",
            Self::BeforeEnd => "beforeend",
            Self::AfterEnd => "afterend",
        }
    }
}

/// Host configuration surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InjectorConfig {
    /// CSS selector of the injection point. Required.
    pub selector: String,
    pub position: InsertPosition,
    /// Pre-filled amount.
    pub amount: Option<u32>,
    /// Pre-filled cadence.
    #[serde(rename = "type")]
    pub cadence: Option<Cadence>,
    /// Apply `widget-resize` heights to the iframe.
    pub auto_resize: bool,
    /// Minimum iframe height in CSS pixels.
    pub min_height: f64,
    /// Clamp heights to this fraction of the viewport (modal presentation).
    pub max_viewport_fraction: Option<f64>,
    /// Embed page URL, without query.
    pub widget_url: String,
    /// Origin to accept messages from. Defaults to the origin of `widget_url`.
    pub expected_origin: Option<String>,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            selector: String::new(),
            position: InsertPosition::BeforeEnd,
            amount: None,
            cadence: None,
            auto_resize: true,
            min_height: 600.0,
            max_viewport_fraction: None,
            widget_url: String::new(),
            expected_origin: None,
        }
    }
}

impl InjectorConfig {
    #[must_use]
    pub fn new(widget_url: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            widget_url: widget_url.into(),
            selector: selector.into(),
            ..Self::default()
        }
    }

    /// Origin messages must come from.
    #[must_use]
    pub fn message_origin(&self) -> Option<String> {
        self.expected_origin
            .as_deref()
            .map_or_else(|| normalize_origin(&self.widget_url), normalize_origin)
    }

    /// iframe `src`: the widget URL plus `amount`/`type` seeds.
    pub fn frame_src(&self) -> Result<String, BridgeError> {
        EmbedParams::new(self.amount, self.cadence)
            .apply_to(&self.widget_url)
            .map_err(|err| BridgeError::InvalidConfig(format!("widgetUrl: {err}")))
    }

    /// Problems that make the configuration unusable. Empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.selector.trim().is_empty() {
            errors.push("selector is required".to_string());
        }
        if self.widget_url.trim().is_empty() {
            errors.push("widgetUrl is required".to_string());
        } else if let Err(err) = query::parse_reference(&self.widget_url) {
            errors.push(format!("widgetUrl is not a valid URL: {err}"));
        }
        if self.message_origin().is_none() {
            errors.push(format!(
                "cannot determine the widget origin from {:?}; set expectedOrigin",
                self.expected_origin.as_deref().unwrap_or(&self.widget_url)
            ));
        }
        if !self.min_height.is_finite() || self.min_height < 0.0 {
            errors.push(format!("minHeight must be >= 0, got {}", self.min_height));
        }
        if let Some(fraction) = self.max_viewport_fraction
            && !(fraction > 0.0 && fraction <= 1.0)
        {
            errors.push(format!("maxViewportFraction must be in (0, 1], got {fraction}"));
        }
        errors
    }

    fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            policy: OriginPolicy::exact(self.message_origin()),
            min_height: self.min_height,
            max_height: self.max_viewport_fraction.map(MaxHeight::ViewportFraction),
        }
    }

    fn merged(&self, patch: &InjectorConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(selector) = &patch.selector {
            next.selector.clone_from(selector);
        }
        if let Some(position) = patch.position {
            next.position = position;
        }
        if let Some(amount) = patch.amount {
            next.amount = amount;
        }
        if let Some(cadence) = patch.cadence {
            next.cadence = cadence;
        }
        if let Some(auto_resize) = patch.auto_resize {
            next.auto_resize = auto_resize;
        }
        if let Some(min_height) = patch.min_height {
            next.min_height = min_height;
        }
        if let Some(fraction) = patch.max_viewport_fraction {
            next.max_viewport_fraction = fraction;
        }
        if let Some(url) = &patch.widget_url {
            next.widget_url.clone_from(url);
        }
        if let Some(origin) = &patch.expected_origin {
            next.expected_origin.clone_from(origin);
        }
        next
    }
}

/// Partial update for [`HostInjector::update_config`].
///
/// Absent fields keep their value. For optional settings an explicit `null`
/// clears the value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InjectorConfigPatch {
    pub selector: Option<String>,
    pub position: Option<InsertPosition>,
    #[serde(deserialize_with = "present")]
    pub amount: Option<Option<u32>>,
    #[serde(rename = "type", deserialize_with = "present")]
    pub cadence: Option<Option<Cadence>>,
    pub auto_resize: Option<bool>,
    pub min_height: Option<f64>,
    #[serde(deserialize_with = "present")]
    pub max_viewport_fraction: Option<Option<f64>>,
    pub widget_url: Option<String>,
    #[serde(deserialize_with = "present")]
    pub expected_origin: Option<Option<String>>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent key (`None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// What the injector asks the document to build.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSpec {
    pub element_id: String,
    pub src: String,
    pub title: String,
    pub min_height: f64,
}

/// Host page document operations.
pub trait HostDocument {
    /// Whether `selector` matches an element.
    fn has_element(&self, selector: &str) -> bool;

    /// Build a detached iframe and return the identity its content window
    /// will be reported under.
    fn create_frame(&mut self, spec: &FrameSpec) -> Result<WindowId, BridgeError>;

    /// Insert a created frame relative to the element matching `selector`.
    fn attach_frame(
        &mut self,
        frame: WindowId,
        selector: &str,
        position: InsertPosition,
    ) -> Result<(), BridgeError>;

    /// Detach and drop a frame. Returns `false` if it was not present.
    fn remove_frame(&mut self, frame: WindowId) -> bool;

    fn set_frame_height(&mut self, frame: WindowId, height: f64);

    /// Host viewport height, for viewport-relative clamping.
    fn viewport_height(&self) -> f64 {
        0.0
    }
}

#[derive(Debug, Clone)]
struct Mounted {
    frame: FrameId,
    window: WindowId,
    src: String,
}

/// Injects, removes and reconfigures the widget iframe on a host page.
#[derive(Debug)]
pub struct HostInjector<D> {
    document: D,
    config: InjectorConfig,
    listener: FrameBridgeListener,
    mounted: Option<Mounted>,
}

impl<D: HostDocument> HostInjector<D> {
    /// Validate `config` and build an injector. Nothing is injected yet.
    pub fn new(document: D, config: InjectorConfig) -> Result<Self, BridgeError> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(BridgeError::InvalidConfig(errors.join("; ")));
        }
        let listener = FrameBridgeListener::new(config.listener_config());
        Ok(Self {
            document,
            config,
            listener,
            mounted: None,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &InjectorConfig {
        &self.config
    }

    #[must_use]
    pub const fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    #[must_use]
    pub const fn listener(&self) -> &FrameBridgeListener {
        &self.listener
    }

    #[must_use]
    pub const fn is_injected(&self) -> bool {
        self.mounted.is_some()
    }

    /// Window identity of the injected frame.
    #[must_use]
    pub fn frame_window(&self) -> Option<WindowId> {
        self.mounted.as_ref().map(|m| m.window)
    }

    /// `src` of the injected frame.
    #[must_use]
    pub fn frame_src(&self) -> Option<&str> {
        self.mounted.as_ref().map(|m| m.src.as_str())
    }

    /// Create and attach the iframe. Returns `false` (and logs) on failure.
    pub fn inject(&mut self) -> bool {
        match self.try_inject() {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    target: "embed.injector",
                    selector = %self.config.selector,
                    error = %err,
                    "widget injection failed"
                );
                false
            }
        }
    }

    fn try_inject(&mut self) -> Result<(), BridgeError> {
        if self.mounted.is_some() {
            return Err(BridgeError::AlreadyInjected);
        }
        if !self.document.has_element(&self.config.selector) {
            return Err(BridgeError::TargetNotFound {
                selector: self.config.selector.clone(),
            });
        }
        let src = self.config.frame_src()?;
        let window = self.document.create_frame(&FrameSpec {
            element_id: FRAME_ELEMENT_ID.into(),
            src: src.clone(),
            title: FRAME_TITLE.into(),
            min_height: self.config.min_height,
        })?;
        let frame = self.listener.register_frame(window);
        if let Err(err) =
            self.document
                .attach_frame(window, &self.config.selector, self.config.position)
        {
            self.listener.unregister_frame(frame);
            self.document.remove_frame(window);
            return Err(err);
        }
        tracing::info!(
            target: "embed.injector",
            selector = %self.config.selector,
            position = self.config.position.as_str(),
            src = %src,
            "widget injected"
        );
        self.mounted = Some(Mounted { frame, window, src });
        Ok(())
    }

    /// Detach the iframe. Returns `false` if nothing was injected.
    pub fn remove(&mut self) -> bool {
        let Some(mounted) = self.mounted.take() else {
            return false;
        };
        self.listener.unregister_frame(mounted.frame);
        if !self.document.remove_frame(mounted.window) {
            tracing::warn!(
                target: "embed.injector",
                "widget frame was already gone from the document"
            );
        }
        tracing::info!(target: "embed.injector", "widget removed");
        true
    }

    /// Merge `patch` into the configuration. An injected widget is removed
    /// and injected again with the new settings.
    ///
    /// Returns `false` if the merged configuration is invalid (the old one is
    /// kept) or re-injection failed.
    pub fn update_config(&mut self, patch: &InjectorConfigPatch) -> bool {
        let next = self.config.merged(patch);
        let errors = next.validate();
        if !errors.is_empty() {
            tracing::error!(
                target: "embed.injector",
                errors = %errors.join("; "),
                "configuration update rejected"
            );
            return false;
        }
        let next_listener = next.listener_config();
        self.listener.set_policy(next_listener.policy);
        self.listener.set_min_height(next_listener.min_height);
        self.listener.set_max_height(next_listener.max_height);
        self.config = next;

        if self.remove() {
            self.inject()
        } else {
            true
        }
    }

    /// Subscribe to completion events from the injected widget.
    pub fn on_donation_complete<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut(FrameId, &DonationComplete) + 'static,
    {
        self.listener.on_donation_complete(callback)
    }

    /// Feed one host `message` event.
    pub fn handle_message(&mut self, envelope: &InboundEnvelope<'_>) -> ListenerOutcome {
        self.listener
            .set_viewport_height(self.document.viewport_height());
        let outcome = self.listener.handle(envelope);
        if let ListenerOutcome::SetHeight { frame, height } = outcome
            && self.config.auto_resize
            && let Some(mounted) = self.mounted.as_ref().filter(|m| m.frame == frame)
        {
            self.document.set_frame_height(mounted.window, height);
        }
        outcome
    }
}
