#![forbid(unsafe_code)]

//! Cross-frame bridge between the embedded widget and its host page.
//!
//! # Roles
//!
//! - [`FrameEmitter`] runs inside the widget frame. It reports content height
//!   (coalesced to one message per frame) and a single completion event.
//! - [`FrameBridgeListener`] runs on the host page. It checks the sender
//!   origin, matches messages to managed frames by source window and applies
//!   heights or fans out completion callbacks.
//! - [`HostInjector`] creates the iframe on the host page and owns a listener
//!   scoped to it.
//!
//! Browser access sits behind the [`FrameHost`] and [`HostDocument`] traits,
//! so everything here runs natively under test.

pub mod embed_url;
pub mod emitter;
pub mod error;
pub mod injector;
pub mod listener;
pub mod message;
pub mod origin;

pub use embed_url::EmbedParams;
pub use emitter::{EmitOutcome, EmitterStats, FrameEmitter, FrameHost, PollingSizeWatcher};
pub use error::BridgeError;
pub use injector::{
    FrameSpec, HostDocument, HostInjector, InjectorConfig, InjectorConfigPatch, InsertPosition,
};
pub use listener::{
    CallbackId, FrameBridgeListener, FrameId, InboundEnvelope, ListenerConfig,
    ListenerIgnoredReason, ListenerOutcome, MaxHeight, WindowId,
};
pub use message::{BridgeMessage, Decoded, DonationComplete};
pub use origin::{OriginPolicy, TargetOrigin, normalize_origin};
