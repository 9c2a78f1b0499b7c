#![forbid(unsafe_code)]

//! Browser bindings for the embeddable impact widget.
//!
//! Two `wasm-bindgen` classes are exported:
//!
//! - `EmbedWidget` runs inside the widget iframe. It debounces amount input,
//!   resolves impact statements (locally or through a host-performed fetch)
//!   and reports content height to the parent page.
//! - `EmbedHost` runs on the host page. It injects the iframe, listens for
//!   `message` events and resizes the frame.
//!
//! The JS side drives time: every method that can start or expire a timer
//! takes a millisecond timestamp, and `tick` reports the next deadline.

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::{EmbedHost, EmbedWidget};

// Widget core is used by the wasm module and by native tests.
#[cfg(any(target_arch = "wasm32", test))]
mod widget_core;
