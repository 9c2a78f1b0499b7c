#![forbid(unsafe_code)]

use thiserror::Error;

/// Integration failures on the host side of the bridge.
///
/// These never escape [`HostInjector::inject`](crate::HostInjector::inject)
/// or [`remove`](crate::HostInjector::remove); they are logged and turned
/// into a `false` return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("invalid injector configuration: {0}")]
    InvalidConfig(String),

    #[error("target element not found: {selector}")]
    TargetNotFound { selector: String },

    #[error("widget is already injected")]
    AlreadyInjected,

    #[error("document operation failed: {0}")]
    Document(String),
}
