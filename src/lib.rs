//! canary — a connectivity watcher.
//!
//! A [`NetworkStateWatcher`] keeps one host subscription whose filter tracks
//! the enabled radios and fans decoded state transitions out to listeners.
//! [`CanaryService`] keeps a watcher alive for as long as its owner wants it.

pub mod config;
pub mod error;
pub mod network;
pub mod service;

pub use error::{CanaryError, CanaryResult};
pub use network::{
    FeatureSet, NetworkStateWatcher, StateChangeEvent, StateCode, StateKind, StateListener,
};
pub use service::{CanaryService, ServiceBinder};
