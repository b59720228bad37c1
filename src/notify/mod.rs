//! Change notification: field subscribers and file watching.
//!
//! Subscriber bookkeeping is always available. Debounced directory watching
//! and the process-wide watch registry require the `file-watch` feature.

pub mod subscriber;

#[cfg(feature = "file-watch")]
pub mod registry;
#[cfg(feature = "file-watch")]
pub mod watcher;

pub use subscriber::{Callback, SubscriptionRegistry};

#[cfg(feature = "file-watch")]
pub use registry::WatchRegistry;
#[cfg(feature = "file-watch")]
pub use watcher::{DEFAULT_DEBOUNCE, DirectoryWatcher, ReloadCallback};
