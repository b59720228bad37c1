//! # reactive-config
//!
//! Reactive configuration trees backed by JSON, YAML or TOML files.
//!
//! ## Overview
//!
//! `reactive-config` loads a configuration file into a tree of typed models and
//! keeps the tree, its observers and the file in step:
//! - Per-field subscriptions on every node, fired on real value changes
//! - A single root per tree that owns the file binding
//! - Auto-save of the whole tree when any node changes
//! - Debounced reloads when the file is edited on disk
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reactive_config::prelude::*;
//!
//! # fn example() -> Result<()> {
//! let theme = ModelSchema::builder("Theme")
//!     .field("color", FieldType::String)
//!     .field_with_default("font_size", FieldType::Integer, 12)
//!     .build();
//! let schema = ModelSchema::builder("App")
//!     .field("name", FieldType::String)
//!     .field("theme", FieldType::model(&theme))
//!     .build();
//!
//! let config = RootModel::from_file(&schema, "config/app.yaml")?;
//!
//! let theme = config.child("theme")?.expect("theme is set");
//! theme.on_change("color", |value| println!("color is now {:?}", value))?;
//!
//! // Fires the subscriber, then persists the whole tree
//! config.enable_auto_save(true);
//! theme.set_field("color", "dark")?;
//!
//! // Pick up edits made by other programs
//! config.watch()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `file-watch` (default): debounced reload on file changes, using `notify` and `tokio`
//! - `yaml` (default): `.yaml` support
//! - `toml` (default): `.toml` support
//! - `all-formats`: both optional formats
//!
//! JSON is always available.

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod sources;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{Constraint, FieldType, Model, ModelSchema, RootModel, Value};
    pub use crate::error::{ConfigError, Result, ValidationError};
    pub use crate::notify::Callback;
    pub use crate::sources::{ConfigFile, KvTree};

    #[cfg(feature = "file-watch")]
    pub use crate::notify::WatchRegistry;
}
