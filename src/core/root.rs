//! Tree roots: file binding, persistence and auto-save.

use crate::core::model::NodeKind;
use crate::core::{Model, ModelSchema};
use crate::error::{ConfigError, Result};
use crate::sources::{ConfigFile, KvTree, codec};
use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Hook receiving auto-save failures.
type SaveErrorHook = Arc<dyn Fn(&ConfigError) + Send + Sync>;

/// Bookkeeping owned by a root node. Never part of the dumped tree.
pub(crate) struct RootState {
    file: ArcSwapOption<ConfigFile>,
    auto_save: AtomicBool,
    save_lock: Mutex<()>,
    save_error_hook: RwLock<Option<SaveErrorHook>>,
    #[cfg(feature = "file-watch")]
    watched: Mutex<Option<Registration>>,
}

/// A root's own entry in the watch registry.
#[cfg(feature = "file-watch")]
struct Registration {
    file: ConfigFile,
    callback: crate::notify::ReloadCallback,
}

impl RootState {
    fn new(file: Option<ConfigFile>) -> Self {
        Self {
            file: ArcSwapOption::new(file.map(Arc::new)),
            auto_save: AtomicBool::new(false),
            save_lock: Mutex::new(()),
            save_error_hook: RwLock::new(None),
            #[cfg(feature = "file-watch")]
            watched: Mutex::new(None),
        }
    }
}

#[cfg(feature = "file-watch")]
impl Drop for RootState {
    fn drop(&mut self) {
        if let Some(registration) = self.watched.get_mut().take() {
            if let Ok(registry) = crate::notify::WatchRegistry::global() {
                registry.unwatch_callback(&registration.file, &registration.callback);
            }
        }
    }
}

/// Root of a configuration tree.
///
/// Dereferences to [`Model`] for field access and subscriptions, and adds the
/// file binding: loading, saving, auto-save on every change anywhere in the
/// tree, and (with the `file-watch` feature) reloading when the file changes
/// on disk.
///
/// # Examples
///
/// ```rust,no_run
/// use reactive_config::prelude::*;
///
/// # fn example() -> Result<()> {
/// let theme = ModelSchema::builder("Theme")
///     .field("color", FieldType::String)
///     .build();
/// let schema = ModelSchema::builder("App")
///     .field("version", FieldType::String)
///     .field("theme", FieldType::model(&theme))
///     .build();
///
/// let config = RootModel::from_file(&schema, "config.json")?;
/// config.enable_auto_save(true);
///
/// // Persisted to config.json immediately
/// config.child("theme")?.unwrap().set_field("color", "blue")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RootModel {
    model: Model,
}

impl RootModel {
    /// Build an unbound root from a key-value tree.
    ///
    /// Every nested child, including children inside lists and maps, is linked
    /// to this root during construction.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` does not match the schema.
    pub fn from_kv(schema: &Arc<ModelSchema>, raw: &KvTree) -> Result<Self> {
        let model = Model::build_root(schema, raw, RootState::new(None))?;
        Ok(Self { model })
    }

    /// Read `path` and build a root bound to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a supported configuration file,
    /// cannot be read or parsed, or does not match the schema.
    pub fn from_file(schema: &Arc<ModelSchema>, path: impl AsRef<Path>) -> Result<Self> {
        let file = ConfigFile::new(path)?;
        let raw = codec::read(file.path())?;
        let model = Model::build_root(schema, &raw, RootState::new(Some(file)))?;
        tracing::debug!(model = schema.name(), "loaded configuration from file");
        Ok(Self { model })
    }

    pub(crate) fn from_model(model: Model) -> Self {
        debug_assert!(model.is_root());
        Self { model }
    }

    fn state(&self) -> &RootState {
        match &self.model.inner.kind {
            NodeKind::Root(state) => state,
            NodeKind::Child(_) => unreachable!("RootModel always wraps a root node"),
        }
    }

    /// The underlying model handle.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The bound file, if any.
    pub fn file(&self) -> Option<ConfigFile> {
        self.state().file.load_full().map(|file| (*file).clone())
    }

    /// Bind this root to `file`.
    ///
    /// If the root is being watched, the watch moves to the new file.
    ///
    /// # Errors
    ///
    /// Returns an error only if moving an active watch fails.
    pub fn bind_file(&self, file: ConfigFile) -> Result<()> {
        self.state().file.store(Some(Arc::new(file)));

        #[cfg(feature = "file-watch")]
        if self.is_watching() {
            self.watch()?;
        }
        Ok(())
    }

    /// Enable or disable auto-save.
    ///
    /// While enabled, every field change anywhere in the tree writes the whole
    /// tree to the bound file. A failed save is logged and passed to the hook
    /// set with [`RootModel::on_save_error`]; the change itself stays applied.
    pub fn enable_auto_save(&self, enabled: bool) {
        self.state().auto_save.store(enabled, Ordering::Release);
    }

    /// Returns true if auto-save is enabled.
    pub fn is_auto_save(&self) -> bool {
        self.state().auto_save.load(Ordering::Acquire)
    }

    /// Set the hook that receives auto-save failures, replacing any previous one.
    pub fn on_save_error<F>(&self, hook: F)
    where
        F: Fn(&ConfigError) + Send + Sync + 'static,
    {
        *self.state().save_error_hook.write() = Some(Arc::new(hook));
    }

    /// Write the tree to the bound file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingFileBinding`] if no file is bound
    /// - [`ConfigError::FileWrite`] if serializing or writing fails
    pub fn save(&self) -> Result<()> {
        let file = self
            .state()
            .file
            .load_full()
            .ok_or(ConfigError::MissingFileBinding)?;
        self.save_to_file(file.path())
    }

    /// Write the tree to `path`. The binding is left unchanged.
    ///
    /// The format is chosen from the extension; the file is created if needed.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnsupportedFileType`] if the extension is not supported
    /// - [`ConfigError::FileWrite`] if serializing or writing fails
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let _guard = self.state().save_lock.lock();
        codec::write(path, &self.model.dump())
    }

    pub(crate) fn save_after_mutation(&self) {
        if !self.is_auto_save() {
            return;
        }
        if let Err(err) = self.save() {
            tracing::warn!(error = %err, "auto-save failed; in-memory change kept");
            let hook = self.state().save_error_hook.read().clone();
            if let Some(hook) = hook {
                hook(&err);
            }
        }
    }
}

#[cfg(feature = "file-watch")]
impl RootModel {
    /// Reload this tree whenever its bound file changes on disk.
    ///
    /// Uses the process-wide [`WatchRegistry`](crate::notify::WatchRegistry).
    /// Each reload applies the new content with [`Model::update_from`], so
    /// subscribers of changed fields fire and nested nodes are kept. The
    /// registration is released by [`RootModel::unwatch`] or when the last
    /// handle to the root is dropped.
    ///
    /// When several roots watch one file, the most recent call owns the
    /// registration. Releasing an older root leaves it in place.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingFileBinding`] if no file is bound
    /// - [`ConfigError::WatchError`] if the directory cannot be watched
    pub fn watch(&self) -> Result<()> {
        let file = self.file().ok_or(ConfigError::MissingFileBinding)?;
        let registry = crate::notify::WatchRegistry::global()?;

        let mut watched = self.state().watched.lock();
        if let Some(current) = watched.as_ref() {
            if current.file == file && registry.is_registered(&current.file, &current.callback) {
                return Ok(());
            }
        }
        if let Some(previous) = watched.take() {
            registry.unwatch_callback(&previous.file, &previous.callback);
        }

        let weak = Arc::downgrade(&self.model.inner);
        let callback: crate::notify::ReloadCallback = Arc::new(move |tree: KvTree| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let model = Model { inner };
            if let Err(err) = model.update_from(&tree) {
                tracing::warn!(error = %err, "reloaded configuration rejected");
            }
        });
        registry.watch(&file, Arc::clone(&callback))?;
        *watched = Some(Registration { file, callback });
        Ok(())
    }

    /// Stop reloading from the bound file.
    ///
    /// A reload already dispatched may still complete after this returns.
    /// Returns false if the root was not being watched.
    pub fn unwatch(&self) -> bool {
        let Some(registration) = self.state().watched.lock().take() else {
            return false;
        };
        match crate::notify::WatchRegistry::global() {
            Ok(registry) => registry.unwatch_callback(&registration.file, &registration.callback),
            Err(_) => false,
        }
    }

    /// Returns true if this root's own registration is live.
    ///
    /// Another root watching the same file takes the registration over, after
    /// which this returns false until [`RootModel::watch`] is called again.
    pub fn is_watching(&self) -> bool {
        let watched = self.state().watched.lock();
        let Some(registration) = watched.as_ref() else {
            return false;
        };
        crate::notify::WatchRegistry::global()
            .is_ok_and(|registry| registry.is_registered(&registration.file, &registration.callback))
    }
}

impl Deref for RootModel {
    type Target = Model;

    fn deref(&self) -> &Model {
        &self.model
    }
}

impl std::fmt::Debug for RootModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootModel")
            .field("file", &self.file())
            .field("auto_save", &self.is_auto_save())
            .field("model", &self.model)
            .finish()
    }
}
