//! Process-wide multiplexing of directory watchers.

use super::watcher::{DEFAULT_DEBOUNCE, DirectoryWatcher, ReloadCallback};
use crate::error::{ConfigError, Result};
use crate::sources::ConfigFile;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};

static GLOBAL: OnceLock<std::result::Result<WatchRegistry, String>> = OnceLock::new();

/// Keeps exactly one [`DirectoryWatcher`] per directory, however many files
/// in it are tracked.
///
/// Each directory carries a reference count equal to the number of distinct
/// files registered under it. The OS-level watch is started when the first
/// file of a directory is registered and stopped when the last one is removed.
///
/// The process-wide instance is created on first use by
/// [`WatchRegistry::global`] and lives until process exit; it owns a small
/// tokio runtime for debounce timers and reload work.
///
/// # Examples
///
/// ```rust,no_run
/// use reactive_config::notify::WatchRegistry;
/// use reactive_config::sources::ConfigFile;
/// use std::sync::Arc;
///
/// # fn example() -> reactive_config::error::Result<()> {
/// let registry = WatchRegistry::global()?;
/// let file = ConfigFile::new("config/app.toml")?;
///
/// registry.watch(&file, Arc::new(|tree| println!("reloaded: {}", tree)))?;
/// assert!(registry.is_watched(&file));
///
/// registry.unwatch(&file);
/// # Ok(())
/// # }
/// ```
pub struct WatchRegistry {
    runtime: Handle,
    debounce: Duration,
    inner: Mutex<RegistryInner>,
    _owned_runtime: Option<Runtime>,
}

#[derive(Default)]
struct RegistryInner {
    watchers: HashMap<PathBuf, DirectoryWatcher>,
    ref_counts: HashMap<PathBuf, usize>,
}

impl WatchRegistry {
    /// Create a registry whose timers run on an existing runtime.
    pub fn with_handle(runtime: Handle, debounce: Duration) -> Self {
        Self {
            runtime,
            debounce,
            inner: Mutex::new(RegistryInner::default()),
            _owned_runtime: None,
        }
    }

    /// Create a registry with its own multi-threaded runtime.
    ///
    /// The runtime is dropped with the registry, which must therefore not be
    /// dropped from inside an async context.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WatchError`] if the runtime cannot be built.
    pub fn new(debounce: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("reactive-config-watch")
            .enable_time()
            .build()
            .map_err(|e| ConfigError::WatchError(format!("Failed to start watch runtime: {}", e)))?;

        Ok(Self {
            runtime: runtime.handle().clone(),
            debounce,
            inner: Mutex::new(RegistryInner::default()),
            _owned_runtime: Some(runtime),
        })
    }

    /// The process-wide registry, created with [`DEFAULT_DEBOUNCE`] on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WatchError`] if the registry could not be created.
    pub fn global() -> Result<&'static WatchRegistry> {
        Self::init_global(DEFAULT_DEBOUNCE)
    }

    /// The process-wide registry, created with `debounce` if it does not exist
    /// yet. An existing registry keeps its first debounce window.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WatchError`] if the registry could not be created.
    pub fn init_global(debounce: Duration) -> Result<&'static WatchRegistry> {
        GLOBAL
            .get_or_init(|| Self::new(debounce).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| ConfigError::WatchError(e.clone()))
    }

    /// Debounce window applied to new directory watchers.
    pub fn debounce_duration(&self) -> Duration {
        self.debounce
    }

    /// Track `file`, calling `callback` with its content after it changes.
    ///
    /// Watching a file that is already tracked replaces its callback and
    /// leaves the reference count unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WatchError`] if a new directory watch cannot be
    /// started; nothing is registered in that case.
    pub fn watch(&self, file: &ConfigFile, callback: ReloadCallback) -> Result<()> {
        let directory = file.directory();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(watcher) = inner.watchers.get(directory) {
            if watcher.add_file(file.clone(), callback) {
                *inner.ref_counts.entry(directory.to_path_buf()).or_insert(0) += 1;
            }
            return Ok(());
        }

        let watcher = DirectoryWatcher::new(directory, self.debounce, self.runtime.clone());
        watcher.add_file(file.clone(), callback);
        watcher.start()?;

        inner.watchers.insert(directory.to_path_buf(), watcher);
        inner.ref_counts.insert(directory.to_path_buf(), 1);
        tracing::debug!(file = %file, "watching configuration file");
        Ok(())
    }

    /// Stop tracking `file`. The directory watch is removed with its last file.
    ///
    /// A reload already dispatched for the file may still call its callback
    /// after this returns. Returns false if the file was not tracked.
    pub fn unwatch(&self, file: &ConfigFile) -> bool {
        self.release(file, |watcher| watcher.remove_file(file))
    }

    /// Stop tracking `file` only if `callback` is still its registered callback.
    ///
    /// Owners sharing a file use this so that releasing one registration never
    /// removes a newer one made with another callback. Returns false if the
    /// file is not tracked under `callback`.
    pub fn unwatch_callback(&self, file: &ConfigFile, callback: &ReloadCallback) -> bool {
        self.release(file, |watcher| watcher.remove_file_if(file, callback))
    }

    fn release(&self, file: &ConfigFile, remove: impl FnOnce(&DirectoryWatcher) -> bool) -> bool {
        let directory = file.directory();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let Some(watcher) = inner.watchers.get(directory) else {
            return false;
        };
        if !remove(watcher) {
            return false;
        }

        let remaining = match inner.ref_counts.get_mut(directory) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            inner.ref_counts.remove(directory);
            if let Some(watcher) = inner.watchers.remove(directory) {
                watcher.stop();
            }
        }
        tracing::debug!(file = %file, "stopped watching configuration file");
        true
    }

    /// Returns true if `file` is currently tracked.
    pub fn is_watched(&self, file: &ConfigFile) -> bool {
        self.inner
            .lock()
            .watchers
            .get(file.directory())
            .is_some_and(|watcher| watcher.is_file_watched(file))
    }

    /// Returns true if `file` is tracked with exactly `callback`.
    pub fn is_registered(&self, file: &ConfigFile, callback: &ReloadCallback) -> bool {
        self.inner
            .lock()
            .watchers
            .get(file.directory())
            .is_some_and(|watcher| watcher.has_callback(file, callback))
    }

    /// Number of files tracked under `directory`.
    pub fn ref_count(&self, directory: &Path) -> usize {
        self.inner
            .lock()
            .ref_counts
            .get(directory)
            .copied()
            .unwrap_or(0)
    }

    /// Directories with an active watch.
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.inner.lock().watchers.keys().cloned().collect()
    }

    /// Stop every directory watch and forget all registrations.
    pub fn shutdown(&self) {
        let watchers: Vec<DirectoryWatcher> = {
            let mut inner = self.inner.lock();
            inner.ref_counts.clear();
            inner.watchers.drain().map(|(_, watcher)| watcher).collect()
        };
        for watcher in &watchers {
            watcher.stop();
        }
        tracing::debug!(directories = watchers.len(), "watch registry shut down");
    }
}
