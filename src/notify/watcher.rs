//! Debounced per-directory file watching.

use crate::error::{ConfigError, Result};
use crate::sources::{ConfigFile, FileFormat, KvTree, codec};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Quiet period after the first buffered event before a batch is processed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Callback receiving a reloaded file's content.
pub type ReloadCallback = Arc<dyn Fn(KvTree) + Send + Sync>;

/// Watches one directory and coalesces bursts of change events.
///
/// The first event for a supported file arms a single timer; events arriving
/// while it runs only join the pending set. When the timer fires, the pending
/// set is swapped out under the lock and each distinct registered file in it
/// is read once and handed to its callback, outside the lock. A read or
/// callback failure for one file does not affect the others.
///
/// # Examples
///
/// ```rust,no_run
/// use reactive_config::notify::DirectoryWatcher;
/// use reactive_config::sources::ConfigFile;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let file = ConfigFile::new("/path/to/config.yaml")?;
/// let watcher = DirectoryWatcher::new(
///     file.directory(),
///     Duration::from_millis(500),
///     tokio::runtime::Handle::current(),
/// );
/// watcher.add_file(file, Arc::new(|tree| println!("reloaded: {}", tree)));
/// watcher.start()?;
/// # Ok(())
/// # }
/// ```
pub struct DirectoryWatcher {
    directory: PathBuf,
    shared: Arc<Shared>,
    os_watcher: Mutex<Option<RecommendedWatcher>>,
}

struct Shared {
    debounce: Duration,
    runtime: Handle,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    pending: HashSet<PathBuf>,
    timer: Option<JoinHandle<()>>,
    files: HashMap<ConfigFile, ReloadCallback>,
}

impl DirectoryWatcher {
    /// Create an idle watcher for `directory`. Timers run on `runtime`.
    ///
    /// No OS-level watch exists until [`DirectoryWatcher::start`].
    pub fn new(directory: impl Into<PathBuf>, debounce: Duration, runtime: Handle) -> Self {
        Self {
            directory: directory.into(),
            shared: Arc::new(Shared {
                debounce,
                runtime,
                state: Mutex::new(State::default()),
            }),
            os_watcher: Mutex::new(None),
        }
    }

    /// The watched directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Get the debounce duration for this watcher.
    pub fn debounce_duration(&self) -> Duration {
        self.shared.debounce
    }

    /// Register `file` with its reload callback.
    ///
    /// Returns true if the file was not registered before. Registering it
    /// again replaces the callback.
    pub fn add_file(&self, file: ConfigFile, callback: ReloadCallback) -> bool {
        self.shared.state.lock().files.insert(file, callback).is_none()
    }

    /// Remove `file`. Returns false if it was not registered.
    pub fn remove_file(&self, file: &ConfigFile) -> bool {
        self.shared.state.lock().files.remove(file).is_some()
    }

    /// Remove `file` only while `callback` is its registered callback.
    ///
    /// Returns false if the file is not registered or was registered again
    /// with another callback since.
    pub fn remove_file_if(&self, file: &ConfigFile, callback: &ReloadCallback) -> bool {
        let mut state = self.shared.state.lock();
        match state.files.get(file) {
            Some(current) if Arc::ptr_eq(current, callback) => {
                state.files.remove(file);
                true
            }
            _ => false,
        }
    }

    /// Returns true if `file` is registered.
    pub fn is_file_watched(&self, file: &ConfigFile) -> bool {
        self.shared.state.lock().files.contains_key(file)
    }

    /// Returns true if `file` is registered with exactly `callback`.
    pub fn has_callback(&self, file: &ConfigFile, callback: &ReloadCallback) -> bool {
        self.shared
            .state
            .lock()
            .files
            .get(file)
            .is_some_and(|current| Arc::ptr_eq(current, callback))
    }

    /// Registered files.
    pub fn watched_files(&self) -> Vec<ConfigFile> {
        self.shared.state.lock().files.keys().cloned().collect()
    }

    /// Returns true while a debounce timer is armed.
    pub fn is_pending(&self) -> bool {
        self.shared.state.lock().timer_alive()
    }

    /// Start the OS-level, non-recursive watch on the directory.
    ///
    /// Calling it on a running watcher does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WatchError`] if the watch cannot be established.
    pub fn start(&self) -> Result<()> {
        let mut os_watcher = self.os_watcher.lock();
        if os_watcher.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            shared.handle_event(res);
        })
        .map_err(|e| ConfigError::WatchError(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&self.directory, RecursiveMode::NonRecursive)
            .map_err(|e| {
                ConfigError::WatchError(format!(
                    "Failed to watch {}: {}",
                    self.directory.display(),
                    e
                ))
            })?;

        tracing::debug!(directory = %self.directory.display(), "started directory watch");
        *os_watcher = Some(watcher);
        Ok(())
    }

    /// Stop the OS-level watch and drop any pending events.
    ///
    /// A batch whose reload work has already started still completes.
    pub fn stop(&self) {
        if self.os_watcher.lock().take().is_some() {
            tracing::debug!(directory = %self.directory.display(), "stopped directory watch");
        }
        let mut state = self.shared.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.pending.clear();
    }

    /// Returns true while the OS-level watch is active.
    pub fn is_running(&self) -> bool {
        self.os_watcher.lock().is_some()
    }

    /// Feed one raw change for `path` into the debouncer.
    ///
    /// OS events arrive here; it is public so changes observed by other means
    /// can be injected. Paths without a supported extension and directories
    /// are ignored.
    pub fn record_change(&self, path: &Path) {
        self.shared.record_change(path);
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl State {
    fn timer_alive(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

impl Shared {
    fn handle_event(self: &Arc<Self>, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "file watcher reported an error");
                return;
            }
        };
        // Only care about write/create events
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }
        for path in &event.paths {
            self.record_change(path);
        }
    }

    fn record_change(self: &Arc<Self>, path: &Path) {
        if !FileFormat::is_supported(path) || path.is_dir() {
            tracing::trace!(path = %path.display(), "ignoring change");
            return;
        }

        let mut state = self.state.lock();
        state.pending.insert(path.to_path_buf());
        // Checked under the same lock `flush` swaps under, so an event landing
        // right after a swap always arms a fresh timer.
        if !state.timer_alive() {
            state.timer = Some(self.arm());
        }
    }

    fn arm(self: &Arc<Self>) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(shared.debounce).await;
            let worker = Arc::clone(&shared);
            if let Err(e) = tokio::task::spawn_blocking(move || worker.flush()).await {
                tracing::error!(error = %e, "reload batch failed");
            }
        })
    }

    fn flush(&self) {
        let batch = {
            let mut state = self.state.lock();
            state.timer = None;
            std::mem::take(&mut state.pending)
        };

        let mut seen = HashSet::new();
        for raw in batch {
            let file = match ConfigFile::new(&raw) {
                Ok(file) => file,
                Err(e) => {
                    tracing::debug!(path = %raw.display(), error = %e, "skipping unresolvable change");
                    continue;
                }
            };
            if !seen.insert(file.clone()) {
                continue;
            }

            let callback = self.state.lock().files.get(&file).cloned();
            let Some(callback) = callback else {
                continue;
            };

            let tree = match codec::read(file.path()) {
                Ok(tree) => tree,
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "failed to reload configuration file");
                    continue;
                }
            };

            tracing::debug!(file = %file, "configuration file changed");
            if catch_unwind(AssertUnwindSafe(|| callback(tree))).is_err() {
                tracing::error!(file = %file, "reload callback panicked");
            }
        }
    }
}
