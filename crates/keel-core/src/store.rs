//! The settings store: load, save, default filling and live reload.
//!
//! A [`SettingsStore`] owns the single live instance of a settings type and
//! the state needed to persist it:
//!
//! - **Load** decodes the JSON file, or falls back to defaults when the file
//!   is missing, busy, unreadable or corrupt. Load never fails.
//! - **Save** writes the whole instance as indented JSON while change
//!   notifications are suppressed, then records the file's new modification
//!   time so the echo of its own write is not mistaken for an external edit.
//! - **Watch** reloads the instance when another process modifies the file,
//!   i.e. when a notification carries a modification time different from the
//!   one last recorded.
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_core::{SettingsStore, StoreOptions};
//!
//! let store = SettingsStore::<AppSettings>::new(StoreOptions::default());
//! let settings = store.load("cfg", "cfg/app.json");
//!
//! settings.write().theme = Some("dark".into());
//! store.save()?;
//! ```

use crate::access::AccessProbe;
use crate::config::Config;
use crate::error::{KeelError, Result};
use crate::idle::IdlePoller;
use crate::interaction::{Interaction, SaveFailureChoice};
use crate::notifier::{ChangeHandler, ChangeNotifier, DEFAULT_SETTLE};
use crate::schema::Settings;
use crate::types::{FileChange, WriteStamp};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Shared reference to the live settings instance.
///
/// Reloads replace the value inside the lock, so every clone of the handle
/// sees them. Do not hold a guard across [`SettingsStore::save`].
pub type SettingsHandle<T> = Arc<RwLock<T>>;

/// Lifecycle phase of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    Uninitialized,
    Loading,
    /// The file was decoded and needed no defaults
    Loaded,
    /// Defaults were filled in (first run, fallback, or upgraded file)
    DefaultsApplied,
    Saving,
    Watching,
    Reloading,
    /// The last load or save failed
    ErrorRecovery,
}

/// Where the instance came from on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// No file existed; defaults were written out
    Created,
    /// Decoded from the settings file
    File,
    /// The file could not be used; defaults were substituted
    Fallback,
}

/// Notifications published to [`SettingsStore::subscribe`]rs.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Loaded { source: LoadSource },
    Saved { write_time: WriteStamp },
    SaveFailed { error: String },
    Reloaded { write_time: WriteStamp },
}

/// Collaborators and switches for a store.
pub struct StoreOptions {
    poller: IdlePoller,
    interaction: Interaction,
    access: Option<Arc<dyn AccessProbe>>,
    watch: bool,
    settle: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            poller: IdlePoller::new(),
            interaction: Interaction::Headless,
            access: None,
            watch: true,
            settle: DEFAULT_SETTLE,
        }
    }
}

impl StoreOptions {
    /// Options for polling and watching taken from configuration.
    ///
    /// Interaction and access probing depend on the host and are set
    /// separately.
    pub fn from_config(config: &Config) -> Self {
        StoreOptions::default()
            .with_poller(config.poll.poller())
            .with_watch(config.watch.enabled)
            .with_settle(Duration::from_millis(config.watch.settle_ms))
    }

    pub fn with_poller(mut self, poller: IdlePoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_interaction(mut self, interaction: Interaction) -> Self {
        self.interaction = interaction;
        self
    }

    /// Consult `probe` before reading and before overwriting the file.
    pub fn with_access_probe(mut self, probe: Arc<dyn AccessProbe>) -> Self {
        self.access = Some(probe);
        self
    }

    /// Enable or disable reloading on external changes.
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Delay between a change event and reading the file's stamp.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

struct PersistenceState {
    location: PathBuf,
    settings_file: PathBuf,
    last_write_time: Option<WriteStamp>,
    loaded: bool,
    phase: StorePhase,
}

struct StoreInner<T> {
    settings: SettingsHandle<T>,
    state: Mutex<PersistenceState>,
    notifier: Mutex<Option<ChangeNotifier>>,
    rearm_worker: Mutex<Option<JoinHandle<()>>>,
    subscribers: Mutex<Vec<Sender<StoreEvent>>>,
    options: StoreOptions,
}

/// Owns one settings instance and keeps it in sync with its JSON file.
///
/// Cloning the store is cheap; clones share the instance and state.
pub struct SettingsStore<T: Settings> {
    inner: Arc<StoreInner<T>>,
}

impl<T: Settings> Clone for SettingsStore<T> {
    fn clone(&self) -> Self {
        SettingsStore {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Settings> Default for SettingsStore<T> {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl<T: Settings> SettingsStore<T> {
    /// Create an unloaded store holding a default instance.
    pub fn new(options: StoreOptions) -> Self {
        SettingsStore {
            inner: Arc::new(StoreInner {
                settings: Arc::new(RwLock::new(T::default())),
                state: Mutex::new(PersistenceState {
                    location: PathBuf::new(),
                    settings_file: PathBuf::new(),
                    last_write_time: None,
                    loaded: false,
                    phase: StorePhase::Uninitialized,
                }),
                notifier: Mutex::new(None),
                rearm_worker: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                options,
            }),
        }
    }

    /// Load `file` (inside `location`) and start watching it.
    ///
    /// Failures never propagate: a missing file is created with defaults and
    /// an unusable one is replaced by defaults, both logged.
    pub fn load(&self, location: impl AsRef<Path>, file: impl AsRef<Path>) -> SettingsHandle<T> {
        self.inner.load(location.as_ref(), file.as_ref());
        self.settings()
    }

    /// Write the instance to its file.
    ///
    /// In interactive sessions failures are offered for retry first. The
    /// error of the last attempt is returned; the watcher is re-armed either
    /// way.
    pub fn save(&self) -> Result<()> {
        self.inner.save()
    }

    /// Fill absent fields with defaults; save once if anything changed and
    /// `should_save` is set. Returns whether the instance was out of date.
    pub fn set_defaults(&self, should_save: bool) -> bool {
        self.inner.set_defaults(should_save)
    }

    /// React to a change notification. Returns true if the file was reloaded.
    ///
    /// The reload takes the same path as [`SettingsStore::load`]: if the
    /// edited file no longer decodes, the instance is reset to defaults and
    /// those defaults are written back, replacing the malformed file. The
    /// previous in-memory values and the user's broken edit are both lost.
    pub fn handle_change(&self, change: &FileChange) -> bool {
        self.inner.handle_change(change)
    }

    /// Create the change subscription, or resume a paused one.
    pub fn start_watcher(&self) {
        self.inner.start_watcher();
    }

    /// Suppress change notifications.
    pub fn pause_watcher(&self) {
        self.inner.pause_watcher();
    }

    /// True if a subscription exists and is delivering.
    pub fn is_watching(&self) -> bool {
        self.inner
            .notifier
            .lock()
            .as_ref()
            .is_some_and(|n| !n.is_paused())
    }

    /// Block until a background re-arm started by an interactive save is done.
    pub fn wait_for_rearm(&self) {
        let worker = self.inner.rearm_worker.lock().take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("Re-arm worker panicked");
            }
        }
    }

    /// The live instance.
    pub fn settings(&self) -> SettingsHandle<T> {
        Arc::clone(&self.inner.settings)
    }

    /// Receive [`StoreEvent`]s from now on.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.inner.subscribers.lock().push(sender);
        receiver
    }

    pub fn location(&self) -> PathBuf {
        self.inner.state.lock().location.clone()
    }

    pub fn settings_file(&self) -> PathBuf {
        self.inner.settings_file()
    }

    /// Modification time of the last write this store performed or observed.
    pub fn last_write_time(&self) -> Option<WriteStamp> {
        self.inner.state.lock().last_write_time
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.state.lock().loaded
    }

    pub fn phase(&self) -> StorePhase {
        self.inner.state.lock().phase
    }
}

impl<T: Settings> StoreInner<T> {
    fn load(self: &Arc<Self>, location: &Path, file: &Path) {
        {
            let mut state = self.state.lock();
            state.location = location.to_path_buf();
            state.settings_file = file.to_path_buf();
            state.phase = StorePhase::Loading;
        }

        debug!(
            settings = T::type_name(),
            path = %file.display(),
            interactive = self.options.interaction.is_interactive(),
            "Loading settings"
        );
        self.ensure_directory();

        if !file.exists() {
            info!(
                settings = T::type_name(),
                path = %file.display(),
                "Settings file not found, writing defaults"
            );
            *self.settings.write() = T::default();
            self.settings.write().fill_defaults();
            if let Err(e) = self.save() {
                warn!(settings = T::type_name(), error = %e, "Initial settings were not written");
            }
            self.mark_loaded(StorePhase::DefaultsApplied);
            self.start_watcher();
            self.emit(StoreEvent::Loaded {
                source: LoadSource::Created,
            });
            return;
        }

        let source = self.read_from_disk(file);
        if source == LoadSource::File {
            match WriteStamp::of(file) {
                Ok(stamp) => self.remember_stamp(stamp),
                Err(e) => trace!(path = %file.display(), error = %e, "No stamp for loaded file"),
            }
        }
        let out_of_date = self.set_defaults(true);

        let phase = if source == LoadSource::File && !out_of_date {
            StorePhase::Loaded
        } else {
            StorePhase::DefaultsApplied
        };
        self.mark_loaded(phase);
        self.start_watcher();
        self.settings.read().log_values();
        self.emit(StoreEvent::Loaded { source });
    }

    /// Decode `file` into the instance, or reset the instance to defaults.
    fn read_from_disk(&self, file: &Path) -> LoadSource {
        match self.decode(file) {
            Ok(value) => {
                *self.settings.write() = value;
                debug!(settings = T::type_name(), path = %file.display(), "Settings decoded");
                LoadSource::File
            }
            Err(e) => {
                error!(
                    settings = T::type_name(),
                    path = %file.display(),
                    error = %e,
                    "Failed to load settings, reverting to defaults"
                );
                *self.settings.write() = T::default();
                self.set_phase(StorePhase::ErrorRecovery);
                LoadSource::Fallback
            }
        }
    }

    fn decode(&self, file: &Path) -> Result<T> {
        let outcome = self.options.poller.poll(file);
        if !outcome.idle {
            return Err(KeelError::FileBusy {
                path: file.to_path_buf(),
                attempts: outcome.attempts,
            });
        }

        if let Some(probe) = &self.options.access {
            if !probe.can_read(file) {
                return Err(KeelError::PermissionDenied {
                    operation: "read".to_string(),
                    path: file.to_path_buf(),
                });
            }
        }

        let reader = BufReader::new(File::open(file)?);
        serde_json::from_reader(reader).map_err(|e| KeelError::decode(file, e.to_string()))
    }

    fn set_defaults(self: &Arc<Self>, should_save: bool) -> bool {
        let out_of_date = self.settings.write().fill_defaults();

        if out_of_date {
            debug!(settings = T::type_name(), "Filled missing settings with defaults");
            if should_save {
                if let Err(e) = self.save() {
                    warn!(
                        settings = T::type_name(),
                        error = %e,
                        "Upgraded settings were not written"
                    );
                }
            }
        }

        out_of_date
    }

    fn save(self: &Arc<Self>) -> Result<()> {
        let result = loop {
            match self.write_once() {
                Ok(stamp) => {
                    info!(
                        settings = T::type_name(),
                        path = %self.settings_file().display(),
                        write_time = %stamp,
                        "Settings saved"
                    );
                    self.emit(StoreEvent::Saved { write_time: stamp });
                    break Ok(());
                }
                Err(e) => {
                    error!(settings = T::type_name(), error = %e, "Failed to save settings");
                    self.set_phase(StorePhase::ErrorRecovery);
                    self.emit(StoreEvent::SaveFailed {
                        error: e.to_string(),
                    });

                    let Interaction::Interactive { prompt, .. } = &self.options.interaction else {
                        break Err(e);
                    };
                    let title = format!("Saving {} settings failed", T::type_name());
                    match prompt.ask(&title, &e) {
                        SaveFailureChoice::Retry => {
                            info!(settings = T::type_name(), "Retrying save");
                        }
                        SaveFailureChoice::Cancel => {
                            warn!(
                                settings = T::type_name(),
                                "Save cancelled, the file reverts to defaults on next start"
                            );
                            break Err(e);
                        }
                    }
                }
            }
        };

        self.rearm_after_save();
        result
    }

    /// One attempt: ensure directory, suppress notifications, write, record.
    fn write_once(&self) -> Result<WriteStamp> {
        let file = self.settings_file();
        self.set_phase(StorePhase::Saving);
        self.ensure_directory();
        self.pause_watcher();

        if let Some(probe) = &self.options.access {
            if file.exists() && !probe.can_write(&file) {
                return Err(KeelError::PermissionDenied {
                    operation: "write".to_string(),
                    path: file,
                });
            }
        }

        // Encode before truncating so a failing Serialize impl leaves the
        // previous file intact.
        let bytes = serde_json::to_vec_pretty(&*self.settings.read())?;

        let mut handle = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&file)
            .map_err(|e| KeelError::write(&file, e))?;
        handle
            .write_all(&bytes)
            .and_then(|_| handle.flush())
            .and_then(|_| handle.sync_all())
            .map_err(|e| KeelError::write(&file, e))?;
        drop(handle);

        let stamp = WriteStamp::of(&file).map_err(|e| KeelError::write(&file, e))?;
        self.remember_stamp(stamp);

        Ok(stamp)
    }

    /// Record `stamp` as the file's current state so its events are not
    /// taken for external edits.
    fn remember_stamp(&self, stamp: WriteStamp) {
        self.state.lock().last_write_time = Some(stamp);
        if let Some(notifier) = self.notifier.lock().as_ref() {
            notifier.mark_seen(stamp);
        }
    }

    fn rearm_after_save(self: &Arc<Self>) {
        let Interaction::Interactive { progress, .. } = &self.options.interaction else {
            self.wait_idle_and_resume();
            return;
        };

        progress.show(&format!("Saving {} settings", T::type_name()));
        progress.set_text("Waiting for the settings file to settle");

        let inner = Arc::clone(self);
        let worker_progress = Arc::clone(progress);
        let spawned = thread::Builder::new()
            .name("keel-rearm".to_string())
            .spawn(move || {
                inner.wait_idle_and_resume();
                worker_progress.close();
            });

        match spawned {
            Ok(worker) => {
                // A still-running worker from an earlier save is detached.
                *self.rearm_worker.lock() = Some(worker);
            }
            Err(e) => {
                warn!(error = %e, "Cannot spawn re-arm worker, waiting inline");
                self.wait_idle_and_resume();
                progress.close();
            }
        }
    }

    fn wait_idle_and_resume(self: &Arc<Self>) {
        let file = self.settings_file();
        if file.exists() && !self.options.poller.await_idle(&file) {
            debug!(path = %file.display(), "Settings file still busy, watching anyway");
        }
        self.start_watcher();
    }

    fn handle_change(self: &Arc<Self>, change: &FileChange) -> bool {
        let file = {
            let mut state = self.state.lock();
            if state.last_write_time == Some(change.write_time) {
                trace!(path = %change.path.display(), "Ignoring own write");
                return false;
            }
            state.last_write_time = Some(change.write_time);
            state.phase = StorePhase::Reloading;
            state.settings_file.clone()
        };

        info!(
            settings = T::type_name(),
            path = %file.display(),
            write_time = %change.write_time,
            "Settings file changed externally, reloading"
        );

        self.read_from_disk(&file);
        self.set_defaults(true);
        self.start_watcher();
        self.settings.read().log_values();
        self.emit(StoreEvent::Reloaded {
            write_time: change.write_time,
        });
        true
    }

    fn start_watcher(self: &Arc<Self>) {
        if !self.options.watch {
            return;
        }

        {
            let mut notifier = self.notifier.lock();
            match notifier.as_ref() {
                Some(existing) => {
                    trace!(path = %existing.path().display(), "Resuming watch");
                    existing.resume();
                }
                None => {
                    let file = self.settings_file();
                    let handler = Arc::new(StoreChangeHandler {
                        store: Arc::downgrade(self),
                    });
                    match ChangeNotifier::watch_with_settle(&file, self.options.settle, handler) {
                        Ok(created) => {
                            if let Some(stamp) = self.state.lock().last_write_time {
                                created.mark_seen(stamp);
                            }
                            *notifier = Some(created);
                        }
                        Err(e) => {
                            error!(
                                path = %file.display(),
                                error = %e,
                                "Cannot watch settings file"
                            );
                            return;
                        }
                    }
                }
            }
        }

        self.set_phase(StorePhase::Watching);
    }

    fn pause_watcher(&self) {
        if let Some(notifier) = self.notifier.lock().as_ref() {
            notifier.pause();
        }
    }

    /// Create the settings directory if needed. Failure is only logged; the
    /// file operation that follows reports the real error.
    fn ensure_directory(&self) {
        let location = self.state.lock().location.clone();
        if location.as_os_str().is_empty() || location.exists() {
            return;
        }
        if let Err(e) = fs::create_dir_all(&location) {
            let err = KeelError::DirectoryCreate {
                path: location,
                source: e,
            };
            error!(error = %err, "Cannot create settings directory");
        }
    }

    fn settings_file(&self) -> PathBuf {
        self.state.lock().settings_file.clone()
    }

    fn set_phase(&self, phase: StorePhase) {
        self.state.lock().phase = phase;
    }

    fn mark_loaded(&self, phase: StorePhase) {
        let mut state = self.state.lock();
        state.loaded = true;
        state.phase = phase;
    }

    fn emit(&self, event: StoreEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

/// Routes notifier callbacks into the store without keeping it alive.
struct StoreChangeHandler<T> {
    store: Weak<StoreInner<T>>,
}

impl<T: Settings> ChangeHandler for StoreChangeHandler<T> {
    fn on_change(&self, change: FileChange) {
        if let Some(store) = self.store.upgrade() {
            store.handle_change(&change);
        }
    }

    fn on_error(&self, path: PathBuf, error: String) {
        warn!(path = %path.display(), error = %error, "Settings watch error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{ProgressSurface, SaveErrorPrompt};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::SystemTime;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default, rename_all = "PascalCase")]
    struct DemoSettings {
        list_of_strings: Option<Vec<String>>,
        a_single_string: Option<String>,
        some_boolean: bool,
    }

    impl Settings for DemoSettings {
        fn fill_defaults(&mut self) -> bool {
            let mut out_of_date = false;
            if self
                .a_single_string
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
            {
                self.a_single_string = Some("1972".to_string());
                out_of_date = true;
            }
            if self.list_of_strings.is_none() {
                self.list_of_strings = Some(Vec::new());
                out_of_date = true;
            }
            out_of_date
        }
    }

    fn quiet_options() -> StoreOptions {
        StoreOptions::default()
            .with_watch(false)
            .with_poller(
                IdlePoller::new()
                    .with_max_attempts(3)
                    .with_unit(Duration::ZERO),
            )
    }

    fn paths(temp_dir: &TempDir) -> (PathBuf, PathBuf) {
        let location = temp_dir.path().join("cfg");
        let file = location.join("app.json");
        (location, file)
    }

    fn count_saves(events: &Receiver<StoreEvent>) -> usize {
        events
            .try_iter()
            .filter(|e| matches!(e, StoreEvent::Saved { .. }))
            .count()
    }

    #[test]
    fn test_round_trip() {
        let settings = DemoSettings {
            list_of_strings: Some(vec!["a".to_string(), "b".to_string()]),
            a_single_string: Some("hello".to_string()),
            some_boolean: true,
        };
        let encoded = serde_json::to_string_pretty(&settings).unwrap();
        let decoded: DemoSettings = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, settings);
    }

    #[test]
    fn test_defaults_idempotent() {
        let mut settings = DemoSettings {
            a_single_string: Some("kept".to_string()),
            ..Default::default()
        };
        assert!(settings.fill_defaults());
        let after_first = settings.clone();

        assert!(!settings.fill_defaults());
        assert_eq!(settings, after_first);
        assert_eq!(settings.a_single_string.as_deref(), Some("kept"));
    }

    #[test]
    fn test_first_run_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        let events = store.subscribe();
        let settings = store.load(&location, &file);

        assert!(file.exists());
        assert!(store.is_loaded());
        assert_eq!(settings.read().a_single_string.as_deref(), Some("1972"));

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(written["ASingleString"], "1972");
        assert_eq!(written["ListOfStrings"], serde_json::json!([]));

        let events: Vec<_> = events.try_iter().collect();
        assert_eq!(
            events.iter().filter(|e| matches!(e, StoreEvent::Saved { .. })).count(),
            1
        );
        assert_eq!(
            events.last(),
            Some(&StoreEvent::Loaded {
                source: LoadSource::Created
            })
        );
    }

    #[test]
    fn test_second_load_does_not_write() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);

        SettingsStore::<DemoSettings>::new(quiet_options()).load(&location, &file);
        let contents = fs::read_to_string(&file).unwrap();

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        let events = store.subscribe();
        store.load(&location, &file);

        assert_eq!(count_saves(&events), 0);
        assert_eq!(store.phase(), StorePhase::Loaded);
        assert_eq!(fs::read_to_string(&file).unwrap(), contents);
    }

    #[test]
    fn test_old_file_is_upgraded() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);
        fs::create_dir_all(&location).unwrap();
        fs::write(&file, r#"{"ASingleString":"custom"}"#).unwrap();

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        let events = store.subscribe();
        let settings = store.load(&location, &file);

        assert_eq!(settings.read().a_single_string.as_deref(), Some("custom"));
        assert_eq!(settings.read().list_of_strings, Some(Vec::new()));
        assert_eq!(count_saves(&events), 1);
        assert_eq!(store.phase(), StorePhase::DefaultsApplied);

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(written["ASingleString"], "custom");
        assert_eq!(written["ListOfStrings"], serde_json::json!([]));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);
        fs::create_dir_all(&location).unwrap();
        fs::write(&file, "{ this is not json").unwrap();

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        let events = store.subscribe();
        let settings = store.load(&location, &file);

        assert_eq!(settings.read().a_single_string.as_deref(), Some("1972"));
        assert!(store.is_loaded());
        assert!(events.try_iter().any(|e| e
            == StoreEvent::Loaded {
                source: LoadSource::Fallback
            }));

        // The defaults replaced the unreadable contents.
        let reread: DemoSettings =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(reread, *settings.read());
    }

    #[test]
    fn test_busy_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let (location, _) = paths(&temp_dir);
        // A directory in place of the file can never be opened for writing.
        let file = location.join("app.json");
        fs::create_dir_all(&file).unwrap();

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        let events = store.subscribe();
        let settings = store.load(&location, &file);

        assert_eq!(settings.read().a_single_string.as_deref(), Some("1972"));
        let events: Vec<_> = events.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, StoreEvent::SaveFailed { .. })));
        assert!(events.contains(&StoreEvent::Loaded {
            source: LoadSource::Fallback
        }));
    }

    #[test]
    fn test_handle_is_shared_with_store() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        let settings = store.load(&location, &file);

        settings.write().some_boolean = true;
        settings
            .write()
            .list_of_strings
            .get_or_insert_with(Vec::new)
            .push("recent.txt".to_string());
        store.save().unwrap();

        let reread: DemoSettings =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert!(reread.some_boolean);
        assert_eq!(reread.list_of_strings, Some(vec!["recent.txt".to_string()]));
        assert!(Arc::ptr_eq(&settings, &store.settings()));
    }

    #[test]
    fn test_own_write_does_not_reload() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        store.load(&location, &file);
        store.save().unwrap();

        let events = store.subscribe();
        let stamp = store.last_write_time().unwrap();
        assert_eq!(stamp, WriteStamp::of(&file).unwrap());

        assert!(!store.handle_change(&FileChange::new(&file, stamp)));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_external_change_reloads_once() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        let settings = store.load(&location, &file);
        let events = store.subscribe();

        fs::write(
            &file,
            r#"{"ASingleString":"edited","ListOfStrings":["x"],"SomeBoolean":true}"#,
        )
        .unwrap();
        let observed = WriteStamp::new(SystemTime::UNIX_EPOCH + Duration::from_secs(42));

        assert!(store.handle_change(&FileChange::new(&file, observed)));
        assert_eq!(store.last_write_time(), Some(observed));
        assert_eq!(settings.read().a_single_string.as_deref(), Some("edited"));
        assert!(settings.read().some_boolean);

        let reloads: Vec<_> = events
            .try_iter()
            .filter(|e| matches!(e, StoreEvent::Reloaded { .. }))
            .collect();
        assert_eq!(reloads, vec![StoreEvent::Reloaded { write_time: observed }]);

        // The same stamp again is a duplicate.
        assert!(!store.handle_change(&FileChange::new(&file, observed)));
    }

    #[test]
    fn test_headless_save_failure_is_returned() {
        let temp_dir = TempDir::new().unwrap();
        let (location, _) = paths(&temp_dir);
        let file = location.join("app.json");
        fs::create_dir_all(&file).unwrap();

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        store.load(&location, &file);

        let result = store.save();
        assert!(matches!(result, Err(KeelError::Write { .. })));
        assert_eq!(store.phase(), StorePhase::ErrorRecovery);
    }

    #[test]
    fn test_watcher_armed_after_save() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);

        let store = SettingsStore::<DemoSettings>::new(quiet_options().with_watch(true));
        store.load(&location, &file);
        assert!(store.is_watching());

        store.pause_watcher();
        assert!(!store.is_watching());

        store.save().unwrap();
        assert!(store.is_watching());
        assert_eq!(store.phase(), StorePhase::Watching);
    }

    #[test]
    fn test_live_reload_from_watcher() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);

        let store = SettingsStore::<DemoSettings>::new(quiet_options().with_watch(true));
        let settings = store.load(&location, &file);
        let events = store.subscribe();

        // Step past the timestamp granularity of the save above.
        thread::sleep(Duration::from_millis(50));
        fs::write(&file, r#"{"ASingleString":"from outside","ListOfStrings":[]}"#).unwrap();

        let deadline = Duration::from_secs(5);
        let reloaded = loop {
            match events.recv_timeout(deadline) {
                Ok(StoreEvent::Reloaded { .. }) => break true,
                Ok(_) => continue,
                Err(_) => break false,
            }
        };
        assert!(reloaded);
        assert_eq!(
            settings.read().a_single_string.as_deref(),
            Some("from outside")
        );
    }

    struct ToggleProbe {
        writable: AtomicBool,
    }

    impl AccessProbe for ToggleProbe {
        fn can_read(&self, _path: &Path) -> bool {
            true
        }

        fn can_write(&self, _path: &Path) -> bool {
            self.writable.load(Ordering::SeqCst)
        }
    }

    struct ScriptedPrompt {
        asked: AtomicUsize,
        retries: usize,
        probe: Arc<ToggleProbe>,
    }

    impl SaveErrorPrompt for ScriptedPrompt {
        fn ask(&self, title: &str, error: &KeelError) -> SaveFailureChoice {
            assert_eq!(title, "Saving DemoSettings settings failed");
            assert!(matches!(error, KeelError::PermissionDenied { .. }));
            let asked = self.asked.fetch_add(1, Ordering::SeqCst) + 1;
            if asked <= self.retries {
                // The user fixed the permissions before retrying.
                self.probe.writable.store(true, Ordering::SeqCst);
                SaveFailureChoice::Retry
            } else {
                SaveFailureChoice::Cancel
            }
        }
    }

    #[derive(Default)]
    struct CountingProgress {
        shown: AtomicUsize,
        closed: AtomicUsize,
    }

    impl ProgressSurface for CountingProgress {
        fn show(&self, title: &str) {
            assert_eq!(title, "Saving DemoSettings settings");
            self.shown.fetch_add(1, Ordering::SeqCst);
        }

        fn set_text(&self, _message: &str) {}

        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn interactive_store(
        retries: usize,
    ) -> (
        SettingsStore<DemoSettings>,
        Arc<ToggleProbe>,
        Arc<ScriptedPrompt>,
        Arc<CountingProgress>,
    ) {
        let probe = Arc::new(ToggleProbe {
            writable: AtomicBool::new(true),
        });
        let prompt = Arc::new(ScriptedPrompt {
            asked: AtomicUsize::new(0),
            retries,
            probe: Arc::clone(&probe),
        });
        let progress = Arc::new(CountingProgress::default());
        let options = quiet_options()
            .with_access_probe(probe.clone())
            .with_interaction(Interaction::interactive(progress.clone(), prompt.clone()));
        (SettingsStore::new(options), probe, prompt, progress)
    }

    #[test]
    fn test_interactive_retry_succeeds() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);
        let (store, probe, prompt, progress) = interactive_store(1);

        store.load(&location, &file);
        store.wait_for_rearm();

        probe.writable.store(false, Ordering::SeqCst);
        store.settings().write().some_boolean = true;
        assert!(store.save().is_ok());
        store.wait_for_rearm();

        assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
        let reread: DemoSettings =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert!(reread.some_boolean);
        assert_eq!(
            progress.shown.load(Ordering::SeqCst),
            progress.closed.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn test_interactive_cancel_keeps_memory_state() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);
        let (store, probe, prompt, progress) = interactive_store(0);

        store.load(&location, &file);
        store.wait_for_rearm();
        let before = fs::read_to_string(&file).unwrap();

        probe.writable.store(false, Ordering::SeqCst);
        store.settings().write().some_boolean = true;
        let result = store.save();
        store.wait_for_rearm();

        assert!(matches!(result, Err(KeelError::PermissionDenied { .. })));
        assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
        assert!(store.settings().read().some_boolean);
        assert_eq!(fs::read_to_string(&file).unwrap(), before);
        assert_eq!(progress.closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unreadable_file_falls_back() {
        struct NoRead;
        impl AccessProbe for NoRead {
            fn can_read(&self, _path: &Path) -> bool {
                false
            }
            fn can_write(&self, _path: &Path) -> bool {
                true
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);
        fs::create_dir_all(&location).unwrap();
        fs::write(&file, r#"{"ASingleString":"secret","ListOfStrings":[]}"#).unwrap();

        let store =
            SettingsStore::<DemoSettings>::new(quiet_options().with_access_probe(Arc::new(NoRead)));
        let settings = store.load(&location, &file);

        assert_eq!(settings.read().a_single_string.as_deref(), Some("1972"));
    }

    #[test]
    fn test_save_failure_still_rearms_watcher() {
        let temp_dir = TempDir::new().unwrap();
        let (location, _) = paths(&temp_dir);
        let file = location.join("app.json");
        fs::create_dir_all(&file).unwrap();

        let store = SettingsStore::<DemoSettings>::new(quiet_options().with_watch(true));
        store.load(&location, &file);

        let result = store.save();
        assert!(matches!(result, Err(KeelError::Write { .. })));
        assert!(store.is_watching());
        assert_eq!(store.phase(), StorePhase::Watching);
    }

    #[test]
    fn test_directory_create_failure_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let location = blocker.join("cfg");
        let file = location.join("app.json");

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        let settings = store.load(&location, &file);

        assert!(store.is_loaded());
        assert_eq!(store.phase(), StorePhase::DefaultsApplied);
        assert_eq!(settings.read().a_single_string.as_deref(), Some("1972"));
        assert_eq!(settings.read().list_of_strings, Some(Vec::new()));
        assert!(!file.exists());
    }

    #[test]
    fn test_loaded_file_stamp_is_remembered() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);
        SettingsStore::<DemoSettings>::new(quiet_options()).load(&location, &file);

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        store.load(&location, &file);

        let stamp = WriteStamp::of(&file).unwrap();
        assert_eq!(store.last_write_time(), Some(stamp));
        // An attribute-only change leaves the stamp alone and is not a reload.
        assert!(!store.handle_change(&FileChange::new(&file, stamp)));
    }

    #[test]
    fn test_malformed_external_edit_restores_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let (location, file) = paths(&temp_dir);

        let store = SettingsStore::<DemoSettings>::new(quiet_options());
        let settings = store.load(&location, &file);
        settings.write().a_single_string = Some("mine".to_string());
        store.save().unwrap();

        fs::write(&file, "{ half written").unwrap();
        let observed = WriteStamp::new(SystemTime::UNIX_EPOCH + Duration::from_secs(42));
        assert!(store.handle_change(&FileChange::new(&file, observed)));

        assert_eq!(settings.read().a_single_string.as_deref(), Some("1972"));
        let reread: DemoSettings =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(reread, *settings.read());
    }
}
