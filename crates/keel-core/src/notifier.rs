//! File-change notification for a single settings file.
//!
//! The notifier subscribes to the file's parent directory through the
//! platform watcher (`notify`), keeps only events naming the settings file and
//! forwards them as [`FileChange`]s carrying the file's modification time.
//!
//! Platforms usually report one logical write as a burst of events, the first
//! of which can arrive while the writer is still mid-way (right after the
//! truncate). The notifier waits a short settle delay before sampling the
//! modification time and folds bursts to one delivery per distinct time.
//! Delivery can be suppressed with [`ChangeNotifier::pause`] without tearing
//! down the subscription, which is what the store does while it writes the
//! file itself.

use crate::error::Result;
use crate::types::{FileChange, WriteStamp};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Delay between an event and sampling the file's modification time.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(25);

/// Receives notifications about the watched file.
///
/// Called on the watcher's delivery thread.
pub trait ChangeHandler: Send + Sync {
    /// The file was modified and now carries `change.write_time`
    fn on_change(&self, change: FileChange);

    /// The platform watcher reported an error
    fn on_error(&self, path: PathBuf, error: String);
}

/// Messages sent by [`ChannelChangeHandler`]
#[derive(Debug, Clone)]
pub enum ChangeMessage {
    /// A change event
    Change(FileChange),
    /// An error occurred
    Error { path: PathBuf, error: String },
}

/// A channel-based change handler implementation
pub struct ChannelChangeHandler {
    sender: crossbeam_channel::Sender<ChangeMessage>,
}

impl ChannelChangeHandler {
    /// Create a new channel-based handler
    pub fn new() -> (Self, crossbeam_channel::Receiver<ChangeMessage>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (ChannelChangeHandler { sender }, receiver)
    }
}

impl Default for ChannelChangeHandler {
    fn default() -> Self {
        Self::new().0
    }
}

impl ChangeHandler for ChannelChangeHandler {
    fn on_change(&self, change: FileChange) {
        let _ = self.sender.send(ChangeMessage::Change(change));
    }

    fn on_error(&self, path: PathBuf, error: String) {
        let _ = self.sender.send(ChangeMessage::Error { path, error });
    }
}

/// State shared between the notifier and the watcher callback.
struct Shared {
    target: PathBuf,
    file_name: Option<OsString>,
    settle: Duration,
    paused: AtomicBool,
    last_delivered: Mutex<Option<WriteStamp>>,
    handler: Arc<dyn ChangeHandler>,
}

impl Shared {
    fn new(target: &Path, settle: Duration, handler: Arc<dyn ChangeHandler>) -> Self {
        Shared {
            target: target.to_path_buf(),
            file_name: target.file_name().map(|n| n.to_os_string()),
            settle,
            paused: AtomicBool::new(false),
            last_delivered: Mutex::new(None),
            handler,
        }
    }

    fn dispatch(&self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!(path = %self.target.display(), error = %e, "File watch error");
                self.handler.on_error(self.target.clone(), e.to_string());
                return;
            }
        };

        if !is_write_event(&event.kind) || !self.names_target(&event.paths) {
            return;
        }

        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }

        match WriteStamp::of(&self.target) {
            Ok(stamp) => self.deliver(stamp),
            // Deleted or replaced between the event and now; the next event
            // for the new file will carry its stamp.
            Err(e) => trace!(
                path = %self.target.display(),
                error = %e,
                "Changed file not readable"
            ),
        }
    }

    fn names_target(&self, paths: &[PathBuf]) -> bool {
        let Some(name) = &self.file_name else {
            return false;
        };
        paths.iter().any(|p| p.file_name() == Some(name.as_os_str()))
    }

    fn deliver(&self, stamp: WriteStamp) {
        if self.paused.load(Ordering::SeqCst) {
            trace!(path = %self.target.display(), "Change suppressed while paused");
            return;
        }

        {
            let mut last = self.last_delivered.lock();
            if *last == Some(stamp) {
                return;
            }
            *last = Some(stamp);
        }

        debug!(path = %self.target.display(), write_time = %stamp, "Settings file changed");
        self.handler
            .on_change(FileChange::new(self.target.clone(), stamp));
    }
}

fn is_write_event(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

/// Live subscription to modifications of one file.
///
/// Dropping the notifier ends the subscription.
pub struct ChangeNotifier {
    shared: Arc<Shared>,
    _watcher: RecommendedWatcher,
}

impl ChangeNotifier {
    /// Start watching `path`, delivering changes to `handler`.
    ///
    /// The parent directory must exist.
    pub fn watch(path: &Path, handler: Arc<dyn ChangeHandler>) -> Result<Self> {
        Self::watch_with_settle(path, DEFAULT_SETTLE, handler)
    }

    /// Like [`ChangeNotifier::watch`] with an explicit settle delay.
    pub fn watch_with_settle(
        path: &Path,
        settle: Duration,
        handler: Arc<dyn ChangeHandler>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::new(path, settle, handler));

        let callback_shared = Arc::clone(&shared);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            callback_shared.dispatch(res);
        })?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        debug!(path = %path.display(), "Watching settings file");

        Ok(ChangeNotifier {
            shared,
            _watcher: watcher,
        })
    }

    /// Path of the watched file.
    pub fn path(&self) -> &Path {
        &self.shared.target
    }

    /// Stop delivering changes. Events arriving meanwhile are dropped.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    /// Deliver changes again.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Treat `stamp` as already delivered, so the burst of events following a
    /// write with that stamp is folded away.
    pub fn mark_seen(&self, stamp: WriteStamp) {
        *self.shared.last_delivered.lock() = Some(stamp);
    }
}
