//! User-facing collaborators of the store.
//!
//! The store only talks to a user in interactive sessions: it shows a
//! progress surface while it waits for the freshly written file to settle,
//! and asks whether to retry when a save fails. Both are traits so the host
//! application can plug in its own toolkit.
//!
//! Progress surfaces usually belong to a UI thread, while the store closes
//! them from its background worker. [`ProgressQueue`] bridges the two: the
//! store gets a [`ProgressHandle`] that only enqueues commands, and the UI
//! thread applies them by draining the [`ProgressPump`].

use crate::error::KeelError;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// A progress indicator shown during slow operations.
pub trait ProgressSurface: Send + Sync {
    /// Show the surface with a title
    fn show(&self, title: &str);

    /// Replace the message under the title
    fn set_text(&self, message: &str);

    /// Hide the surface. Closing twice must be harmless.
    fn close(&self);
}

/// Answer to a failed save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFailureChoice {
    /// Attempt the save again
    Retry,
    /// Give up; the settings stay in memory only
    Cancel,
}

/// Asks the user what to do about a failed save.
pub trait SaveErrorPrompt: Send + Sync {
    fn ask(&self, title: &str, error: &KeelError) -> SaveFailureChoice;
}

/// How the store interacts with a user.
#[derive(Clone, Default)]
pub enum Interaction {
    /// No user present: failures are logged, waits happen inline.
    #[default]
    Headless,

    /// A user is present: failures are prompted for and the post-save wait
    /// runs on a worker behind a progress surface.
    Interactive {
        progress: Arc<dyn ProgressSurface>,
        prompt: Arc<dyn SaveErrorPrompt>,
    },
}

impl Interaction {
    pub fn interactive(
        progress: Arc<dyn ProgressSurface>,
        prompt: Arc<dyn SaveErrorPrompt>,
    ) -> Self {
        Interaction::Interactive { progress, prompt }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Interaction::Interactive { .. })
    }
}

impl std::fmt::Debug for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interaction::Headless => write!(f, "Headless"),
            Interaction::Interactive { .. } => write!(f, "Interactive"),
        }
    }
}

/// Commands carried from a [`ProgressHandle`] to its [`ProgressPump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressCommand {
    Show(String),
    SetText(String),
    Close,
}

/// Builds a handle/pump pair around a UI-owned surface.
pub struct ProgressQueue;

impl ProgressQueue {
    /// Wrap `surface`. The handle may be used from any thread; the pump must
    /// be drained on the thread that owns `surface`.
    pub fn new<S: ProgressSurface + 'static>(surface: S) -> (ProgressHandle, ProgressPump) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (
            ProgressHandle { sender },
            ProgressPump {
                receiver,
                surface: Box::new(surface),
                open: false,
            },
        )
    }
}

/// Thread-safe [`ProgressSurface`] that forwards to a pump.
#[derive(Clone)]
pub struct ProgressHandle {
    sender: Sender<ProgressCommand>,
}

impl ProgressHandle {
    fn send(&self, command: ProgressCommand) {
        // The pump is gone once the UI shut down; nothing left to update.
        if self.sender.send(command).is_err() {
            trace!("Progress pump dropped, command discarded");
        }
    }
}

impl ProgressSurface for ProgressHandle {
    fn show(&self, title: &str) {
        self.send(ProgressCommand::Show(title.to_string()));
    }

    fn set_text(&self, message: &str) {
        self.send(ProgressCommand::SetText(message.to_string()));
    }

    fn close(&self) {
        self.send(ProgressCommand::Close);
    }
}

/// Applies queued commands to the real surface on the UI thread.
pub struct ProgressPump {
    receiver: Receiver<ProgressCommand>,
    surface: Box<dyn ProgressSurface>,
    open: bool,
}

impl ProgressPump {
    /// Apply every queued command without blocking. Returns how many ran.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.receiver.try_recv() {
            self.apply(command);
            applied += 1;
        }
        applied
    }

    /// Apply commands until the surface is closed or `timeout` passes
    /// without a command. Returns true if the surface ended up closed.
    pub fn run_until_closed(&mut self, timeout: Duration) -> bool {
        loop {
            match self.receiver.recv_timeout(timeout) {
                Ok(command) => {
                    let closing = command == ProgressCommand::Close;
                    self.apply(command);
                    if closing {
                        return true;
                    }
                }
                Err(_) => return !self.open,
            }
        }
    }

    /// Whether the surface is currently shown.
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn apply(&mut self, command: ProgressCommand) {
        match command {
            ProgressCommand::Show(title) => {
                self.surface.show(&title);
                self.open = true;
            }
            ProgressCommand::SetText(message) => {
                if self.open {
                    self.surface.set_text(&message);
                }
            }
            ProgressCommand::Close => {
                if self.open {
                    self.surface.close();
                    self.open = false;
                }
            }
        }
    }
}
