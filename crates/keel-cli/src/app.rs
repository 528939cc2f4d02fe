//! Application state management.

use crate::demo::DemoSettings;
use crate::ui::{TerminalProgress, TerminalPrompt};
use anyhow::Context;
use crossterm::tty::IsTty;
use keel_core::{
    Config, Interaction, ProgressPump, ProgressQueue, SessionMode, SettingsHandle, SettingsStore,
    StoreOptions,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound for the post-save settle wait shown on the progress line.
const REARM_TIMEOUT: Duration = Duration::from_secs(40);

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// The settings store
    pub store: SettingsStore<DemoSettings>,

    /// Live settings instance (shared with the store)
    pub settings: SettingsHandle<DemoSettings>,

    /// Drives the terminal progress line in interactive sessions
    pump: Option<ProgressPump>,
}

impl App {
    /// Create the store described by `config` and load the settings file.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let location = config.settings_dir()?;
        let file = config.settings_file()?;

        let mut options = StoreOptions::from_config(&config);
        if config.access.probe {
            options = options.with_access_probe(Arc::new(keel_access::native_probe()));
        }

        let interactive = is_interactive(config.session.mode, io::stdin().is_tty());
        let mut pump = None;
        if interactive {
            let (handle, progress_pump) = ProgressQueue::new(TerminalProgress::new());
            let interaction = Interaction::interactive(Arc::new(handle), Arc::new(TerminalPrompt));
            options = options.with_interaction(interaction);
            pump = Some(progress_pump);
        }

        let store = SettingsStore::new(options);
        let settings = store.load(&location, &file);

        info!(
            file = %file.display(),
            interactive,
            "Application initialized"
        );

        let mut app = App {
            config,
            store,
            settings,
            pump,
        };
        // A first run writes the file during load.
        app.settle();
        Ok(app)
    }

    /// Path of the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.store.settings_file()
    }

    /// Apply `edit` to the live settings and save them.
    pub fn update<F>(&mut self, edit: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut DemoSettings),
    {
        {
            let mut settings = self.settings.write();
            edit(&mut settings);
        }
        self.save()
    }

    /// Save the settings, waiting until the file is watched again.
    pub fn save(&mut self) -> anyhow::Result<()> {
        let result = self.store.save();
        self.settle();
        result.with_context(|| format!("saving {}", self.settings_file().display()))
    }

    /// Drain the progress line and join the re-arm worker, if any.
    fn settle(&mut self) {
        if let Some(pump) = self.pump.as_mut() {
            pump.pump();
            if pump.is_open() && !pump.run_until_closed(REARM_TIMEOUT) {
                debug!("Progress line still open after timeout");
            }
        }
        self.store.wait_for_rearm();
    }
}

/// Whether prompts and progress are shown.
pub fn is_interactive(mode: SessionMode, stdin_is_tty: bool) -> bool {
    match mode {
        SessionMode::Interactive => true,
        SessionMode::Headless => false,
        SessionMode::Auto => stdin_is_tty,
    }
}

/// Configuration for tests: settings under `dir`, no prompts, no watcher.
#[cfg(test)]
pub fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.general.location = Some(dir.join("cfg"));
    config.general.file_name = "demo.json".to_string();
    config.session.mode = SessionMode::Headless;
    config.watch.enabled = false;
    config.poll.max_attempts = 10;
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_session_resolution() {
        assert!(is_interactive(SessionMode::Interactive, false));
        assert!(!is_interactive(SessionMode::Headless, true));
        assert!(is_interactive(SessionMode::Auto, true));
        assert!(!is_interactive(SessionMode::Auto, false));
    }

    #[test]
    fn test_first_run_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let app = App::new(test_config(temp_dir.path())).unwrap();

        let path = app.settings_file();
        assert_eq!(path, temp_dir.path().join("cfg").join("demo.json"));

        let written: DemoSettings =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.a_single_string.as_deref(), Some("1972"));
        assert_eq!(written.list_of_strings, Some(vec![]));
    }

    #[test]
    fn test_update_persists() {
        let temp_dir = TempDir::new().unwrap();
        let mut app = App::new(test_config(temp_dir.path())).unwrap();

        app.update(|s| s.some_boolean = true).unwrap();

        let reopened = App::new(test_config(temp_dir.path())).unwrap();
        assert!(reopened.settings.read().some_boolean);
    }
}
