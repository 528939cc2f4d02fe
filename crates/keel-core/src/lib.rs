//! # Keel Core Library
//!
//! This crate keeps a typed settings object in sync with a JSON file: it loads
//! it (falling back to defaults when the file is missing or unusable), saves
//! it, watches the file and reloads when another process changes it. It is
//! platform-agnostic; permission rules come from a `RuleSource` supplied by
//! the `keel-access` crate.
//!
//! ## Architecture
//!
//! - **Store** (`store`): Load/save lifecycle, default filling, live reload
//! - **Notifier** (`notifier`): File-change subscription with burst folding
//! - **Idle** (`idle`): Waiting for files held by other processes
//! - **Access** (`access`): Permission rule evaluation
//! - **Interaction** (`interaction`): Progress and retry prompts for users
//! - **Schema** (`schema`): The `Settings` trait implemented by user types
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_core::{SettingsStore, StoreOptions};
//!
//! let store = SettingsStore::<AppSettings>::new(StoreOptions::default());
//! let settings = store.load("cfg", "cfg/app.json");
//!
//! settings.write().recent_files.push("notes.txt".into());
//! store.save()?;
//! ```

pub mod access;
pub mod config;
pub mod error;
pub mod idle;
pub mod interaction;
pub mod notifier;
pub mod schema;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use access::{AccessProbe, AccessRule, Identity, Principal, Rights, RuleProbe, RuleSource};
pub use config::{Config, SessionMode};
pub use error::{KeelError, Result};
pub use idle::{DirIdlePolicy, IdlePoller};
pub use interaction::{
    Interaction, ProgressHandle, ProgressPump, ProgressQueue, ProgressSurface, SaveErrorPrompt,
    SaveFailureChoice,
};
pub use notifier::{ChangeHandler, ChangeNotifier, ChannelChangeHandler};
pub use schema::Settings;
pub use store::{LoadSource, SettingsHandle, SettingsStore, StoreEvent, StoreOptions, StorePhase};
pub use types::{FileChange, WriteStamp};
