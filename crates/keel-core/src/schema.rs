//! The contract a settings type fulfils to be managed by a store.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// A user-defined settings record.
///
/// The store never knows the fields; it relies on serde for the file format
/// and on [`Settings::fill_defaults`] for schema evolution: when an older file
/// lacks fields that newer code expects, `fill_defaults` assigns them and the
/// store writes the upgraded file back once.
///
/// ## Example
///
/// ```rust,ignore
/// #[derive(Default, Serialize, Deserialize)]
/// #[serde(default)]
/// struct Window {
///     title: Option<String>,
/// }
///
/// impl Settings for Window {
///     fn fill_defaults(&mut self) -> bool {
///         if self.title.is_none() {
///             self.title = Some("Untitled".into());
///             return true;
///         }
///         false
///     }
/// }
/// ```
pub trait Settings: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Assign a default to every field that is missing or empty.
    ///
    /// Must be idempotent and must not touch fields that already hold a
    /// value. Returns true if anything changed (the instance was out of date).
    fn fill_defaults(&mut self) -> bool;

    /// Short name used in log lines and progress titles.
    fn type_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Log the loaded values. Called after every load and reload.
    fn log_values(&self) {
        debug!(settings = Self::type_name(), "Settings loaded");
    }
}
