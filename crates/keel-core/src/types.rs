//! Core data types shared by the notifier and the store.

use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Modification time of a settings file.
///
/// The store keeps the stamp of the last write it performed (or observed) and
/// compares incoming change notifications against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteStamp(SystemTime);

impl WriteStamp {
    pub fn new(time: SystemTime) -> Self {
        WriteStamp(time)
    }

    /// Read the modification time of `path`.
    pub fn of(path: &Path) -> io::Result<Self> {
        fs::metadata(path)?.modified().map(WriteStamp)
    }

    pub fn as_system_time(&self) -> SystemTime {
        self.0
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.0)
    }
}

impl From<SystemTime> for WriteStamp {
    fn from(time: SystemTime) -> Self {
        WriteStamp(time)
    }
}

impl fmt::Display for WriteStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// A modification of the watched settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Path of the changed file
    pub path: PathBuf,

    /// Its modification time when the event was handled
    pub write_time: WriteStamp,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, write_time: WriteStamp) -> Self {
        FileChange {
            path: path.into(),
            write_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_stamp_of_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.json");
        fs::write(&path, "{}").unwrap();

        let stamp = WriteStamp::of(&path).unwrap();
        assert_eq!(
            stamp.as_system_time(),
            fs::metadata(&path).unwrap().modified().unwrap()
        );
        assert!(WriteStamp::of(&temp_dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_stamp_display() {
        let stamp = WriteStamp::new(SystemTime::UNIX_EPOCH + Duration::from_secs(86_400));
        assert_eq!(stamp.to_string(), "1970-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_stamp_ordering() {
        let earlier = WriteStamp::new(SystemTime::UNIX_EPOCH);
        let later = WriteStamp::new(SystemTime::UNIX_EPOCH + Duration::from_millis(1));
        assert!(earlier < later);
        assert_ne!(earlier, later);
    }
}
