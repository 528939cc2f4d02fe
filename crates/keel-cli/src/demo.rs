//! The settings schema managed by the `keel` binary.

use keel_core::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Value given to `ASingleString` when the file has none.
pub const DEFAULT_STRING: &str = "1972";

/// Demo settings record.
///
/// Every field is optional on disk so files written by older versions still
/// decode; [`Settings::fill_defaults`] completes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DemoSettings {
    pub list_of_strings: Option<Vec<String>>,
    pub a_single_string: Option<String>,
    pub some_boolean: bool,
}

impl Settings for DemoSettings {
    fn fill_defaults(&mut self) -> bool {
        let mut out_of_date = false;

        let blank = self
            .a_single_string
            .as_deref()
            .map_or(true, |s| s.trim().is_empty());
        if blank {
            self.a_single_string = Some(DEFAULT_STRING.to_string());
            out_of_date = true;
        }

        if self.list_of_strings.is_none() {
            self.list_of_strings = Some(Vec::new());
            out_of_date = true;
        }

        out_of_date
    }

    fn log_values(&self) {
        info!(
            a_single_string = self.a_single_string.as_deref().unwrap_or(""),
            items = self.list_of_strings.as_ref().map_or(0, Vec::len),
            some_boolean = self.some_boolean,
            "Demo settings values"
        );
    }
}

impl fmt::Display for DemoSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  ASingleString: {}",
            self.a_single_string.as_deref().unwrap_or("<unset>")
        )?;
        match &self.list_of_strings {
            Some(items) if !items.is_empty() => {
                writeln!(f, "  ListOfStrings:")?;
                for item in items {
                    writeln!(f, "    - {}", item)?;
                }
            }
            Some(_) => writeln!(f, "  ListOfStrings: (empty)")?,
            None => writeln!(f, "  ListOfStrings: <unset>")?,
        }
        write!(f, "  SomeBoolean:   {}", self.some_boolean)
    }
}
