//! Toggle command - flip the boolean value.

use crate::app::App;
use keel_core::Config;

/// Run the toggle command.
pub fn run(config: Config) -> anyhow::Result<()> {
    let mut app = App::new(config)?;
    app.update(|s| s.some_boolean = !s.some_boolean)?;

    println!("SomeBoolean is now {}.", app.settings.read().some_boolean);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_config;
    use tempfile::TempDir;

    #[test]
    fn test_toggle_twice() {
        let temp_dir = TempDir::new().unwrap();

        run(test_config(temp_dir.path())).unwrap();
        assert!(App::new(test_config(temp_dir.path())).unwrap().settings.read().some_boolean);

        run(test_config(temp_dir.path())).unwrap();
        assert!(!App::new(test_config(temp_dir.path())).unwrap().settings.read().some_boolean);
    }
}
