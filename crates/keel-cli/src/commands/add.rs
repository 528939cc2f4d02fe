//! Add command - append items to the string list.

use crate::app::App;
use keel_core::Config;

/// Run the add command.
pub fn run(config: Config, items: Vec<String>) -> anyhow::Result<()> {
    if items.is_empty() {
        eprintln!("Nothing to add.");
        return Ok(());
    }

    let count = items.len();
    let mut app = App::new(config)?;
    app.update(|s| s.list_of_strings.get_or_insert_with(Vec::new).extend(items))?;

    println!("Added {} item(s) to ListOfStrings.", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_config;
    use tempfile::TempDir;

    #[test]
    fn test_add_appends() {
        let temp_dir = TempDir::new().unwrap();
        run(test_config(temp_dir.path()), vec!["a".to_string()]).unwrap();
        run(
            test_config(temp_dir.path()),
            vec!["b".to_string(), "c".to_string()],
        )
        .unwrap();

        let app = App::new(test_config(temp_dir.path())).unwrap();
        assert_eq!(
            app.settings.read().list_of_strings,
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }
}
