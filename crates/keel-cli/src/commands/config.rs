//! Config command - print or write the effective configuration.

use keel_core::Config;
use std::path::PathBuf;

/// Run the config command.
///
/// `path` is the `--config` argument, if any; without it the default
/// location is used when saving.
pub fn run(config: Config, path: Option<PathBuf>, save: bool) -> anyhow::Result<()> {
    if !save {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let path = match path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    config.save_to(&path)?;
    println!("Configuration written to {}", path.display());

    Ok(())
}
