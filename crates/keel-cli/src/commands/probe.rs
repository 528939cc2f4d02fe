//! Probe command - report whether a file is readable and writable.

use keel_core::{AccessProbe, Config, RuleSource};
use std::path::PathBuf;

/// Run the probe command.
pub fn run(config: Config, path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => config.settings_file()?,
    };

    if !path.exists() {
        println!("{} does not exist.", path.display());
        return Ok(());
    }

    let probe = keel_access::native_probe();
    let (read, write) = check(&probe, &path);

    println!("Access for {}", path.display());
    println!("  readable: {}", yes_no(read));
    println!("  writable: {}", yes_no(write));

    match probe.source().identity() {
        Ok(identity) => {
            println!("  as user:  {}", identity.user);
            println!("  groups:   {}", identity.groups.join(", "));
        }
        Err(e) => println!("  identity unavailable: {}", e),
    }

    Ok(())
}

fn check(probe: &dyn AccessProbe, path: &std::path::Path) -> (bool, bool) {
    (probe.can_read(path), probe.can_write(path))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_own_file_is_accessible() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("demo.json");
        fs::write(&path, "{}").unwrap();

        assert_eq!(check(&keel_access::native_probe(), &path), (true, true));
    }

    #[test]
    fn test_report_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("demo.json");
        fs::write(&path, "{}").unwrap();

        run(Config::default(), Some(path)).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.json");
        run(Config::default(), Some(missing)).unwrap();
    }
}
