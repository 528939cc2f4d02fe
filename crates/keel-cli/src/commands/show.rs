//! Show command - print the current settings.

use crate::app::App;
use crate::OutputFormat;
use keel_core::Config;
use std::time::{Duration, SystemTime};

/// Run the show command.
pub fn run(config: Config, output: OutputFormat) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let settings = app.settings.read();

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&*settings)?);
        }
        OutputFormat::Text => {
            println!("Keel Settings");
            println!("=============");
            println!();
            println!("File:        {}", app.settings_file().display());
            println!("Phase:       {:?}", app.store.phase());
            match app.store.last_write_time() {
                Some(stamp) => {
                    let age = SystemTime::now()
                        .duration_since(stamp.as_system_time())
                        .unwrap_or_default();
                    println!(
                        "Last write:  {} ({})",
                        stamp.to_datetime().format("%Y-%m-%d %H:%M:%S"),
                        format_age(age)
                    );
                }
                None => println!("Last write:  never"),
            }
            println!();
            println!("Values:");
            println!("{}", *settings);
        }
    }

    Ok(())
}

fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
