//! Watch command - follow external edits of the settings file.

use crate::app::App;
use keel_core::{Config, StoreEvent};
use tracing::{error, info, warn};

/// Run the watch command.
pub fn run(mut config: Config) -> anyhow::Result<()> {
    if !config.watch.enabled {
        warn!("Watching is disabled in the configuration, enabling it for this session");
        config.watch.enabled = true;
    }

    let app = App::new(config)?;
    let events = app.store.subscribe();

    if !app.store.is_watching() {
        eprintln!(
            "Cannot watch {}. Check the logs for details.",
            app.settings_file().display()
        );
        return Ok(());
    }

    println!("Watching {}", app.settings_file().display());
    println!("Press Ctrl+C to stop.");
    println!();
    println!("{}", *app.settings.read());

    loop {
        match events.recv() {
            Ok(StoreEvent::Reloaded { write_time }) => {
                info!(write_time = %write_time, "Settings reloaded");
                println!();
                println!(
                    "Reloaded at {}:",
                    write_time.to_datetime().format("%H:%M:%S%.3f")
                );
                println!("{}", *app.settings.read());
            }
            Ok(StoreEvent::SaveFailed { error }) => {
                error!(error = %error, "Saving upgraded settings failed");
            }
            Ok(_) => {}
            Err(_) => {
                // Store dropped, nothing left to watch
                break;
            }
        }
    }

    println!("Watching stopped.");
    Ok(())
}
