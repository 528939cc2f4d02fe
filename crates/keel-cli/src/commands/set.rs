//! Set command - replace the single string value.

use crate::app::App;
use keel_core::Config;

/// Run the set command.
pub fn run(config: Config, value: String) -> anyhow::Result<()> {
    let mut app = App::new(config)?;
    app.update(|s| s.a_single_string = Some(value))?;

    println!("ASingleString updated.");
    Ok(())
}
