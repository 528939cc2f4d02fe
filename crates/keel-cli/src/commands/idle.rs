//! Idle command - wait until a file or directory is no longer held.

use keel_core::{Config, DirIdlePolicy};
use std::path::PathBuf;
use std::time::Instant;

/// Run the idle command.
pub fn run(
    config: Config,
    path: PathBuf,
    attempts: Option<u32>,
    backoff: Option<u32>,
    last_file: bool,
) -> anyhow::Result<()> {
    let mut poll = config.poll.clone();
    if let Some(attempts) = attempts {
        poll.max_attempts = attempts;
    }
    if let Some(backoff) = backoff {
        poll.backoff_steps = backoff;
    }
    if last_file {
        poll.dir_policy = DirIdlePolicy::LastFile;
    }
    let poller = poll.poller();

    let started = Instant::now();

    if path.is_dir() {
        let idle = poller.await_dir_idle(&path);
        println!(
            "{} {} ({:?} policy, {:.1?})",
            path.display(),
            if idle { "is idle" } else { "is busy" },
            poller.dir_policy(),
            started.elapsed()
        );
    } else {
        let outcome = poller.poll(&path);
        println!(
            "{} {} after {} attempt(s) ({:.1?})",
            path.display(),
            if outcome.idle { "is idle" } else { "is busy" },
            outcome.attempts,
            started.elapsed()
        );
    }

    Ok(())
}
