//! Watch command: repeated sync runs at a fixed interval.
//!
//! A failed run is logged and retried on the next tick; the loop only
//! stops with the process.

use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::Config;
use crate::cli::SyncArgs;
use crate::commands::sync;

pub fn run(config: &Config, interval: u64, pretend: bool) -> Result<()> {
    let args = SyncArgs {
        pretend,
        days: 1,
        start_date: None,
        end_date: None,
    };

    tracing::info!(interval, pretend, "starting watch loop");
    loop {
        match sync::run(&mut std::io::stdout(), config, &args) {
            Ok(summary) => {
                tracing::info!(written = summary.written(), "sync run complete");
            }
            Err(err) => tracing::error!(%err, "sync run failed, will retry"),
        }
        thread::sleep(Duration::from_secs(interval));
    }
}
