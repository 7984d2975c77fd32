//! Sync command: one reconciliation run over a time window.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

use ps_api::{NightscoutApi, TConnectApi};
use ps_core::TimeRange;
use ps_sync::{SyncSummary, process_time_range};

use crate::Config;
use crate::cli::SyncArgs;

pub fn run<W: Write>(writer: &mut W, config: &Config, args: &SyncArgs) -> Result<SyncSummary> {
    let tz = config.pump_offset().with_context(|| {
        format!("invalid timezone_offset: {:?}", config.timezone_offset)
    })?;
    let now = Utc::now().with_timezone(&tz);
    let range = window_for(args, tz, now)?;

    let source = TConnectApi::new(
        require(&config.tconnect_email, "tconnect_email")?,
        require(&config.tconnect_password, "tconnect_password")?,
    )?;
    let mut gateway = NightscoutApi::new(require(&config.ns_url, "ns_url")?, &config.ns_secret)?;

    writeln!(
        writer,
        "Processing data between {} and {}{}",
        range.start,
        range.end,
        if args.pretend { " (PRETEND)" } else { "" }
    )?;

    let summary =
        process_time_range(&source, &mut gateway, &range, args.pretend).context("sync failed")?;

    writeln!(
        writer,
        "Basal: {} created, {} updated, {} skipped",
        summary.basal.created, summary.basal.updated, summary.basal.skipped
    )?;
    writeln!(
        writer,
        "Bolus: {} created, {} skipped",
        summary.bolus.created, summary.bolus.skipped
    )?;
    writeln!(
        writer,
        "IOB: {} created, {} skipped",
        summary.iob.created, summary.iob.skipped
    )?;
    writeln!(writer, "Glucose readings seen: {}", summary.readings_seen)?;
    Ok(summary)
}

/// Resolves the sync window: an explicit inclusive date range, or the
/// last `--days` days ending now.
fn window_for(
    args: &SyncArgs,
    tz: FixedOffset,
    now: DateTime<FixedOffset>,
) -> Result<TimeRange> {
    if let (Some(start), Some(end)) = (args.start_date, args.end_date) {
        let start = local_midnight(start, tz)?;
        let end_exclusive = end.succ_opt().context("end date out of range")?;
        let end = local_midnight(end_exclusive, tz)?;
        return Ok(TimeRange::new(start, end)?);
    }

    if args.days < 1 {
        bail!("--days must be at least 1");
    }
    Ok(TimeRange::new(now - Duration::days(args.days), now)?)
}

fn local_midnight(date: NaiveDate, tz: FixedOffset) -> Result<DateTime<FixedOffset>> {
    let naive = date
        .and_hms_opt(0, 0, 0)
        .context("date has no midnight")?;
    tz.from_local_datetime(&naive)
        .single()
        .context("ambiguous local midnight")
}

fn require<'a>(value: &'a str, key: &str) -> Result<&'a str> {
    if value.is_empty() {
        bail!("missing configuration: {key}");
    }
    Ok(value)
}
