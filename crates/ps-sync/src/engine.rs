//! The reconciliation engine.
//!
//! One invocation covers one time window: fetch the vendor payloads,
//! normalize them, diff each event type against the destination's most
//! recent record, and issue the resulting writes in time order. Every
//! write is a create except the single basal extension case, which
//! updates in place.

use ps_core::{
    BolusEvent, IobReading, Normalizer, TimeRange, Treatment, classify_sections, decode_table,
};
use thiserror::Error;

use crate::basal::plan_basal;
use crate::entry::{BASAL_EVENTTYPE, BOLUS_EVENTTYPE, Entity, Entry, IOB_ACTIVITYTYPE};
use crate::gateway::{DestinationRecord, Gateway, GatewayError};
use crate::source::{SourceError, TherapySource};

/// A failure anywhere in one sync invocation. The run stops at the first
/// error; recovery is a later re-run against the same window.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// One planned destination write. Carries both the canonical treatment
/// (for inspection and logging) and the wire-ready entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOp {
    Create {
        treatment: Treatment,
        entry: Entry,
    },
    Update {
        id: String,
        treatment: Treatment,
        entry: Entry,
    },
}

impl SyncOp {
    pub const fn entry(&self) -> &Entry {
        match self {
            Self::Create { entry, .. } | Self::Update { entry, .. } => entry,
        }
    }

    pub const fn treatment(&self) -> &Treatment {
        match self {
            Self::Create { treatment, .. } | Self::Update { treatment, .. } => treatment,
        }
    }
}

/// The writes planned for one event type, in time order, plus the count
/// of events found already synced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncPlan {
    pub ops: Vec<SyncOp>,
    pub skipped: usize,
}

/// Outcome counters for one event type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl SyncStats {
    /// Records that would be (or were) written.
    pub const fn written(&self) -> usize {
        self.created + self.updated
    }
}

/// Outcome of one full invocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub basal: SyncStats,
    pub bolus: SyncStats,
    pub iob: SyncStats,
    /// Glucose readings seen in the export. Counted for visibility only;
    /// a CGM uploader owns that data.
    pub readings_seen: usize,
}

impl SyncSummary {
    pub const fn written(&self) -> usize {
        self.basal.written() + self.bolus.written() + self.iob.written()
    }
}

/// Plans bolus creates: completed boluses after the last uploaded record.
///
/// Boluses are terminal events, so there is no update case; at or before
/// the boundary means already synced.
pub fn plan_bolus(events: &[BolusEvent], last: Option<&DestinationRecord>) -> SyncPlan {
    let mut events = events.to_vec();
    events.sort_by_key(|e| e.completion_time);

    let mut plan = SyncPlan::default();
    for event in events {
        if last.is_some_and(|record| event.completion_time <= record.created_at) {
            tracing::debug!(completion = %event.completion_time, "bolus already synced");
            plan.skipped += 1;
            continue;
        }
        let entry = Entry::bolus(&event);
        plan.ops.push(SyncOp::Create {
            treatment: Treatment::Bolus(event),
            entry,
        });
    }
    plan
}

/// Plans IOB creates: readings after the last uploaded activity record.
pub fn plan_iob(readings: &[IobReading], last: Option<&DestinationRecord>) -> SyncPlan {
    let mut readings = readings.to_vec();
    readings.sort_by_key(|r| r.time);

    let mut plan = SyncPlan::default();
    for reading in readings {
        if last.is_some_and(|record| reading.time <= record.created_at) {
            plan.skipped += 1;
            continue;
        }
        let entry = Entry::iob(&reading);
        plan.ops.push(SyncOp::Create {
            treatment: Treatment::Iob(reading),
            entry,
        });
    }
    plan
}

/// Issues a plan's writes in order. In dry-run mode every write is logged
/// and counted but nothing is sent.
pub fn apply<G: Gateway>(
    gateway: &mut G,
    plan: &SyncPlan,
    dry_run: bool,
) -> Result<SyncStats, GatewayError> {
    let mut stats = SyncStats {
        skipped: plan.skipped,
        ..SyncStats::default()
    };
    for op in &plan.ops {
        match op {
            SyncOp::Create { entry, .. } => {
                if dry_run {
                    tracing::info!(
                        kind = entry.label(),
                        created_at = %entry.created_at,
                        "pretend: would create"
                    );
                } else {
                    tracing::info!(
                        kind = entry.label(),
                        created_at = %entry.created_at,
                        "creating record"
                    );
                    gateway.create(entry)?;
                }
                stats.created += 1;
            }
            SyncOp::Update { id, entry, .. } => {
                if dry_run {
                    tracing::info!(
                        kind = entry.label(),
                        created_at = %entry.created_at,
                        id = %id,
                        "pretend: would update"
                    );
                } else {
                    tracing::info!(
                        kind = entry.label(),
                        created_at = %entry.created_at,
                        id = %id,
                        "updating record"
                    );
                    gateway.update(id, entry)?;
                }
                stats.updated += 1;
            }
        }
    }
    Ok(stats)
}

/// Runs one sync invocation over a time window.
///
/// The CSV export is required; the therapy timeline is preferred for
/// basal data but pumps without Control-IQ have no timeline endpoint, so
/// a fetch failure there degrades to the CSV basal section with a
/// warning.
pub fn process_time_range<S, G>(
    source: &S,
    gateway: &mut G,
    range: &TimeRange,
    dry_run: bool,
) -> Result<SyncSummary, SyncError>
where
    S: TherapySource,
    G: Gateway,
{
    let csv = source.therapy_timeline_csv(range)?;
    let sections = classify_sections(&csv);
    let normalizer = Normalizer::new(range.start.timezone());

    let segments = match source.therapy_timeline(range) {
        Ok(timeline) => normalizer.basal_from_timeline(&timeline),
        Err(err) => {
            tracing::warn!(%err, "therapy timeline unavailable, deriving basal from CSV export");
            normalizer.basal_from_csv(&decode_table(sections.basal.as_ref()), range.end)
        }
    };
    let boluses = normalizer.boluses(&decode_table(sections.bolus.as_ref()));
    let iob = normalizer.iob_readings(&decode_table(sections.iob.as_ref()));
    let readings_seen = normalizer.readings(&decode_table(sections.reading.as_ref())).len();

    let last_basal = gateway.last_uploaded(BASAL_EVENTTYPE)?;
    let basal_stats = apply(gateway, &plan_basal(&segments, last_basal.as_ref()), dry_run)?;

    let last_bolus = gateway.last_uploaded(BOLUS_EVENTTYPE)?;
    let bolus_stats = apply(gateway, &plan_bolus(&boluses, last_bolus.as_ref()), dry_run)?;

    let last_iob = gateway.last_uploaded_activity(IOB_ACTIVITYTYPE)?;
    let iob_stats = apply(gateway, &plan_iob(&iob, last_iob.as_ref()), dry_run)?;

    // A fresher IOB record supersedes the previous one; only the newest
    // reading is meaningful, so the replaced record is removed.
    if !dry_run && iob_stats.created > 0 {
        if let Some(id) = last_iob.and_then(|record| record.id) {
            tracing::info!(id = %id, "removing superseded IOB record");
            gateway.delete(Entity::Activity, &id)?;
        }
    }

    let summary = SyncSummary {
        basal: basal_stats,
        bolus: bolus_stats,
        iob: iob_stats,
        readings_seen,
    };
    tracing::info!(
        basal_created = summary.basal.created,
        basal_updated = summary.basal.updated,
        bolus_created = summary.bolus.created,
        iob_created = summary.iob.created,
        readings_seen = summary.readings_seen,
        dry_run,
        "sync window complete"
    );
    Ok(summary)
}
