//! Basal merge-and-extend reconciliation.
//!
//! The timeline reports basal delivery as many short segments (often one
//! per five-minute algorithm cycle). Uploading each as its own record
//! would flood the destination, so consecutive segments with the same
//! rate and delivery type are coalesced first. The still-open tail
//! segment grows across runs; it is extended in place via the engine's
//! only update path.

use ps_core::{BasalSegment, Treatment};

use crate::engine::{SyncOp, SyncPlan};
use crate::entry::Entry;
use crate::gateway::DestinationRecord;

/// Coalesces consecutive segments with equal `(rate, delivery)` and
/// exactly contiguous spans (end == next start at 1-second resolution)
/// into single segments with summed duration.
///
/// Input is sorted defensively; output is temporally ordered.
pub fn merge_contiguous(mut segments: Vec<BasalSegment>) -> Vec<BasalSegment> {
    segments.sort_by_key(|s| s.start);

    let mut merged: Vec<BasalSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        if let Some(last) = merged.last_mut() {
            if rates_equal(last.rate, segment.rate)
                && last.delivery == segment.delivery
                && last.end() == segment.start
            {
                last.duration_mins += segment.duration_mins;
                continue;
            }
        }
        merged.push(segment);
    }
    merged
}

/// Plans destination writes for a basal segment sequence.
///
/// Per merged segment, against the point-in-time `last_uploaded` record:
/// - start before the record: already synced, skip;
/// - start equal to the record: the extension case updates in place when
///   rate and delivery match and the rounded duration strictly grew,
///   otherwise skip (inclusive boundary);
/// - start after the record (or no record): create.
pub fn plan_basal(segments: &[BasalSegment], last: Option<&DestinationRecord>) -> SyncPlan {
    let mut plan = SyncPlan::default();
    for segment in merge_contiguous(segments.to_vec()) {
        match last {
            Some(record) if segment.start < record.created_at => {
                tracing::debug!(start = %segment.start, "basal segment already synced");
                plan.skipped += 1;
            }
            Some(record) if segment.start == record.created_at => {
                if let Some(id) = extension_id(record, &segment) {
                    let entry = Entry::basal(&segment);
                    plan.ops.push(SyncOp::Update {
                        id,
                        treatment: Treatment::Basal(segment),
                        entry,
                    });
                } else {
                    tracing::debug!(start = %segment.start, "basal segment unchanged");
                    plan.skipped += 1;
                }
            }
            _ => {
                let entry = Entry::basal(&segment);
                plan.ops.push(SyncOp::Create {
                    treatment: Treatment::Basal(segment),
                    entry,
                });
            }
        }
    }
    plan
}

/// Returns the destination id to update when `segment` extends `record`.
///
/// A record missing `rate` or `reason` (written by another tool) is
/// treated as matching: the strictly-larger duration requirement still
/// gates the update, so a wrong match degrades to a skip, never a
/// duplicate.
fn extension_id(record: &DestinationRecord, segment: &BasalSegment) -> Option<String> {
    let rate_matches = record.rate.is_none_or(|r| rates_equal(r, segment.rate));
    let reason_matches = record
        .reason
        .as_deref()
        .is_none_or(|r| r == segment.delivery.as_str());
    let grew = record.duration.unwrap_or(0.0).round() < segment.duration_mins.round();

    if rate_matches && reason_matches && grew {
        record.id.clone()
    } else {
        None
    }
}

fn rates_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
