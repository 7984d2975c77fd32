//! Destination record shapes for the diary service.
//!
//! Each canonical event type maps to one fixed entry shape. Timestamps are
//! written as `"YYYY-MM-DD HH:MM:SS±HH:MM"` strings; numeric fields are
//! rounded to the source's native precision before upload.

use chrono::{DateTime, FixedOffset};
use ps_core::{BasalSegment, BolusEvent, IobReading};
use serde::Serialize;

/// Event category label for basal treatment records.
pub const BASAL_EVENTTYPE: &str = "Temp Basal";
/// Event category label for bolus treatment records.
pub const BOLUS_EVENTTYPE: &str = "Combo Bolus";
/// Activity category label for insulin-on-board records.
pub const IOB_ACTIVITYTYPE: &str = "pumpsync IOB";
/// Attribution written on every uploaded record.
pub const ENTERED_BY: &str = "Pump (pumpsync)";

/// Timestamp format used in destination records.
pub const ENTRY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Which destination collection an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Treatments,
    Activity,
}

impl Entity {
    /// The REST path segment for this collection.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Treatments => "treatments",
            Self::Activity => "activity",
        }
    }
}

/// A destination record ready for upload.
///
/// A create never supplies an id; the id for an update travels out of band
/// (see `SyncOp::Update`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    #[serde(skip)]
    pub entity: Entity,
    #[serde(rename = "eventType", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(rename = "activityType", skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insulin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iob: Option<f64>,
    #[serde(rename = "enteredBy")]
    pub entered_by: String,
}

impl Entry {
    fn empty(entity: Entity, created_at: DateTime<FixedOffset>) -> Self {
        Self {
            entity,
            event_type: None,
            activity_type: None,
            created_at: format_entry_time(created_at),
            reason: None,
            duration: None,
            absolute: None,
            rate: None,
            carbs: None,
            insulin: None,
            notes: None,
            iob: None,
            entered_by: ENTERED_BY.to_string(),
        }
    }

    /// A temp-basal treatment record for one segment.
    pub fn basal(segment: &BasalSegment) -> Self {
        let rate = round3(segment.rate);
        Self {
            event_type: Some(BASAL_EVENTTYPE.to_string()),
            reason: Some(segment.delivery.as_str().to_string()),
            duration: Some(segment.duration_mins),
            absolute: Some(rate),
            rate: Some(rate),
            ..Self::empty(Entity::Treatments, segment.start)
        }
    }

    /// A bolus treatment record, with the override-suffix rule applied to
    /// the notes field.
    pub fn bolus(event: &BolusEvent) -> Self {
        Self {
            event_type: Some(BOLUS_EVENTTYPE.to_string()),
            insulin: Some(round2(event.insulin)),
            carbs: Some(round2(event.carbs)),
            notes: Some(event.notes()),
            ..Self::empty(Entity::Treatments, event.completion_time)
        }
    }

    /// An insulin-on-board activity record.
    pub fn iob(reading: &IobReading) -> Self {
        Self {
            activity_type: Some(IOB_ACTIVITYTYPE.to_string()),
            iob: Some(round2(reading.value)),
            ..Self::empty(Entity::Activity, reading.time)
        }
    }

    /// The category label of this entry, whichever collection it targets.
    pub fn label(&self) -> &str {
        self.event_type
            .as_deref()
            .or(self.activity_type.as_deref())
            .unwrap_or("")
    }
}

/// Formats an instant in the destination's documented timestamp format.
pub fn format_entry_time(instant: DateTime<FixedOffset>) -> String {
    instant.format(ENTRY_TIME_FORMAT).to_string()
}

/// Parses a destination timestamp: the documented format first, RFC 3339
/// as a fallback for records written by other tools.
pub fn parse_entry_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, ENTRY_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
