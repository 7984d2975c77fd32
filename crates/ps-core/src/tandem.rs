//! Normalizing vendor payloads into canonical treatments.
//!
//! Two independent source shapes feed the same canonical types: the
//! Control-IQ therapy timeline (JSON, basal only) and the WS2 CSV export
//! (bolus, IOB, glucose readings, plus a basal fallback for pumps without
//! a timeline endpoint). Vendor timestamps are naive local time and are
//! localized to a fixed UTC offset here; nothing downstream ever compares
//! a naive timestamp.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde::Deserialize;

use crate::table::{Table, TabularRecord};
use crate::treatment::{
    BasalSegment, BolusEvent, DeliveryType, ExtendedBolus, IobReading, Reading,
};

/// Naive local-time format used throughout the CSV export.
const VENDOR_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Epoch base of the timeline's `x` values. These are not true instants:
/// the vendor encodes the pump's wall clock as seconds since the epoch at
/// UTC-07:00.
const TIMELINE_EPOCH_OFFSET_SECS: i64 = -7 * 3600;

/// Known source column names, per record family. Anything else in a
/// decoded header is logged rather than silently dropped.
mod col {
    pub const EVENT_DATE_TIME: &str = "EventDateTime";

    pub const READING_KNOWN: &[&str] = &[
        "DeviceType",
        "SerialNumber",
        "Description",
        EVENT_DATE_TIME,
        READING_VALUE,
    ];
    pub const READING_VALUE: &str = "Readings (CGM / BGM)";

    pub const IOB_KNOWN: &[&str] = &["Type", "EventID", EVENT_DATE_TIME, "IOB"];
    pub const IOB_VALUE: &str = "IOB";

    pub const BASAL_KNOWN: &[&str] = &["Type", "EventID", EVENT_DATE_TIME, "BasalRate"];
    pub const BASAL_RATE: &str = "BasalRate";

    pub const BOLUS_KNOWN: &[&str] = &[
        "Type",
        "Description",
        "BG",
        "IOB",
        "BolusRequestID",
        "BolusCompletionID",
        "CompletionDateTime",
        "InsulinDelivered",
        "FoodDelivered",
        "CorrectionDelivered",
        "CompletionStatusID",
        "CompletionStatusDesc",
        "BolusIsComplete",
        "BolexCompletionID",
        "BolexSize",
        "BolexStartDateTime",
        "BolexCompletionDateTime",
        "BolexInsulinDelivered",
        "BolexIOB",
        "BolexCompletionStatusID",
        "BolexCompletionStatusDesc",
        "ExtendedBolusIsComplete",
        EVENT_DATE_TIME,
        "RequestDateTime",
        "BolusType",
        "BolusRequestOptions",
        "StandardPercent",
        "Duration",
        "CarbSize",
        "UserOverride",
        "TargetBG",
        "CorrectionFactor",
        "FoodBolusSize",
        "CorrectionBolusSize",
        "ActualTotalBolusRequested",
        "IsQuickBolus",
        "EventHistoryReportEventDesc",
        "EventHistoryReportDetails",
        "NoteID",
        "IndexID",
        "Note",
    ];
    pub const DESCRIPTION: &str = "Description";
    pub const REQUEST_DATE_TIME: &str = "RequestDateTime";
    pub const COMPLETION_DATE_TIME: &str = "CompletionDateTime";
    pub const INSULIN_DELIVERED: &str = "InsulinDelivered";
    pub const CARB_SIZE: &str = "CarbSize";
    pub const USER_OVERRIDE: &str = "UserOverride";
    pub const BOLEX_START: &str = "BolexStartDateTime";
    pub const BOLEX_COMPLETION: &str = "BolexCompletionDateTime";
}

/// One point from the vendor's basal timeline.
#[derive(Debug, Clone, Deserialize)]
pub struct BasalPoint {
    /// Unix seconds of the segment start.
    pub x: i64,
    /// Units per hour.
    pub y: f64,
    /// Segment length in seconds. Zero is a real value: an instantaneous
    /// profile change.
    pub duration: f64,
}

/// The basal portion of the Control-IQ therapy timeline response.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasalTimeline {
    #[serde(default)]
    pub temp_delivery_events: Vec<BasalPoint>,
    #[serde(default)]
    pub profile_delivery_events: Vec<BasalPoint>,
    #[serde(default)]
    pub algorithm_delivery_events: Vec<BasalPoint>,
}

/// Control-IQ therapy timeline response.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TherapyTimeline {
    #[serde(default)]
    pub basal: BasalTimeline,
}

/// Maps decoded rows and timeline points to canonical treatments with
/// timestamps localized to a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    tz: FixedOffset,
}

impl Normalizer {
    pub const fn new(tz: FixedOffset) -> Self {
        Self { tz }
    }

    /// Localizes a naive vendor timestamp string.
    pub fn parse_vendor_time(&self, raw: &str) -> Option<DateTime<FixedOffset>> {
        let naive = NaiveDateTime::parse_from_str(raw, VENDOR_TIME_FORMAT).ok()?;
        self.tz.from_local_datetime(&naive).single()
    }

    /// Recovers the wall clock from a timeline epoch and localizes it.
    fn from_unix(&self, secs: i64) -> Option<DateTime<FixedOffset>> {
        let wall = DateTime::from_timestamp(secs + TIMELINE_EPOCH_OFFSET_SECS, 0)?.naive_utc();
        self.tz.from_local_datetime(&wall).single()
    }

    /// Converts one timeline point. The delivery tag comes from which
    /// event list the point was found in.
    pub fn basal_from_point(
        &self,
        point: &BasalPoint,
        delivery: DeliveryType,
    ) -> Option<BasalSegment> {
        let start = self.from_unix(point.x)?;
        Some(BasalSegment {
            rate: point.y,
            duration_mins: point.duration / 60.0,
            start,
            delivery,
        })
    }

    /// Merges the timeline's delivery lists into one time-ordered segment
    /// sequence, tagged by origin.
    pub fn basal_from_timeline(&self, timeline: &TherapyTimeline) -> Vec<BasalSegment> {
        let tagged = [
            (&timeline.basal.temp_delivery_events, DeliveryType::Temp),
            (&timeline.basal.profile_delivery_events, DeliveryType::Profile),
            (
                &timeline.basal.algorithm_delivery_events,
                DeliveryType::Algorithm,
            ),
        ];

        let mut segments = Vec::new();
        for (points, delivery) in tagged {
            for point in points {
                match self.basal_from_point(point, delivery) {
                    Some(segment) => segments.push(segment),
                    None => {
                        tracing::warn!(x = point.x, "dropping timeline point with invalid timestamp");
                    }
                }
            }
        }
        segments.sort_by_key(|s| s.start);
        segments
    }

    /// Derives basal segments from the CSV basal section.
    ///
    /// Fallback path for pumps without a timeline endpoint. Rows carry
    /// only a rate and a start time; each segment runs until the next
    /// row's start, and the final segment until `range_end`.
    pub fn basal_from_csv(
        &self,
        table: &Table,
        range_end: DateTime<FixedOffset>,
    ) -> Vec<BasalSegment> {
        warn_unknown_columns("basal", table, col::BASAL_KNOWN);

        let mut starts: Vec<(DateTime<FixedOffset>, f64)> = Vec::new();
        for row in &table.rows {
            let parsed = self
                .time_field(row, col::EVENT_DATE_TIME)
                .zip(float_field(row, col::BASAL_RATE));
            match parsed {
                Some(entry) => starts.push(entry),
                None => tracing::warn!("dropping basal row with invalid time or rate"),
            }
        }
        starts.sort_by_key(|&(start, _)| start);

        let mut segments = Vec::with_capacity(starts.len());
        for (idx, &(start, rate)) in starts.iter().enumerate() {
            let end = starts.get(idx + 1).map_or(range_end, |&(next, _)| next);
            let duration_mins = duration_minutes(start, end);
            if duration_mins <= 0.0 {
                tracing::warn!(%start, "dropping basal row with non-positive duration");
                continue;
            }
            segments.push(BasalSegment {
                rate,
                duration_mins,
                start,
                delivery: DeliveryType::Unspecified,
            });
        }
        segments
    }

    /// Converts the bolus table, dropping incomplete or unparsable rows.
    pub fn boluses(&self, table: &Table) -> Vec<BolusEvent> {
        warn_unknown_columns("bolus", table, col::BOLUS_KNOWN);
        table
            .rows
            .iter()
            .filter_map(|row| {
                let bolus = self.bolus_from_row(row);
                if bolus.is_none() {
                    tracing::warn!("dropping bolus row with missing or invalid fields");
                }
                bolus
            })
            .collect()
    }

    /// Converts one bolus row, or `None` when a required field is absent
    /// or unparsable (e.g. an in-progress bolus with no completion time).
    pub fn bolus_from_row(&self, row: &TabularRecord) -> Option<BolusEvent> {
        let description = row.get(col::DESCRIPTION)?.clone();
        let request_time = self.time_field(row, col::REQUEST_DATE_TIME)?;
        let completion_time = self.time_field(row, col::COMPLETION_DATE_TIME)?;
        let insulin = float_field(row, col::INSULIN_DELIVERED)?;
        let carbs = float_field(row, col::CARB_SIZE)?;
        let user_override = row.get(col::USER_OVERRIDE).is_some_and(|v| v == "1");

        // Empty bolex columns mean no extended portion; an empty string is
        // not a time and must not be parsed as one.
        let extended = match (
            row.get(col::BOLEX_START).map(String::as_str),
            row.get(col::BOLEX_COMPLETION).map(String::as_str),
        ) {
            (Some(""), _) | (_, Some("")) | (None, _) | (_, None) => None,
            (Some(start), Some(completion)) => Some(ExtendedBolus {
                start_time: self.parse_vendor_time(start)?,
                completion_time: self.parse_vendor_time(completion)?,
            }),
        };

        Some(BolusEvent {
            insulin,
            carbs,
            request_time,
            completion_time,
            description,
            user_override,
            extended,
        })
    }

    /// Converts the IOB table, dropping unparsable rows with a warning.
    pub fn iob_readings(&self, table: &Table) -> Vec<IobReading> {
        warn_unknown_columns("iob", table, col::IOB_KNOWN);
        table
            .rows
            .iter()
            .filter_map(|row| {
                let reading = self
                    .time_field(row, col::EVENT_DATE_TIME)
                    .zip(float_field(row, col::IOB_VALUE))
                    .map(|(time, value)| IobReading { value, time });
                if reading.is_none() {
                    tracing::warn!("dropping IOB row with invalid time or value");
                }
                reading
            })
            .collect()
    }

    /// Converts the glucose reading table.
    pub fn readings(&self, table: &Table) -> Vec<Reading> {
        warn_unknown_columns("reading", table, col::READING_KNOWN);
        table
            .rows
            .iter()
            .filter_map(|row| {
                let reading = self
                    .time_field(row, col::EVENT_DATE_TIME)
                    .zip(float_field(row, col::READING_VALUE))
                    .map(|(time, value)| Reading { value, time });
                if reading.is_none() {
                    tracing::warn!("dropping glucose row with invalid time or value");
                }
                reading
            })
            .collect()
    }

    fn time_field(&self, row: &TabularRecord, name: &str) -> Option<DateTime<FixedOffset>> {
        row.get(name).and_then(|raw| self.parse_vendor_time(raw))
    }
}

/// Minutes between two instants as a float.
#[expect(
    clippy::cast_precision_loss,
    reason = "durations are bounded by the sync window"
)]
fn duration_minutes(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> f64 {
    (end - start).num_seconds() as f64 / 60.0
}

/// Empty or non-numeric values decode to `None`, never an error.
fn float_field(row: &TabularRecord, name: &str) -> Option<f64> {
    row.get(name).and_then(|raw| raw.trim().parse().ok())
}

fn warn_unknown_columns(kind: &str, table: &Table, known: &[&str]) {
    for header in &table.headers {
        if !known.contains(&header.as_str()) {
            tracing::warn!(column = %header, kind, "unknown source column");
        }
    }
}
