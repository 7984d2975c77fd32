//! Canonical treatment types, independent of source payload shape.

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for canonical types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid basal delivery type value.
    #[error("invalid delivery type: {value}")]
    InvalidDeliveryType { value: String },

    /// The range end was not after its start.
    #[error("time range end {end} is not after start {start}")]
    EmptyTimeRange { start: String, end: String },
}

/// How a basal segment was scheduled by the pump.
///
/// The vendor timeline reports basal delivery in three separate event lists;
/// the tag is attached during normalization. `Unspecified` is used for basal
/// data derived from the CSV fallback, which carries no delivery information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeliveryType {
    #[default]
    Unspecified,
    /// A temporary rate set by the user.
    Temp,
    /// The pump's programmed basal profile.
    Profile,
    /// An algorithm-adjusted rate.
    Algorithm,
}

impl DeliveryType {
    /// String representation, matching the vendor's event list names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "",
            Self::Temp => "tempDelivery",
            Self::Profile => "profileDelivery",
            Self::Algorithm => "algorithmDelivery",
        }
    }
}

impl fmt::Display for DeliveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeliveryType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::Unspecified),
            "tempDelivery" => Ok(Self::Temp),
            "profileDelivery" => Ok(Self::Profile),
            "algorithmDelivery" => Ok(Self::Algorithm),
            _ => Err(ValidationError::InvalidDeliveryType {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for DeliveryType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeliveryType> for String {
    fn from(value: DeliveryType) -> Self {
        value.as_str().to_string()
    }
}

/// A half-open time window `[start, end)` for one sync invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeRange {
    /// Creates a range, rejecting empty or inverted windows.
    pub fn new(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::EmptyTimeRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: DateTime<FixedOffset>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// One basal delivery segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasalSegment {
    /// Units per hour.
    pub rate: f64,
    /// Segment length in minutes. Zero is valid for an instantaneous
    /// profile change reported by the timeline.
    pub duration_mins: f64,
    pub start: DateTime<FixedOffset>,
    pub delivery: DeliveryType,
}

impl BasalSegment {
    /// The segment's end instant, at 1-second resolution.
    ///
    /// Source durations are integral seconds, so rounding here loses
    /// nothing and keeps contiguity checks exact.
    pub fn end(&self) -> DateTime<FixedOffset> {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "durations are bounded by the sync window"
        )]
        let secs = (self.duration_mins * 60.0).round() as i64;
        self.start + Duration::seconds(secs)
    }
}

/// An extended ("bolex") portion of a bolus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedBolus {
    pub start_time: DateTime<FixedOffset>,
    pub completion_time: DateTime<FixedOffset>,
}

/// A completed insulin bolus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BolusEvent {
    /// Units delivered.
    pub insulin: f64,
    /// Grams of carbohydrate entered for the bolus.
    pub carbs: f64,
    pub request_time: DateTime<FixedOffset>,
    pub completion_time: DateTime<FixedOffset>,
    pub description: String,
    /// The user overrode the pump's calculated dose.
    pub user_override: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended: Option<ExtendedBolus>,
}

impl BolusEvent {
    /// The description used downstream in the destination's notes field.
    ///
    /// An operator-adjusted standard bolus is indistinguishable from a
    /// plain one by description alone, so it gains an explicit suffix.
    pub fn notes(&self) -> String {
        if self.user_override && self.description == "Standard" {
            format!("{} (Override)", self.description)
        } else {
            self.description.clone()
        }
    }
}

/// An insulin-on-board reading reported by the pump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IobReading {
    /// Units on board.
    pub value: f64,
    pub time: DateTime<FixedOffset>,
}

/// A CGM/BGM glucose reading from the reading section.
///
/// Readings are normalized and counted but have no destination mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// mg/dL.
    pub value: f64,
    pub time: DateTime<FixedOffset>,
}

/// A normalized, typed event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Treatment {
    Basal(BasalSegment),
    Bolus(BolusEvent),
    Iob(IobReading),
}

impl Treatment {
    /// The timestamp used as the reconciliation key for this event.
    ///
    /// Basal segments key on their start, boluses on completion, IOB on
    /// the reading time.
    pub fn key_time(&self) -> DateTime<FixedOffset> {
        match self {
            Self::Basal(b) => b.start,
            Self::Bolus(b) => b.completion_time,
            Self::Iob(i) => i.time,
        }
    }
}
