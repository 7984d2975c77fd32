//! Canonical treatment types and payload parsing for pumpsync.
//!
//! This crate turns loosely-structured vendor payloads into typed records:
//! - Section splitting: carving the multi-block CSV export into labeled blocks
//! - Tabular decoding: header-keyed records from quoted CSV rows
//! - Normalization: canonical treatments with timezone-aware timestamps

pub mod section;
pub mod table;
pub mod tandem;
pub mod treatment;

pub use section::{RawSection, SectionKind, TherapySections, classify_sections, split_sections};
pub use table::{Table, TabularRecord, decode_table};
pub use tandem::{BasalPoint, BasalTimeline, Normalizer, TherapyTimeline};
pub use treatment::{
    BasalSegment, BolusEvent, DeliveryType, ExtendedBolus, IobReading, Reading, TimeRange,
    Treatment, ValidationError,
};
