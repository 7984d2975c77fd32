//! Reconciliation of canonical pump treatments against a diary service.
//!
//! The engine is pure planning plus trait-driven I/O:
//! - `source`/`gateway` define the two collaborators as traits
//! - `basal` merges contiguous segments and plans the single update path
//! - `engine` plans bolus and IOB creates and drives one invocation

pub mod basal;
pub mod engine;
pub mod entry;
pub mod gateway;
pub mod source;

pub use basal::{merge_contiguous, plan_basal};
pub use engine::{
    SyncError, SyncOp, SyncPlan, SyncStats, SyncSummary, apply, plan_bolus, plan_iob,
    process_time_range,
};
pub use entry::{
    BASAL_EVENTTYPE, BOLUS_EVENTTYPE, ENTERED_BY, ENTRY_TIME_FORMAT, Entity, Entry,
    IOB_ACTIVITYTYPE, format_entry_time, parse_entry_time,
};
pub use gateway::{DestinationRecord, Gateway, GatewayError};
pub use source::{SourceError, TherapySource};
