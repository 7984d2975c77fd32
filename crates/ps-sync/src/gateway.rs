//! Narrow interface to the destination diary service.
//!
//! The engine only depends on this trait: one recency query per event
//! type plus write primitives. The HTTP implementation lives in `ps-api`;
//! tests substitute in-memory fakes.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use thiserror::Error;

use crate::entry::{Entity, Entry, parse_entry_time};

/// Destination gateway failures. All are fatal to the current invocation;
/// recovery is a later re-run, not an in-run retry.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The destination answered with a non-2xx status.
    #[error("destination API HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The destination could not be reached.
    #[error("destination transport error: {0}")]
    Transport(String),

    /// The destination returned a record this system cannot interpret.
    #[error("invalid destination record: {0}")]
    InvalidRecord(String),
}

/// An already-persisted destination record, as much of it as
/// reconciliation needs.
///
/// `rate` and `reason` may be absent on records written by other tools;
/// the extension check treats a missing field as matching.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRecord")]
pub struct DestinationRecord {
    pub id: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    /// Minutes.
    pub duration: Option<f64>,
    pub rate: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    created_at: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    rate: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

impl TryFrom<RawRecord> for DestinationRecord {
    type Error = String;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let created_at = parse_entry_time(&raw.created_at)
            .ok_or_else(|| format!("unparseable created_at: {}", raw.created_at))?;
        Ok(Self {
            id: raw.id,
            created_at,
            duration: raw.duration,
            rate: raw.rate,
            reason: raw.reason,
        })
    }
}

/// Write access to the destination diary service.
pub trait Gateway {
    /// The most recent treatment record with the given event type, if any.
    fn last_uploaded(&self, event_type: &str) -> Result<Option<DestinationRecord>, GatewayError>;

    /// The most recent activity record with the given activity type.
    fn last_uploaded_activity(
        &self,
        activity_type: &str,
    ) -> Result<Option<DestinationRecord>, GatewayError>;

    /// Persists a new record. Never supplies an id.
    fn create(&mut self, entry: &Entry) -> Result<(), GatewayError>;

    /// Rewrites an existing record in place, preserving its id.
    fn update(&mut self, id: &str, entry: &Entry) -> Result<(), GatewayError>;

    /// Removes a record. Only the IOB replacement path uses this.
    fn delete(&mut self, entity: Entity, id: &str) -> Result<(), GatewayError>;
}
