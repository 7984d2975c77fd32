//! Interface to the vendor cloud extraction collaborator.

use ps_core::{TherapyTimeline, TimeRange};
use thiserror::Error;

/// Source extraction failures. Fatal to the current invocation; the
/// timeline fetch additionally has a CSV fallback in the engine.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The vendor API answered with a non-2xx status.
    #[error("source API HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The vendor API could not be reached.
    #[error("source transport error: {0}")]
    Transport(String),

    /// The vendor returned a payload this system cannot interpret.
    #[error("invalid source payload: {0}")]
    InvalidPayload(String),
}

/// Read access to the vendor cloud for one account.
pub trait TherapySource {
    /// The Control-IQ therapy timeline (JSON) for a window.
    ///
    /// Pumps without Control-IQ have no timeline endpoint; callers fall
    /// back to the CSV basal section.
    fn therapy_timeline(&self, range: &TimeRange) -> Result<TherapyTimeline, SourceError>;

    /// The raw multi-section CSV export for a window.
    fn therapy_timeline_csv(&self, range: &TimeRange) -> Result<String, SourceError>;
}
