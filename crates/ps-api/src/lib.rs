//! HTTP clients for pumpsync's two remote services.
//!
//! - `tconnect`: the vendor cloud (timeline JSON + CSV export), as the
//!   engine's `TherapySource`
//! - `nightscout`: the destination diary service, as the engine's
//!   `Gateway`

pub mod nightscout;
pub mod tconnect;

pub use nightscout::NightscoutApi;
pub use tconnect::TConnectApi;
