//! CLI command implementations.

pub mod check;
pub mod sync;
pub mod watch;
