//! Server-to-local reconciliation.

pub mod delta;

pub use delta::{DeltaSynchronizer, POLL_INTERVAL};
