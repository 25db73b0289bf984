//! Setup-time fault types.
//!
//! Everything in here is detected once, at graph/buffer construction, never
//! at tick time (spec §7: "Programmer errors ... detected at setup,
//! surfaced to the collaborator, never reached at tick time").

use thiserror::Error;

/// A configuration fault caught during [`crate::sim::edge::EdgeGraph::build`]
/// or [`crate::sim::vehicle::VehicleBuffer::new`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("edge {0:?} has non-positive distance")]
    ZeroDistanceEdge(String),
    #[error("duplicate edge name {0:?}")]
    DuplicateEdgeName(String),
    #[error("vehicle capacity must be greater than zero")]
    ZeroVehicleCapacity,
}
