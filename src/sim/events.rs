//! Outbound event callbacks (spec §6 "Outputs").
//!
//! The teacher reports state changes through Bevy `MessageWriter<T>`
//! queues consumed by downstream systems (`simulation/events.rs`). There
//! is no ECS message bus here, so the same "something happened, tell the
//! host" shape becomes a plain trait with default no-op methods: a caller
//! that doesn't care about events links against this crate and pays
//! nothing for a queue it never drains.

use super::edge::EdgeIndex;
use super::fixed_math::FixedNum;

pub type VehicleId = usize;

/// Emitted when a transition lands the vehicle on an edge whose
/// `from_node` doesn't match the edge it just left's `to_node` (spec
/// §4.5 step 6, §4.11).
#[derive(Debug, Clone)]
pub struct UnusualMoveEvent {
    pub vehicle: VehicleId,
    pub prev_edge_name: String,
    pub prev_to_node: String,
    pub next_edge_name: String,
    pub next_from_node: String,
    pub pos_x: FixedNum,
    pub pos_y: FixedNum,
}

/// Callback surface a host implements to observe per-tick movement
/// events. Both methods default to no-ops.
pub trait SimEvents {
    /// Called once per successful edge transition (spec §6).
    fn on_edge_transit(
        &mut self,
        _vehicle: VehicleId,
        _from_edge_index: EdgeIndex,
        _to_edge_index: EdgeIndex,
        _simulation_time_ms: i64,
    ) {
    }

    /// Called when a transition is topologically disconnected. The
    /// simulation continues regardless (spec §4.11, §7).
    fn on_unusual_move(&mut self, _event: UnusualMoveEvent) {}
}

/// Convenience implementation for callers that want no event handling at
/// all, e.g. headless batch runs.
pub struct NoOpEvents;

impl SimEvents for NoOpEvents {}
