//! Edge transition (component C7, spec §4.5–§4.6).
//!
//! Grounded on the teacher's `simulation/systems.rs` staged
//! physics-then-commit pipeline style (compute into locals, then write
//! back once), adapted into the repeated-while-overflowing loop the spec
//! requires for transitions that skip an entire short edge in one tick.

use super::edge::{CurveDirection, EdgeGraph, EdgeIndex, RailType};
use super::events::{SimEvents, UnusualMoveEvent};
use super::fixed_math::FixedNum;
use super::lock::LockManager;
use super::transfer::{refill_window, TransferManager};
use super::vehicle::{NextEdgeState, StopReason, TrafficState, VehicleBuffer};

/// Sensor preset selected after a transition (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorPreset {
    Straight,
    CurveLeft,
    CurveRight,
    UTurn,
}

/// Maps rail type + curve direction to a sensor preset (spec §4.6).
pub fn select_sensor_preset(rail_type: RailType, curve_direction: CurveDirection) -> SensorPreset {
    if rail_type == RailType::Curve180 {
        SensorPreset::UTurn
    } else if rail_type == RailType::LeftCurve || curve_direction == CurveDirection::Left {
        SensorPreset::CurveLeft
    } else if rail_type == RailType::RightCurve || curve_direction == CurveDirection::Right {
        SensorPreset::CurveRight
    } else {
        SensorPreset::Straight
    }
}

/// Result of running [`transition`] to completion.
pub struct TransitionOutcome {
    pub final_edge_index: EdgeIndex,
    pub final_ratio: FixedNum,
    /// `false` if the vehicle ended up on a missing/out-of-range edge
    /// (spec §4.11: clamp and keep the vehicle on its current edge).
    pub active_edge: bool,
}

/// Runs the edge-transition algorithm (spec §4.5) starting from
/// `(vehicle's current edge, ratio)`, repeating while `ratio >= 1` and a
/// valid current edge exists. Mutates `buf`'s movement columns for
/// `vehicle` in place.
#[allow(clippy::too_many_arguments)]
pub fn transition(
    graph: &EdgeGraph,
    buf: &mut VehicleBuffer,
    lock_mgr: &LockManager,
    transfer: &mut TransferManager,
    vehicle: usize,
    mut ratio: FixedNum,
    preserve_target_ratio: bool,
    mut next_target_ratio: Option<FixedNum>,
    simulation_time_ms: i64,
    events: &mut dyn SimEvents,
) -> TransitionOutcome {
    let mut current_index = buf.current_edge_index[vehicle];

    loop {
        let Some(current) = graph.get(current_index) else {
            return TransitionOutcome {
                final_edge_index: current_index,
                final_ratio: ratio,
                active_edge: false,
            };
        };
        if ratio < FixedNum::ONE {
            break;
        }

        // Step 1: overflow distance carried past the edge end.
        let overflow = (ratio - FixedNum::ONE) * FixedNum::from_num(current.distance);

        // Step 2: peek next-edge window.
        let n = buf.next_edge[vehicle][0];
        let state = buf.next_edge_state[vehicle];

        // Step 3: lock gate.
        let current_blocked = current.to_node_is_merge && !lock_mgr.check_grant(&current.to_node, vehicle);
        let next_blocked = n != 0
            && graph
                .get(n)
                .map(|e| e.rail_type.is_curve() && e.to_node_is_merge && !lock_mgr.check_grant(&e.to_node, vehicle))
                .unwrap_or(false);
        if current_blocked || next_blocked {
            ratio = FixedNum::ONE;
            break;
        }

        // Step 4: window not ready.
        if state != NextEdgeState::Ready || n == 0 {
            ratio = FixedNum::ONE;
            break;
        }

        // Step 5: resolve next edge.
        let Some(next_edge) = graph.get(n) else {
            ratio = FixedNum::ONE;
            break;
        };
        let next_edge = next_edge.clone();

        // Step 6: unusual-move detection.
        if current.to_node != next_edge.from_node {
            events.on_unusual_move(UnusualMoveEvent {
                vehicle,
                prev_edge_name: current.edge_name.clone(),
                prev_to_node: current.to_node.clone(),
                next_edge_name: next_edge.edge_name.clone(),
                next_from_node: next_edge.from_node.clone(),
                pos_x: buf.x[vehicle],
                pos_y: buf.y[vehicle],
            });
        }

        // Step 7: move onto the new edge; pick sensor preset.
        let new_ratio = overflow / FixedNum::from_num(next_edge.distance);
        let preset = select_sensor_preset(next_edge.rail_type, next_edge.curve_direction);
        buf.preset_idx[vehicle] = preset as u32;

        // Step 8: reset traffic state, clear LOCKED.
        buf.traffic_state[vehicle] = TrafficState::Free;
        buf.stop_reason[vehicle].remove(StopReason::LOCKED);

        let passed_edge_name = current.edge_name.clone();
        events.on_edge_transit(vehicle, current_index, n, simulation_time_ms);

        // Step 9: shift path, refill window.
        buf.current_edge_index[vehicle] = n;
        buf.edge_ratio[vehicle] = new_ratio;
        transfer.on_edge_transition(buf, vehicle, &passed_edge_name);
        refill_window(graph, buf, lock_mgr, vehicle);

        // Step 10: target ratio resolution.
        if let Some(reserved) = next_target_ratio.take() {
            buf.target_ratio[vehicle] = reserved;
        } else if !preserve_target_ratio {
            buf.target_ratio[vehicle] = FixedNum::ONE;
        }
        // else: preserve_target_ratio with no reservation — leave
        // target_ratio untouched (spec Design Notes Open Question 3).

        // Step 11: advance and loop.
        current_index = n;
        ratio = new_ratio;
    }

    TransitionOutcome {
        final_edge_index: current_index,
        final_ratio: ratio,
        active_edge: true,
    }
}
