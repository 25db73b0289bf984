//! Movement update pipeline (component C8) and curve/merge pre-braking
//! (component C9), spec §4.7–§4.11.
//!
//! Grounded on the teacher's `simulation/physics.rs` `apply_velocity`
//! (clamp-then-integrate velocity into position every tick) and
//! `simulation/systems.rs` `follow_path` (per-tick steering toward the
//! next waypoint, deciding arrival/braking each tick), generalized from
//! two separate Bevy systems over a `Query` into three sequential phases
//! over one packed buffer, since there is no ECS schedule left to stage
//! them for us.

use super::config::{SimConfig, TransferMode};
use super::edge::{Edge, EdgeGraph};
use super::events::SimEvents;
use super::fixed_math::FixedNum;
use super::interpolate;
use super::lock::LockManager;
use super::speed;
use super::transfer::TransferManager;
use super::transition::transition;
use super::vehicle::{
    MovingStatus, NextEdgeState, StopReason, TrafficState, VehicleBuffer, HIT_ZONE_NONE, HIT_ZONE_STOP,
};

/// Runs one full tick over every active vehicle (spec §4.7).
///
/// `dt` is seconds, pre-clamped by the caller; `simulation_time_ms` is
/// used for request timestamps and the `on_edge_transit` callback.
#[allow(clippy::too_many_arguments)]
pub fn step(
    graph: &EdgeGraph,
    buf: &mut VehicleBuffer,
    lock_mgr: &mut LockManager,
    transfer: &mut TransferManager,
    config: &SimConfig,
    dt: FixedNum,
    simulation_time_ms: i64,
    events: &mut dyn SimEvents,
) {
    transfer.process_transfer_queue(graph, buf, lock_mgr, config.transfer_mode);

    for vehicle in 0..buf.active_count() {
        match buf.moving_status[vehicle] {
            MovingStatus::Paused => continue,
            MovingStatus::Stopped => {
                buf.velocity[vehicle] = FixedNum::ZERO;
                continue;
            }
            MovingStatus::Moving => {}
        }

        let entry_edge_index = buf.current_edge_index[vehicle];
        let Some(entry_edge) = graph.get(entry_edge_index) else {
            buf.velocity[vehicle] = FixedNum::ZERO;
            continue;
        };
        let entry_edge = entry_edge.clone();

        let raw_new_ratio = physics_phase(graph, buf, lock_mgr, transfer, config, vehicle, &entry_edge, dt, simulation_time_ms);

        let final_edge_index = transition_phase(
            graph,
            buf,
            lock_mgr,
            transfer,
            config,
            vehicle,
            entry_edge_index,
            &entry_edge,
            raw_new_ratio,
            simulation_time_ms,
            events,
        );

        position_phase(graph, buf, lock_mgr, config, vehicle, final_edge_index, simulation_time_ms);
    }
}

/// Phase 1 (spec §4.8): hit-zone resolution, three-way deceleration,
/// velocity integration. Returns `raw_new_ratio`.
#[allow(clippy::too_many_arguments)]
fn physics_phase(
    graph: &EdgeGraph,
    buf: &mut VehicleBuffer,
    lock_mgr: &LockManager,
    transfer: &mut TransferManager,
    config: &SimConfig,
    vehicle: usize,
    entry_edge: &Edge,
    dt: FixedNum,
    now_ms: i64,
) -> FixedNum {
    let raw_sensor = buf.hit_zone[vehicle];
    let hit_zone = if raw_sensor == HIT_ZONE_STOP {
        HIT_ZONE_STOP
    } else if buf.deceleration[vehicle] != FixedNum::ZERO {
        raw_sensor
    } else {
        HIT_ZONE_NONE
    };
    buf.hit_zone[vehicle] = hit_zone;

    if hit_zone == HIT_ZONE_STOP {
        buf.velocity[vehicle] = FixedNum::ZERO;
        buf.deceleration[vehicle] = FixedNum::ZERO;
        buf.stop_reason[vehicle].insert(StopReason::SENSORED);
        return buf.edge_ratio[vehicle];
    }
    buf.stop_reason[vehicle].remove(StopReason::SENSORED);

    let sensor_decel = if hit_zone >= 0 {
        -buf.deceleration[vehicle]
    } else {
        FixedNum::ZERO
    };

    let curve_braking = curve_pre_brake_decision(graph, buf, transfer, config, vehicle, now_ms);
    let curve_decel = if curve_braking {
        -config.linear_pre_brake_deceleration_fixed()
    } else {
        FixedNum::ZERO
    };

    let merge_braking = merge_pre_brake_decision(graph, buf, lock_mgr, config, vehicle);
    let merge_decel = if merge_braking {
        -config.linear_pre_brake_deceleration_fixed()
    } else {
        FixedNum::ZERO
    };

    let max_decel = sensor_decel.max(curve_decel).max(merge_decel);
    let applied_accel = if entry_edge.rail_type.is_curve() {
        config.curve_acceleration_fixed()
    } else {
        buf.acceleration[vehicle]
    };

    let (accel, decel) = if max_decel > FixedNum::ZERO {
        (FixedNum::ZERO, -max_decel)
    } else {
        (applied_accel, FixedNum::ZERO)
    };
    buf.acceleration[vehicle] = accel;
    buf.deceleration[vehicle] = decel;

    let new_velocity = speed::next_speed(
        buf.velocity[vehicle],
        accel,
        decel,
        entry_edge.rail_type,
        dt,
        config.linear_max_speed_fixed(),
        config.curve_max_speed_fixed(),
    );
    buf.velocity[vehicle] = new_velocity;

    buf.edge_ratio[vehicle] + new_velocity * dt / FixedNum::from_num(entry_edge.distance)
}

/// Curve pre-braking (spec §4.11). Brake state, once entered, persists
/// every tick (bypassing the check interval) until speed drops to the
/// curve max.
fn curve_pre_brake_decision(
    graph: &EdgeGraph,
    buf: &mut VehicleBuffer,
    transfer: &mut TransferManager,
    config: &SimConfig,
    vehicle: usize,
    now_ms: i64,
) -> bool {
    let current_idx = buf.current_edge_index[vehicle];
    let on_linear = graph.get(current_idx).map(|e| !e.rail_type.is_curve()).unwrap_or(false);
    if !on_linear {
        transfer.clear_curve_brake_state(buf, vehicle);
        return false;
    }

    if transfer.is_curve_braking(buf, vehicle) {
        if buf.velocity[vehicle] <= config.curve_max_speed_fixed() {
            transfer.clear_curve_brake_state(buf, vehicle);
            return false;
        }
        return true;
    }

    if !transfer.should_check_curve(buf, vehicle, now_ms, config.curve_pre_brake_check_interval) {
        return false;
    }
    transfer.record_curve_check(buf, vehicle, now_ms);

    let Some((_, distance)) = transfer.find_distance_to_next_curve(graph, buf, vehicle) else {
        return false;
    };
    let bd = speed::brake_distance(
        buf.velocity[vehicle],
        config.curve_max_speed_fixed(),
        config.linear_pre_brake_deceleration_fixed(),
    );
    if distance - bd <= FixedNum::ZERO {
        transfer.set_curve_braking(buf, vehicle, true);
        true
    } else {
        false
    }
}

/// Merge pre-braking (spec §4.8): brakes for the first un-granted merge
/// within the next-edge window when within braking distance of its wait
/// point.
fn merge_pre_brake_decision(
    graph: &EdgeGraph,
    buf: &VehicleBuffer,
    lock_mgr: &LockManager,
    config: &SimConfig,
    vehicle: usize,
) -> bool {
    let current_idx = buf.current_edge_index[vehicle];
    let Some(current) = graph.get(current_idx) else { return false };
    if current.rail_type.is_curve() {
        return false;
    }

    let mut remaining = (FixedNum::ONE - buf.edge_ratio[vehicle]) * FixedNum::from_num(current.distance);
    for &idx in buf.next_edge[vehicle].iter() {
        if idx == 0 {
            break;
        }
        let Some(edge) = graph.get(idx) else { break };
        if edge.to_node_is_merge && !lock_mgr.check_grant(&edge.to_node, vehicle) {
            let wait = lock_mgr.wait_distance(
                edge,
                config.wait_distance_from_merging_str_fixed(),
                config.wait_distance_from_merging_curve_fixed(),
            );
            let distance_to_wait_point = (remaining - wait).max(FixedNum::ZERO);
            let bd = speed::brake_distance(buf.velocity[vehicle], FixedNum::ZERO, config.linear_pre_brake_deceleration_fixed());
            return distance_to_wait_point <= bd;
        }
        remaining += FixedNum::from_num(edge.distance);
    }
    false
}

/// Phase 2 (spec §4.9). Returns the edge index the vehicle ends the tick
/// on.
#[allow(clippy::too_many_arguments)]
fn transition_phase(
    graph: &EdgeGraph,
    buf: &mut VehicleBuffer,
    lock_mgr: &mut LockManager,
    transfer: &mut TransferManager,
    config: &SimConfig,
    vehicle: usize,
    entry_edge_index: super::edge::EdgeIndex,
    entry_edge: &Edge,
    raw_new_ratio: FixedNum,
    simulation_time_ms: i64,
    events: &mut dyn SimEvents,
) -> super::edge::EdgeIndex {
    if raw_new_ratio >= FixedNum::ZERO && buf.next_edge_state[vehicle] == NextEdgeState::Empty {
        buf.next_edge_state[vehicle] = NextEdgeState::Pending;
        transfer.enqueue_vehicle_transfer(vehicle);
    }

    let gate_open = raw_new_ratio >= FixedNum::ONE
        && (buf.target_ratio[vehicle] == FixedNum::ONE || buf.next_edge_state[vehicle] == NextEdgeState::Ready);

    let final_edge_index;
    if gate_open {
        let preserve = config.transfer_mode == TransferMode::MqttControl;
        let reservation = transfer.consume_next_edge_reservation(vehicle);
        let outcome = transition(
            graph,
            buf,
            lock_mgr,
            transfer,
            vehicle,
            raw_new_ratio,
            preserve,
            reservation,
            simulation_time_ms,
            events,
        );
        final_edge_index = outcome.final_edge_index;
        buf.edge_ratio[vehicle] = outcome.final_ratio;
    } else {
        final_edge_index = entry_edge_index;
        if raw_new_ratio >= buf.target_ratio[vehicle] {
            buf.edge_ratio[vehicle] = buf.target_ratio[vehicle];
            buf.velocity[vehicle] = FixedNum::ZERO;
            buf.moving_status[vehicle] = MovingStatus::Stopped;
        } else {
            buf.edge_ratio[vehicle] = raw_new_ratio;
        }
    }

    if final_edge_index != entry_edge_index && entry_edge.to_node_is_merge {
        lock_mgr.release_lock(&entry_edge.to_node, vehicle);
    }

    final_edge_index
}

/// Phase 3 (spec §4.10): interpolate, then evaluate the merge-wait gate
/// and re-clamp if the vehicle overshot a wait point.
fn position_phase(
    graph: &EdgeGraph,
    buf: &mut VehicleBuffer,
    lock_mgr: &mut LockManager,
    config: &SimConfig,
    vehicle: usize,
    final_edge_index: super::edge::EdgeIndex,
    now_ms: i64,
) {
    let Some(final_edge) = graph.get(final_edge_index) else {
        return;
    };
    let final_edge = final_edge.clone();

    let (wait_ratio, waiting) = evaluate_merge_wait(&final_edge, buf.edge_ratio[vehicle], buf, lock_mgr, vehicle, config, now_ms);
    if waiting {
        buf.edge_ratio[vehicle] = wait_ratio;
        buf.velocity[vehicle] = FixedNum::ZERO;
    }

    let (x, y, z, rotation) = interpolate::interpolate(&final_edge, buf.edge_ratio[vehicle], config.vehicle_z_offset_fixed());
    buf.x[vehicle] = x;
    buf.y[vehicle] = y;
    buf.z[vehicle] = z;
    buf.rotation[vehicle] = rotation;
}

/// Merge-wait evaluation (spec §4.10). Returns `(ratio, wait)`; when
/// `wait` is true the caller must clamp `edge_ratio` to `ratio` and zero
/// velocity.
fn evaluate_merge_wait(
    edge: &Edge,
    ratio: FixedNum,
    buf: &mut VehicleBuffer,
    lock_mgr: &mut LockManager,
    vehicle: usize,
    config: &SimConfig,
    now_ms: i64,
) -> (FixedNum, bool) {
    if !edge.to_node_is_merge {
        buf.stop_reason[vehicle].remove(StopReason::LOCKED);
        buf.traffic_state[vehicle] = TrafficState::Free;
        return (ratio, false);
    }

    if buf.traffic_state[vehicle] == TrafficState::Acquired {
        buf.stop_reason[vehicle].remove(StopReason::LOCKED);
        return (ratio, false);
    }

    let distance_remaining = (FixedNum::ONE - ratio) * FixedNum::from_num(edge.distance);
    let request_distance = lock_mgr.request_distance(
        edge,
        config.request_distance_from_merging_str_fixed(),
        config.request_distance_from_merging_curve_fixed(),
    );
    let request_on_entry = request_distance < FixedNum::ZERO
        || edge.rail_type.is_curve()
        || FixedNum::from_num(edge.distance) < request_distance;
    let time_to_request = request_on_entry || distance_remaining <= request_distance;

    if !time_to_request {
        buf.traffic_state[vehicle] = TrafficState::Free;
        return (ratio, false);
    }

    if buf.traffic_state[vehicle] == TrafficState::Free {
        lock_mgr.request_lock(&edge.to_node, &edge.edge_name, vehicle, now_ms as u64);
    }

    if lock_mgr.check_grant(&edge.to_node, vehicle) {
        buf.stop_reason[vehicle].remove(StopReason::LOCKED);
        buf.traffic_state[vehicle] = TrafficState::Acquired;
        return (ratio, false);
    }

    buf.traffic_state[vehicle] = TrafficState::Waiting;
    let wait_cfg = lock_mgr.wait_distance(
        edge,
        config.wait_distance_from_merging_str_fixed(),
        config.wait_distance_from_merging_curve_fixed(),
    );
    let wait_threshold = FixedNum::from_num(edge.distance) - wait_cfg;
    let current_distance = ratio * FixedNum::from_num(edge.distance);

    if current_distance >= wait_threshold {
        buf.stop_reason[vehicle].insert(StopReason::LOCKED);
        let clamped_ratio = (wait_threshold / FixedNum::from_num(edge.distance)).max(FixedNum::ZERO);
        (clamped_ratio, true)
    } else {
        buf.stop_reason[vehicle].remove(StopReason::LOCKED);
        (ratio, false)
    }
}
