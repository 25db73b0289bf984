//! Transfer / path manager (component C6, spec §4.4).
//!
//! Grounded on the teacher's `game/pathfinding.rs` `process_path_requests`
//! (a `MessageReader<PathRequest>` drained once per tick) for the
//! enqueue/drain shape, and on
//! `other_examples/.../traffic-control-tower-movement.rs`'s route-queue
//! replenishment for the LOOP/RANDOM refill policies.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use super::config::TransferMode;
use super::edge::{EdgeGraph, EdgeIndex};
use super::fixed_math::FixedNum;
use super::lock::LockManager;
use super::vehicle::{NextEdgeState, VehicleBuffer, NEXT_EDGE_WINDOW};

pub type VehicleId = usize;

/// Maintains path replenishment, the next-edge look-ahead window, curve
/// look-ahead, and curve pre-brake bookkeeping for every vehicle.
pub struct TransferManager {
    pending: VecDeque<VehicleId>,
    queued: fixedbitset::FixedBitSet,
    reservations: FxHashMap<VehicleId, FixedNum>,
    /// Fixed cyclic route per vehicle under `TransferMode::Loop` (spec
    /// §4.4: "path is cyclic"). Set once by the collaborator that placed
    /// the vehicle; replayed wholesale each time the path buffer drains.
    loop_routes: FxHashMap<VehicleId, Vec<EdgeIndex>>,
    rng: StdRng,
}

impl TransferManager {
    /// `seed` makes RANDOM-mode path replenishment reproducible across
    /// runs, preserving the engine's determinism invariant (spec §5).
    pub fn new(seed: u64) -> Self {
        Self {
            pending: VecDeque::new(),
            queued: fixedbitset::FixedBitSet::with_capacity(0),
            reservations: FxHashMap::default(),
            loop_routes: FxHashMap::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Registers the cyclic route a LOOP-mode vehicle repeats forever.
    pub fn set_loop_route(&mut self, vehicle: VehicleId, route: Vec<EdgeIndex>) {
        self.loop_routes.insert(vehicle, route);
    }

    /// Marks that `vehicle`'s next-edge window needs refilling. Idempotent
    /// within a tick: enqueuing an already-pending vehicle is a no-op.
    pub fn enqueue_vehicle_transfer(&mut self, vehicle: VehicleId) {
        if vehicle >= self.queued.len() {
            self.queued.grow(vehicle + 1);
        }
        if self.queued[vehicle] {
            return;
        }
        self.queued.set(vehicle, true);
        self.pending.push_back(vehicle);
    }

    /// Drains the pending queue, refilling each vehicle's path (if empty,
    /// per `mode`) and next-edge window (spec §4.4, §5: "drained before the
    /// main per-vehicle loop each tick").
    pub fn process_transfer_queue(
        &mut self,
        graph: &EdgeGraph,
        buf: &mut VehicleBuffer,
        lock_mgr: &LockManager,
        mode: TransferMode,
    ) {
        while let Some(vehicle) = self.pending.pop_front() {
            if vehicle < self.queued.len() {
                self.queued.set(vehicle, false);
            }
            if buf.path_len(vehicle) == 0 {
                self.replenish_path(graph, buf, vehicle, mode);
            }
            refill_window(graph, buf, lock_mgr, vehicle);
        }
    }

    fn replenish_path(&mut self, graph: &EdgeGraph, buf: &mut VehicleBuffer, vehicle: VehicleId, mode: TransferMode) {
        match mode {
            TransferMode::Loop => {
                if let Some(route) = self.loop_routes.get(&vehicle) {
                    buf.set_path(vehicle, route);
                }
            }
            TransferMode::Random => {
                let current = buf.current_edge_index[vehicle];
                let Some(edge) = graph.get(current) else { return };
                let candidates = graph.outgoing(&edge.to_node);
                if candidates.is_empty() {
                    return;
                }
                let pick = candidates[self.rng.random_range(0..candidates.len())];
                buf.push_path(vehicle, pick);
            }
            // External collaborator supplies the path; the manager only
            // reports the window stays EMPTY until it does (spec §4.11).
            TransferMode::MqttControl | TransferMode::AutoRoute => {}
        }
    }

    /// Reserves a target ratio to apply immediately after the vehicle's
    /// next edge transition (e.g. an external partial-traversal command).
    pub fn reserve_target_ratio(&mut self, vehicle: VehicleId, ratio: FixedNum) {
        self.reservations.insert(vehicle, ratio);
    }

    /// Returns and clears any reserved target ratio for `vehicle`.
    pub fn consume_next_edge_reservation(&mut self, vehicle: VehicleId) -> Option<FixedNum> {
        self.reservations.remove(&vehicle)
    }

    /// Scans the path forward from the vehicle's current LINEAR edge,
    /// accumulating distance until a curve edge is found (spec §4.4,
    /// §4.8: "on a LINEAR edge ... ask the transfer manager").
    pub fn find_distance_to_next_curve(
        &self,
        graph: &EdgeGraph,
        buf: &VehicleBuffer,
        vehicle: VehicleId,
    ) -> Option<(EdgeIndex, FixedNum)> {
        let current_idx = buf.current_edge_index[vehicle];
        let current = graph.get(current_idx)?;
        if current.rail_type.is_curve() {
            return None;
        }

        let mut remaining = (FixedNum::ONE - buf.edge_ratio[vehicle]) * FixedNum::from_num(current.distance);
        for &idx in buf.path_row(vehicle) {
            let Some(edge) = graph.get(idx) else { break };
            if edge.rail_type.is_curve() {
                return Some((idx, remaining));
            }
            remaining += FixedNum::from_num(edge.distance);
        }
        None
    }

    pub fn is_curve_braking(&self, buf: &VehicleBuffer, vehicle: VehicleId) -> bool {
        buf.curve_braking[vehicle]
    }

    pub fn set_curve_braking(&self, buf: &mut VehicleBuffer, vehicle: VehicleId, value: bool) {
        buf.curve_braking[vehicle] = value;
    }

    pub fn clear_curve_brake_state(&self, buf: &mut VehicleBuffer, vehicle: VehicleId) {
        buf.curve_braking[vehicle] = false;
    }

    pub fn clear_all_curve_brake_states(&self, buf: &mut VehicleBuffer) {
        buf.curve_braking.iter_mut().for_each(|b| *b = false);
    }

    /// `true` at most once per `interval_ms` per vehicle (spec §4.8;
    /// `interval_ms < 0` disables the periodic check entirely).
    pub fn should_check_curve(&self, buf: &VehicleBuffer, vehicle: VehicleId, now_ms: i64, interval_ms: i64) -> bool {
        if interval_ms < 0 {
            return false;
        }
        let last = buf.last_curve_check_ms[vehicle];
        last == i64::MIN || now_ms - last >= interval_ms
    }

    pub fn record_curve_check(&self, buf: &mut VehicleBuffer, vehicle: VehicleId, now_ms: i64) {
        buf.last_curve_check_ms[vehicle] = now_ms;
    }

    /// Shifts the path cursor past `passed_edge_name`, the edge the vehicle
    /// just left (spec §4.4: "advances path cursor so the next call sees a
    /// shorter remaining path").
    pub fn on_edge_transition(&mut self, buf: &mut VehicleBuffer, vehicle: VehicleId, passed_edge_name: &str) {
        buf.shift_path(vehicle);
        tracing::trace!(vehicle, passed_edge_name, "advanced path cursor");
    }
}

/// Refills `next_edge[0..4]` by peeking the vehicle's path buffer, honoring
/// the merge-aware stop rule (spec §4.5 step 9b): once a candidate curve
/// edge's `to_node` is a merge the vehicle lacks a grant for, write it into
/// the window and stop refilling further slots.
pub(crate) fn refill_window(graph: &EdgeGraph, buf: &mut VehicleBuffer, lock_mgr: &LockManager, vehicle: VehicleId) {
    let mut window = [0 as EdgeIndex; NEXT_EDGE_WINDOW];
    for (slot, &idx) in window.iter_mut().zip(buf.path_row(vehicle).iter()) {
        *slot = idx;
        if let Some(edge) = graph.get(idx) {
            if edge.rail_type.is_curve() && edge.to_node_is_merge && !lock_mgr.check_grant(&edge.to_node, vehicle) {
                break;
            }
        }
    }
    buf.next_edge[vehicle] = window;
    buf.next_edge_state[vehicle] = if window[0] == 0 {
        NextEdgeState::Empty
    } else {
        NextEdgeState::Ready
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::config::GrantStrategy;
    use crate::sim::edge::{CurveDirection, Edge, RailType};
    use crate::sim::fixed_math::FixedVec2;

    fn mk(name: &str, from: &str, to: &str, rail_type: RailType, distance: f64) -> Edge {
        Edge {
            edge_name: name.into(),
            from_node: from.into(),
            to_node: to.into(),
            distance,
            rail_type,
            curve_direction: CurveDirection::None,
            rendering_points: vec![FixedVec2::ZERO, FixedVec2::from_f64(distance, 0.0)],
            to_node_is_merge: false,
        }
    }

    fn straight_graph() -> EdgeGraph {
        EdgeGraph::build(vec![
            mk("e1", "a", "b", RailType::Linear, 5.0),
            mk("e2", "b", "c", RailType::Linear, 5.0),
            mk("e3", "c", "d", RailType::LeftCurve, 5.0),
        ])
        .unwrap()
    }

    #[test]
    fn window_refill_stops_at_ungranted_merge_curve() {
        // e3 is a curve whose to_node "m" is a merge (two incoming curves);
        // the window must include e3 but never look past it while ungranted.
        let graph = EdgeGraph::build(vec![
            mk("e1", "a", "b", RailType::Linear, 5.0),
            mk("e3", "b", "m", RailType::LeftCurve, 5.0),
            mk("e_other", "x", "m", RailType::LeftCurve, 5.0),
            mk("e4", "m", "d", RailType::Linear, 5.0),
        ])
        .unwrap();
        let mut buf = VehicleBuffer::new(1).unwrap();
        buf.set_path(0, &[2, 4]); // e3, then e4 beyond the ungranted merge
        let lock_mgr = LockManager::build(&graph, 1, GrantStrategy::Fifo);
        refill_window(&graph, &mut buf, &lock_mgr, 0);
        assert_eq!(buf.next_edge[0], [2, 0, 0, 0, 0]);
    }

    #[test]
    fn window_refill_empty_path_sets_empty_state() {
        let graph = straight_graph();
        let mut buf = VehicleBuffer::new(1).unwrap();
        let lock_mgr = LockManager::build(&graph, 1, GrantStrategy::Fifo);
        refill_window(&graph, &mut buf, &lock_mgr, 0);
        assert_eq!(buf.next_edge_state[0], NextEdgeState::Empty);
    }

    #[test]
    fn find_distance_to_next_curve_accumulates_remaining_and_path() {
        let graph = straight_graph();
        let mut buf = VehicleBuffer::new(1).unwrap();
        buf.current_edge_index[0] = 1; // e1, distance 5, ratio 0.5 => 2.5 remaining
        buf.edge_ratio[0] = FixedNum::from_num(0.5);
        buf.set_path(0, &[2, 3]); // e2 linear (+5), e3 curve

        let transfer = TransferManager::new(42);
        let (curve_idx, dist) = transfer.find_distance_to_next_curve(&graph, &buf, 0).unwrap();
        assert_eq!(curve_idx, 3);
        assert_eq!(dist, FixedNum::from_num(7.5));
    }

    #[test]
    fn find_distance_to_next_curve_none_if_already_on_curve() {
        let graph = straight_graph();
        let mut buf = VehicleBuffer::new(1).unwrap();
        buf.current_edge_index[0] = 3; // e3 is a curve
        let transfer = TransferManager::new(1);
        assert!(transfer.find_distance_to_next_curve(&graph, &buf, 0).is_none());
    }

    #[test]
    fn loop_mode_replenishes_path_when_empty() {
        let graph = straight_graph();
        let mut buf = VehicleBuffer::new(1).unwrap();
        let lock_mgr = LockManager::build(&graph, 1, GrantStrategy::Fifo);
        let mut transfer = TransferManager::new(7);
        transfer.set_loop_route(0, vec![1, 2]);
        transfer.enqueue_vehicle_transfer(0);
        transfer.process_transfer_queue(&graph, &mut buf, &lock_mgr, TransferMode::Loop);
        assert_eq!(buf.path_row(0), &[1, 2]);
        assert_eq!(buf.next_edge_state[0], NextEdgeState::Ready);
    }

    #[test]
    fn enqueue_is_idempotent_within_a_tick() {
        let mut transfer = TransferManager::new(0);
        transfer.enqueue_vehicle_transfer(5);
        transfer.enqueue_vehicle_transfer(5);
        assert_eq!(transfer.pending.len(), 1);
    }

    #[test]
    fn reservation_round_trips_once() {
        let mut transfer = TransferManager::new(0);
        transfer.reserve_target_ratio(2, FixedNum::from_num(0.25));
        assert_eq!(transfer.consume_next_edge_reservation(2), Some(FixedNum::from_num(0.25)));
        assert_eq!(transfer.consume_next_edge_reservation(2), None);
    }
}
