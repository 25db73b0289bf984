//! Merge-node lock manager (component C5, spec §4.3).
//!
//! Grounded on two corpus patterns:
//! - `collections/inclusion_set.rs`'s dense hot storage + `FixedBitSet`
//!   presence check, adapted here so "is vehicle V granted at node N"
//!   is an O(1) bitset test instead of a linear scan of `granted`.
//! - `other_examples/.../a-b-street-abstreet__sim-src-mechanics-driving.rs`'s
//!   per-lane `Queue`, which establishes the idiom of a small ordered
//!   arrival structure per shared resource rather than one global lock.

use rustc_hash::FxHashMap;

use super::config::GrantStrategy;
use super::edge::{Edge, EdgeGraph};
use super::fixed_math::FixedNum;

pub type VehicleId = usize;

#[derive(Debug, Clone)]
struct Request {
    vehicle: VehicleId,
    from_edge: String,
    request_time: u64,
}

/// Per-merge-node lock state (spec §3 "Merge-lock node").
struct MergeLock {
    granted: Vec<(VehicleId, String)>,
    requests: std::collections::VecDeque<Request>,
    per_incoming_edge_queues: FxHashMap<String, std::collections::VecDeque<Request>>,
}

impl MergeLock {
    fn new() -> Self {
        Self {
            granted: Vec::new(),
            requests: std::collections::VecDeque::new(),
            per_incoming_edge_queues: FxHashMap::default(),
        }
    }

    fn has_pending_or_granted(&self, vehicle: VehicleId) -> bool {
        self.granted.iter().any(|(v, _)| *v == vehicle)
            || self.requests.iter().any(|r| r.vehicle == vehicle)
    }
}

/// Arbitrates access to shared merge nodes for every merge in the graph.
///
/// One [`MergeLock`] is created per merge node at construction time and
/// never added to or removed from afterwards (spec §3: "Lock state is
/// created on graph load ... cleared by reset").
pub struct LockManager {
    merges: FxHashMap<String, MergeLock>,
    /// O(1) "does this vehicle hold *any* grant" check, dense-indexed by
    /// vehicle id, mirroring `HotStorage::presence` in the teacher's
    /// inclusion set.
    granted_presence: fixedbitset::FixedBitSet,
    strategy: GrantStrategy,
}

impl LockManager {
    /// Builds one lock node per merge discovered in `graph` (any `to_node`
    /// with >= 2 incoming edges).
    pub fn build(graph: &EdgeGraph, vehicle_capacity: usize, strategy: GrantStrategy) -> Self {
        let mut merges = FxHashMap::default();
        for idx in 1..=graph.len() as u32 {
            if let Some(edge) = graph.get(idx) {
                if edge.to_node_is_merge {
                    merges
                        .entry(edge.to_node.clone())
                        .or_insert_with(MergeLock::new);
                }
            }
        }
        Self {
            merges,
            granted_presence: fixedbitset::FixedBitSet::with_capacity(vehicle_capacity),
            strategy,
        }
    }

    pub fn is_merge_node(&self, name: &str) -> bool {
        self.merges.contains_key(name)
    }

    pub fn grant_strategy(&self) -> GrantStrategy {
        self.strategy
    }

    /// Clears every merge's granted/request state without touching vehicle
    /// rows (spec control surface: `reset_lock_manager()`).
    pub fn reset(&mut self) {
        for lock in self.merges.values_mut() {
            *lock = MergeLock::new();
        }
        self.granted_presence.clear();
    }

    /// Idempotent: a vehicle already granted or queued at `node` causes no
    /// change (spec §4.3, §4.11: "a request from a vehicle already granted
    /// is a no-op").
    pub fn request_lock(&mut self, node: &str, from_edge: &str, vehicle: VehicleId, now_ms: u64) {
        let Some(lock) = self.merges.get_mut(node) else {
            return; // non-merge node: no-op (spec §4.11)
        };
        if lock.has_pending_or_granted(vehicle) {
            return;
        }

        let req = Request {
            vehicle,
            from_edge: from_edge.to_string(),
            request_time: now_ms,
        };
        lock.requests.push_back(req.clone());
        lock.per_incoming_edge_queues
            .entry(from_edge.to_string())
            .or_default()
            .push_back(req);

        arbitrate(lock, self.strategy, &mut self.granted_presence);
    }

    pub fn check_grant(&self, node: &str, vehicle: VehicleId) -> bool {
        self.merges
            .get(node)
            .map(|lock| lock.granted.iter().any(|(v, _)| *v == vehicle))
            .unwrap_or(false)
    }

    /// Removes `vehicle` from `granted` at `node`, then re-arbitrates so a
    /// queued vehicle can be promoted. A release for a vehicle that holds
    /// no grant is a no-op (spec §4.3, §4.11).
    pub fn release_lock(&mut self, node: &str, vehicle: VehicleId) {
        let Some(lock) = self.merges.get_mut(node) else {
            return;
        };
        let before = lock.granted.len();
        lock.granted.retain(|(v, _)| *v != vehicle);
        if lock.granted.len() == before {
            return; // wasn't granted: no-op
        }
        if vehicle < self.granted_presence.len() {
            self.granted_presence.set(vehicle, false);
        }
        arbitrate(lock, self.strategy, &mut self.granted_presence);
    }

    /// Wait distance short of `to_node` at which an un-granted vehicle must
    /// stop (spec §4.3, GLOSSARY).
    pub fn wait_distance(
        &self,
        edge: &Edge,
        wait_str: FixedNum,
        wait_curve: FixedNum,
    ) -> FixedNum {
        if edge.rail_type.is_curve() {
            wait_curve
        } else {
            wait_str
        }
        .min(FixedNum::from_num(edge.distance))
    }

    /// Distance short of `to_node` at which a vehicle should begin
    /// requesting (negative => request on entry, spec §4.3/GLOSSARY).
    pub fn request_distance(&self, edge: &Edge, request_str: FixedNum, request_curve: FixedNum) -> FixedNum {
        if edge.rail_type.is_curve() {
            request_curve
        } else {
            request_str
        }
    }
}

/// Promotes queued requests to grants per the configured strategy
/// (spec §4.3 "Arbitration").
fn arbitrate(lock: &mut MergeLock, strategy: GrantStrategy, presence: &mut fixedbitset::FixedBitSet) {
    match strategy {
        GrantStrategy::Fifo => arbitrate_fifo(lock, presence),
        GrantStrategy::Batch => arbitrate_batch(lock, presence),
    }
}

/// FIFO: promote the head of `requests` whenever nothing is currently
/// granted, one vehicle at a time, in arrival order.
fn arbitrate_fifo(lock: &mut MergeLock, presence: &mut fixedbitset::FixedBitSet) {
    if !lock.granted.is_empty() {
        return;
    }
    if let Some(req) = lock.requests.pop_front() {
        remove_from_edge_queue(lock, &req);
        grant(lock, presence, req.vehicle, req.from_edge);
    }
}

/// BATCH: drain the entire run of requests from the same incoming edge at
/// the head of the global queue together, never interleaving a different
/// edge's vehicles into the same batch (spec §4.3).
///
/// The "current batch's edge" is whichever edge is already granted (if
/// any); a fresh same-edge arrival joins it immediately instead of waiting
/// for every prior member to release first.
fn arbitrate_batch(lock: &mut MergeLock, presence: &mut fixedbitset::FixedBitSet) {
    let target_edge = match lock.granted.first() {
        Some((_, edge)) => edge.clone(),
        None => match lock.requests.front() {
            Some(req) => req.from_edge.clone(),
            None => return,
        },
    };
    while let Some(req) = lock.requests.front() {
        if req.from_edge != target_edge {
            break;
        }
        let req = lock.requests.pop_front().unwrap();
        remove_from_edge_queue(lock, &req);
        grant(lock, presence, req.vehicle, req.from_edge);
    }
}

fn remove_from_edge_queue(lock: &mut MergeLock, req: &Request) {
    if let Some(queue) = lock.per_incoming_edge_queues.get_mut(&req.from_edge) {
        if let Some(pos) = queue.iter().position(|r| r.vehicle == req.vehicle) {
            queue.remove(pos);
        }
    }
}

fn grant(lock: &mut MergeLock, presence: &mut fixedbitset::FixedBitSet, vehicle: VehicleId, from_edge: String) {
    lock.granted.push((vehicle, from_edge));
    if vehicle >= presence.len() {
        presence.grow(vehicle + 1);
    }
    presence.set(vehicle, true);
}
