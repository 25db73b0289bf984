//! Vehicle movement simulation core.
//!
//! Owns the edge graph, the packed vehicle buffer, the merge-node lock
//! manager, and the transfer/path manager, and drives them through the
//! per-tick movement pipeline. See [`SimulationCore`] for the facade most
//! callers use; the submodules are public so a host can build its own
//! pipeline out of the same primitives.

pub mod config;
pub mod edge;
pub mod errors;
pub mod events;
pub mod fixed_math;
pub mod interpolate;
pub mod lock;
pub mod pipeline;
pub mod speed;
pub mod transfer;
pub mod transition;
pub mod vehicle;

use config::SimConfig;
use edge::EdgeGraph;
use errors::SetupError;
use events::SimEvents;
use fixed_math::FixedNum;
use lock::LockManager;
use transfer::TransferManager;
use vehicle::VehicleBuffer;

/// Assembles a [`SimulationCore`] from its setup-time inputs, running the
/// validation described in spec §3/§7 before any tick is run.
///
/// Grounded on the teacher's `Startup` system chain
/// (`init_flow_field` → `init_sim_config_from_initial`): configuration and
/// derived state are built once, in order, before the simulation loop
/// ever runs.
pub struct SimulationCoreBuilder {
    edges: Option<Vec<edge::Edge>>,
    vehicle_capacity: Option<usize>,
    config: SimConfig,
    rng_seed: u64,
}

impl Default for SimulationCoreBuilder {
    fn default() -> Self {
        Self {
            edges: None,
            vehicle_capacity: None,
            config: SimConfig::default(),
            rng_seed: 0,
        }
    }
}

impl SimulationCoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edges(mut self, edges: Vec<edge::Edge>) -> Self {
        self.edges = Some(edges);
        self
    }

    pub fn vehicle_capacity(mut self, capacity: usize) -> Self {
        self.vehicle_capacity = Some(capacity);
        self
    }

    pub fn config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    /// Seeds the transfer manager's RNG (used by `TransferMode::Random`
    /// path replenishment), keeping replays deterministic (spec §5).
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    pub fn build(self) -> Result<SimulationCore, SetupError> {
        let edges = self.edges.unwrap_or_default();
        let graph = EdgeGraph::build(edges)?;
        let capacity = self.vehicle_capacity.unwrap_or(1);
        let buffer = VehicleBuffer::new(capacity)?;
        let lock_mgr = LockManager::build(&graph, capacity, self.config.grant_strategy);
        let transfer = TransferManager::new(self.rng_seed);

        Ok(SimulationCore {
            graph,
            buffer,
            lock_mgr,
            transfer,
            config: self.config,
            tick: 0,
        })
    }
}

/// The movement simulation for one region ("fab"). Owns all mutable state
/// for its vehicles and merges; regions never share state (spec §5).
pub struct SimulationCore {
    graph: EdgeGraph,
    buffer: VehicleBuffer,
    lock_mgr: LockManager,
    transfer: TransferManager,
    config: SimConfig,
    tick: u64,
}

impl SimulationCore {
    pub fn graph(&self) -> &EdgeGraph {
        &self.graph
    }

    pub fn buffer(&self) -> &VehicleBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut VehicleBuffer {
        &mut self.buffer
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Number of ticks run so far, grounded on the teacher's `SimTick`
    /// resource.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Runs one tick of the movement pipeline (spec §4.7, §6).
    pub fn step(&mut self, dt_seconds: f64, simulation_time_ms: i64, events: &mut dyn SimEvents) {
        let dt = FixedNum::from_num(dt_seconds);
        pipeline::step(
            &self.graph,
            &mut self.buffer,
            &mut self.lock_mgr,
            &mut self.transfer,
            &self.config,
            dt,
            simulation_time_ms,
            events,
        );
        self.tick += 1;
        crate::profile_log!(self.tick, "tick {} complete, {} active vehicles", self.tick, self.buffer.active_count());
    }

    pub fn set_transfer_mode(&mut self, mode: config::TransferMode) {
        self.config.transfer_mode = mode;
    }

    /// Clears every merge's granted/request state (spec §6 control
    /// surface), leaving vehicle rows untouched.
    pub fn reset_lock_manager(&mut self) {
        self.lock_mgr.reset();
    }

    /// Clears every vehicle's curve pre-brake flag (supplement to the
    /// lock reset, for test setup / scenario replays).
    pub fn clear_curve_brake_states(&mut self) {
        self.transfer.clear_all_curve_brake_states(&mut self.buffer);
    }

    pub fn enqueue_vehicle_transfer(&mut self, vehicle_id: usize) {
        self.transfer.enqueue_vehicle_transfer(vehicle_id);
    }

    pub fn set_loop_route(&mut self, vehicle_id: usize, route: Vec<edge::EdgeIndex>) {
        self.transfer.set_loop_route(vehicle_id, route);
    }

    pub fn reserve_target_ratio(&mut self, vehicle_id: usize, ratio: FixedNum) {
        self.transfer.reserve_target_ratio(vehicle_id, ratio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::edge::{CurveDirection, Edge, RailType};
    use crate::sim::events::NoOpEvents;
    use crate::sim::fixed_math::FixedVec2;

    fn straight(name: &str, from: &str, to: &str, distance: f64) -> Edge {
        Edge {
            edge_name: name.into(),
            from_node: from.into(),
            to_node: to.into(),
            distance,
            rail_type: RailType::Linear,
            curve_direction: CurveDirection::None,
            rendering_points: vec![FixedVec2::ZERO, FixedVec2::from_f64(distance, 0.0)],
            to_node_is_merge: false,
        }
    }

    #[test]
    fn builder_rejects_zero_distance_edges() {
        let result = SimulationCoreBuilder::new()
            .edges(vec![straight("e1", "a", "b", 0.0)])
            .vehicle_capacity(4)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_produces_a_working_core() {
        let mut core = SimulationCoreBuilder::new()
            .edges(vec![straight("e1", "a", "b", 10.0)])
            .vehicle_capacity(1)
            .build()
            .unwrap();

        core.buffer_mut().moving_status[0] = vehicle::MovingStatus::Moving;
        core.buffer_mut().velocity[0] = FixedNum::from_num(2.0);
        core.buffer_mut().current_edge_index[0] = 1;

        let mut events = NoOpEvents;
        core.step(0.5, 0, &mut events);

        assert_eq!(core.tick(), 1);
        assert!((core.buffer().edge_ratio[0].to_num::<f64>() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn reset_lock_manager_clears_grants_not_vehicles() {
        let mut core = SimulationCoreBuilder::new()
            .edges(vec![straight("e1", "a", "m", 10.0), straight("e0", "x", "m", 10.0)])
            .vehicle_capacity(2)
            .build()
            .unwrap();

        core.lock_mgr.request_lock("m", "e1", 0, 0);
        assert!(core.lock_mgr.check_grant("m", 0));
        core.reset_lock_manager();
        assert!(!core.lock_mgr.check_grant("m", 0));
    }
}
