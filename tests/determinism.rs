//! Determinism invariants (spec §5, §8): identical inputs replayed through
//! two independent `SimulationCore`s must produce bit-identical fixed-point
//! state, including when `TransferMode::Random` path replenishment is
//! exercised with a seeded RNG.

use amhs_core::sim::config::{SimConfig, TransferMode};
use amhs_core::sim::edge::{CurveDirection, Edge, RailType};
use amhs_core::sim::events::NoOpEvents;
use amhs_core::sim::fixed_math::FixedVec2;
use amhs_core::sim::vehicle::MovingStatus;
use amhs_core::SimulationCoreBuilder;

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

fn forked_edges() -> Vec<Edge> {
    vec![
        straight("e1", "a", "b", 5.0),
        straight("e2", "b", "c1", 5.0),
        straight("e3", "b", "c2", 5.0),
    ]
}

fn build_random_core(seed: u64) -> amhs_core::SimulationCore {
    let mut config = SimConfig::default();
    config.transfer_mode = TransferMode::Random;

    let mut core = SimulationCoreBuilder::new()
        .edges(forked_edges())
        .vehicle_capacity(3)
        .config(config)
        .rng_seed(seed)
        .build()
        .unwrap();

    for v in 0..3 {
        let buf = core.buffer_mut();
        buf.moving_status[v] = MovingStatus::Moving;
        buf.velocity[v] = amhs_core::sim::fixed_math::FixedNum::from_num(1.5);
        buf.current_edge_index[v] = 1;
    }
    core
}

#[test]
fn same_seed_produces_identical_random_mode_trajectories() {
    let mut core_a = build_random_core(7);
    let mut core_b = build_random_core(7);

    let mut events = NoOpEvents;
    for t in 0..20 {
        core_a.step(0.2, t * 200, &mut events);
        core_b.step(0.2, t * 200, &mut events);
    }

    for v in 0..3 {
        assert_eq!(core_a.buffer().x[v], core_b.buffer().x[v]);
        assert_eq!(core_a.buffer().y[v], core_b.buffer().y[v]);
        assert_eq!(core_a.buffer().current_edge_index[v], core_b.buffer().current_edge_index[v]);
        assert_eq!(core_a.buffer().edge_ratio[v], core_b.buffer().edge_ratio[v]);
    }
}

#[test]
fn different_seeds_are_permitted_to_diverge_on_the_fork() {
    // Not a correctness requirement in itself, but establishes that the
    // RNG seed actually participates in path replenishment rather than
    // every run silently picking the same branch regardless of seed.
    // The fork is only resolved once the vehicle's path buffer is
    // replenished (tick 2, once it has been enqueued on tick 1); compare
    // the next-edge window rather than `current_edge_index`, which only
    // changes once the vehicle physically reaches the fork many ticks
    // later on a 5m edge at 1.5 m/s.
    let mut diverged = false;
    for seed in 0..32 {
        let mut a = build_random_core(seed);
        let mut b = build_random_core(seed + 1000);
        let mut events = NoOpEvents;
        for t in 0..3 {
            a.step(0.2, t * 200, &mut events);
            b.step(0.2, t * 200, &mut events);
        }
        if a.buffer().next_edge[0][0] != b.buffer().next_edge[0][0] {
            diverged = true;
            break;
        }
    }
    assert!(diverged, "expected at least one seed pair to pick different fork branches");
}

#[test]
fn ascending_vehicle_order_is_stable_across_runs() {
    // Two vehicles racing for the same merge should resolve identically
    // every time: arrival order alone (not allocation order, not hashmap
    // iteration) decides the grant.
    let edges = vec![
        straight("eA", "A", "M", 10.0),
        straight("eB", "B", "M", 10.0),
        straight("eOut", "M", "C", 10.0),
    ];

    let run = || {
        let mut core = SimulationCoreBuilder::new()
            .edges(edges.clone())
            .vehicle_capacity(2)
            .build()
            .unwrap();
        {
            let buf = core.buffer_mut();
            buf.moving_status[0] = MovingStatus::Moving;
            buf.moving_status[1] = MovingStatus::Moving;
            buf.velocity[0] = amhs_core::sim::fixed_math::FixedNum::from_num(1.0);
            buf.velocity[1] = amhs_core::sim::fixed_math::FixedNum::from_num(1.0);
            buf.current_edge_index[0] = 1;
            buf.current_edge_index[1] = 2;
            buf.edge_ratio[0] = amhs_core::sim::fixed_math::FixedNum::from_num(0.95);
            buf.edge_ratio[1] = amhs_core::sim::fixed_math::FixedNum::from_num(0.95);
            buf.next_edge[0] = [3, 0, 0, 0, 0];
            buf.next_edge[1] = [3, 0, 0, 0, 0];
            buf.next_edge_state[0] = amhs_core::sim::vehicle::NextEdgeState::Ready;
            buf.next_edge_state[1] = amhs_core::sim::vehicle::NextEdgeState::Ready;
        }
        let mut events = NoOpEvents;
        core.step(0.1, 0, &mut events);
        core.buffer().traffic_state[0]
    };

    let first = run();
    for _ in 0..10 {
        assert_eq!(run(), first);
    }
}
