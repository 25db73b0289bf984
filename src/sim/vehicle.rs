//! Packed vehicle state buffer (component C2).
//!
//! The spec's Design Notes call this out explicitly: "packed numeric
//! storage + index-based identity replaces pointer-graph vehicles ...
//! this eliminates cycles and simplifies sharing the row buffer with a
//! renderer." This module generalizes the teacher's per-entity ECS
//! components (`SimPosition`, `SimVelocity`, ... in
//! `simulation/components.rs`) into literal Struct-of-Arrays columns
//! indexed by a dense `usize` vehicle id, since there is no ECS host left
//! to back the per-entity component model.

use bitflags::bitflags;

use super::edge::EdgeIndex;
use super::errors::SetupError;
use super::fixed_math::FixedNum;

/// Fixed capacity of a single vehicle's path buffer (spec §3, §GLOSSARY).
pub const MAX_PATH_LENGTH: usize = 64;

/// Width of the next-edge look-ahead window (spec GLOSSARY: "5 slots").
pub const NEXT_EDGE_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovingStatus {
    #[default]
    Moving,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrafficState {
    #[default]
    Free,
    Waiting,
    Acquired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NextEdgeState {
    #[default]
    Empty,
    Pending,
    Ready,
}

bitflags! {
    /// Bitmask reasons a vehicle is not moving / moving abnormally (spec §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StopReason: u16 {
        const OBS_LIDAR            = 1 << 0;
        const OBS_CAMERA           = 1 << 1;
        const E_STOP               = 1 << 2;
        const LOCKED               = 1 << 3;
        const DESTINATION_REACHED  = 1 << 4;
        const PATH_BLOCKED         = 1 << 5;
        const LOAD_ON              = 1 << 6;
        const LOAD_OFF             = 1 << 7;
        const NOT_INITIALIZED      = 1 << 8;
        const INDIVIDUAL_CONTROL   = 1 << 9;
        const SENSORED             = 1 << 10;
    }
}

/// Hit-zone sentinel meaning "no sensor signal" (spec §GLOSSARY/§3).
pub const HIT_ZONE_NONE: i8 = -1;
pub const HIT_ZONE_APPROACH: i8 = 0;
pub const HIT_ZONE_BRAKE: i8 = 1;
pub const HIT_ZONE_STOP: i8 = 2;

/// The packed, columnar vehicle state buffer.
///
/// Every field is a `Vec` of length `capacity`, indexed by vehicle id.
/// `active_count` tracks how many of the leading rows are in use (spec
/// §4.7: "for each vehicle `i` in `[0, N_active)`").
#[derive(Debug)]
pub struct VehicleBuffer {
    capacity: usize,
    active_count: usize,

    // -- Movement columns --
    pub moving_status: Vec<MovingStatus>,
    pub velocity: Vec<FixedNum>,
    pub acceleration: Vec<FixedNum>,
    pub deceleration: Vec<FixedNum>,
    pub current_edge_index: Vec<EdgeIndex>,
    pub edge_ratio: Vec<FixedNum>,
    pub target_ratio: Vec<FixedNum>,
    pub x: Vec<FixedNum>,
    pub y: Vec<FixedNum>,
    pub z: Vec<FixedNum>,
    pub rotation: Vec<FixedNum>,
    pub next_edge_state: Vec<NextEdgeState>,
    pub next_edge: Vec<[EdgeIndex; NEXT_EDGE_WINDOW]>,

    // -- Sensor columns --
    pub preset_idx: Vec<u32>,
    pub hit_zone: Vec<i8>,
    pub collision_target: Vec<i64>,

    // -- Logic columns --
    pub traffic_state: Vec<TrafficState>,
    pub stop_reason: Vec<StopReason>,
    pub destination_edge: Vec<EdgeIndex>,
    pub path_remaining: Vec<u32>,

    // -- Path buffer (header + flattened rows, spec §3) --
    path_len: Vec<u16>,
    path_data: Vec<EdgeIndex>,

    // -- Curve pre-brake bookkeeping (C6, §4.4) --
    pub(crate) curve_braking: Vec<bool>,
    pub(crate) last_curve_check_ms: Vec<i64>,
}

impl VehicleBuffer {
    /// Allocates a buffer for `capacity` vehicles, all initialized to the
    /// sentinel "not yet placed" state (`STOPPED`, `NOT_INITIALIZED`).
    pub fn new(capacity: usize) -> Result<Self, SetupError> {
        if capacity == 0 {
            return Err(SetupError::ZeroVehicleCapacity);
        }
        Ok(Self {
            capacity,
            active_count: capacity,
            moving_status: vec![MovingStatus::Stopped; capacity],
            velocity: vec![FixedNum::ZERO; capacity],
            acceleration: vec![FixedNum::ZERO; capacity],
            deceleration: vec![FixedNum::ZERO; capacity],
            current_edge_index: vec![0; capacity],
            edge_ratio: vec![FixedNum::ZERO; capacity],
            target_ratio: vec![FixedNum::ONE; capacity],
            x: vec![FixedNum::ZERO; capacity],
            y: vec![FixedNum::ZERO; capacity],
            z: vec![FixedNum::ZERO; capacity],
            rotation: vec![FixedNum::ZERO; capacity],
            next_edge_state: vec![NextEdgeState::Empty; capacity],
            next_edge: vec![[0; NEXT_EDGE_WINDOW]; capacity],
            preset_idx: vec![0; capacity],
            hit_zone: vec![HIT_ZONE_NONE; capacity],
            collision_target: vec![-1; capacity],
            traffic_state: vec![TrafficState::Free; capacity],
            stop_reason: vec![StopReason::NOT_INITIALIZED; capacity],
            destination_edge: vec![0; capacity],
            path_remaining: vec![0; capacity],
            path_len: vec![0; capacity],
            path_data: vec![0; capacity * MAX_PATH_LENGTH],
            curve_braking: vec![false; capacity],
            last_curve_check_ms: vec![i64::MIN; capacity],
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Sets the number of leading rows the pipeline iterates over. Rows
    /// beyond this are untouched by `step` (spec §4.7).
    pub fn set_active_count(&mut self, count: usize) {
        self.active_count = count.min(self.capacity);
    }

    // -- Path buffer access (row-major, header + indices, spec §3) --

    pub fn path_len(&self, vehicle: usize) -> usize {
        self.path_len[vehicle] as usize
    }

    pub fn path_row(&self, vehicle: usize) -> &[EdgeIndex] {
        let len = self.path_len(vehicle);
        let base = vehicle * MAX_PATH_LENGTH;
        &self.path_data[base..base + len]
    }

    /// Replaces the vehicle's remaining path. Truncates silently to
    /// `MAX_PATH_LENGTH` entries, matching the buffer's fixed capacity.
    pub fn set_path(&mut self, vehicle: usize, edges: &[EdgeIndex]) {
        let len = edges.len().min(MAX_PATH_LENGTH);
        let base = vehicle * MAX_PATH_LENGTH;
        self.path_data[base..base + len].copy_from_slice(&edges[..len]);
        self.path_len[vehicle] = len as u16;
    }

    /// Pushes one edge index onto the end of the remaining path, if there
    /// is room. Used by RANDOM/AUTO_ROUTE transfer modes to extend a path
    /// incrementally instead of replacing it wholesale.
    pub fn push_path(&mut self, vehicle: usize, edge: EdgeIndex) -> bool {
        let len = self.path_len(vehicle);
        if len >= MAX_PATH_LENGTH {
            return false;
        }
        let base = vehicle * MAX_PATH_LENGTH;
        self.path_data[base + len] = edge;
        self.path_len[vehicle] = (len + 1) as u16;
        true
    }

    /// Shifts the path buffer left by one (spec §4.5 step 9a / Design
    /// Notes §9: "Path buffer as circular consumption, not queue"). The
    /// front element (if any) is returned.
    pub fn shift_path(&mut self, vehicle: usize) -> Option<EdgeIndex> {
        let len = self.path_len(vehicle);
        if len == 0 {
            return None;
        }
        let base = vehicle * MAX_PATH_LENGTH;
        let front = self.path_data[base];
        for i in 1..len {
            self.path_data[base + i - 1] = self.path_data[base + i];
        }
        self.path_len[vehicle] = (len - 1) as u16;
        Some(front)
    }

    pub fn clear_path(&mut self, vehicle: usize) {
        self.path_len[vehicle] = 0;
    }
}
