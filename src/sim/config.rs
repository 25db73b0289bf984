//! Runtime simulation configuration (spec §6).
//!
//! Collapses the teacher's two-layer split (`config::GameConfig` loaded
//! from RON as an asset, copied once into `simulation::resources::SimConfig`
//! as fixed-point) into a single struct: there is no hot-reload asset
//! pipeline here, so one `serde`-deserializable struct with a `Default`
//! impl plays both roles.

use serde::{Deserialize, Serialize};

use super::fixed_math::FixedNum;

/// Lock arbitration strategy for merge nodes (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantStrategy {
    Fifo,
    Batch,
}

/// Path replenishment policy (spec §4.4, §GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMode {
    Loop,
    Random,
    MqttControl,
    AutoRoute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub linear_max_speed: f64,
    pub curve_max_speed: f64,
    pub curve_acceleration: f64,
    /// Negative, m/s^2.
    pub linear_pre_brake_deceleration: f64,
    /// Milliseconds; -1 disables the periodic curve look-ahead check.
    pub curve_pre_brake_check_interval: i64,
    pub vehicle_z_offset: f64,

    pub wait_distance_from_merging_str: f64,
    pub wait_distance_from_merging_curve: f64,
    /// Negative => request lock on entry to the edge.
    pub request_distance_from_merging_str: f64,
    pub request_distance_from_merging_curve: f64,
    pub grant_strategy: GrantStrategy,

    pub transfer_mode: TransferMode,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            linear_max_speed: 2.0,
            curve_max_speed: 1.0,
            curve_acceleration: 0.5,
            linear_pre_brake_deceleration: -2.0,
            curve_pre_brake_check_interval: 200,
            vehicle_z_offset: 0.0,
            wait_distance_from_merging_str: 1.0,
            wait_distance_from_merging_curve: 1.5,
            request_distance_from_merging_str: -1.0,
            request_distance_from_merging_curve: -1.0,
            grant_strategy: GrantStrategy::Fifo,
            transfer_mode: TransferMode::Loop,
        }
    }
}

impl SimConfig {
    /// Loads a config from a RON document, matching the teacher's
    /// `*.game_config.ron` asset format but parsed eagerly instead of
    /// through an asset server (there is no asset server in this crate).
    pub fn from_ron_str(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    pub fn linear_max_speed_fixed(&self) -> FixedNum {
        FixedNum::from_num(self.linear_max_speed)
    }

    pub fn curve_max_speed_fixed(&self) -> FixedNum {
        FixedNum::from_num(self.curve_max_speed)
    }

    pub fn curve_acceleration_fixed(&self) -> FixedNum {
        FixedNum::from_num(self.curve_acceleration)
    }

    pub fn linear_pre_brake_deceleration_fixed(&self) -> FixedNum {
        FixedNum::from_num(self.linear_pre_brake_deceleration)
    }

    pub fn wait_distance_from_merging_str_fixed(&self) -> FixedNum {
        FixedNum::from_num(self.wait_distance_from_merging_str)
    }

    pub fn wait_distance_from_merging_curve_fixed(&self) -> FixedNum {
        FixedNum::from_num(self.wait_distance_from_merging_curve)
    }

    pub fn request_distance_from_merging_str_fixed(&self) -> FixedNum {
        FixedNum::from_num(self.request_distance_from_merging_str)
    }

    pub fn request_distance_from_merging_curve_fixed(&self) -> FixedNum {
        FixedNum::from_num(self.request_distance_from_merging_curve)
    }

    pub fn vehicle_z_offset_fixed(&self) -> FixedNum {
        FixedNum::from_num(self.vehicle_z_offset)
    }
}
