//! Deterministic fixed-point mathematics library.
//!
//! This module provides deterministic math types and operations using fixed-point
//! arithmetic so the movement pipeline produces bit-identical results on every
//! platform it runs on. That matters here for the same reason it matters in
//! lockstep multiplayer: two workers simulating the same graph with the same
//! inputs must reach the same per-tick positions, or downstream tooling built
//! on top of the renderer's packed buffer will disagree with itself.

use fixed::types::I48F16;

pub use vec2::FixedVec2;
pub(crate) use vec2::sqrt_fixed;

mod vec2;

/// Fixed-point number type used throughout the simulation.
///
/// Uses I48F16 format: 48 bits for the integer part, 16 bits for the fractional part.
/// This provides a range of approximately ±140 trillion with a precision of ~0.000015.
pub type FixedNum = I48F16;
