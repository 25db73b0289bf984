//! Kinematic primitives (component C4, spec §4.2).
//!
//! Grounded on the teacher's `simulation/physics.rs` clamping style
//! (`apply_velocity`/`apply_friction`: compute, clamp to a max, write
//! back) but expressed as free functions over scalars instead of ECS
//! queries, since there is no velocity *vector* here — vehicles move
//! along a 1D edge ratio, not through open 2D space.

use super::edge::RailType;
use super::fixed_math::FixedNum;

/// Returns the configured max speed for travelling on `rail_type`.
pub fn max_speed(rail_type: RailType, linear_max_speed: FixedNum, curve_max_speed: FixedNum) -> FixedNum {
    if rail_type.is_curve() {
        curve_max_speed
    } else {
        linear_max_speed
    }
}

/// Advances velocity by one tick under the given (signed) acceleration and
/// deceleration, clamped to `[0, max_speed]` (spec §4.2).
///
/// `deceleration` is expected `<= 0`; a deceleration of `FixedNum::MIN`
/// acts as the "emergency stop" sentinel and forces velocity straight to
/// zero, matching "`if d == -infinity return 0`" in spec.md (there is no
/// literal infinity in fixed-point, so the type's minimum value plays that
/// role — see [`crate::sim::vehicle::StopReason::E_STOP`] callers, which
/// never pass this sentinel through `next_speed` and instead zero velocity
/// directly; it exists here for API completeness with the spec text).
pub fn next_speed(
    v: FixedNum,
    a: FixedNum,
    d: FixedNum,
    rail_type: RailType,
    dt: FixedNum,
    linear_max_speed: FixedNum,
    curve_max_speed: FixedNum,
) -> FixedNum {
    if d == FixedNum::MIN {
        return FixedNum::ZERO;
    }
    let applied = if d < FixedNum::ZERO { d } else { a };
    let raw = v + applied * dt;
    let cap = max_speed(rail_type, linear_max_speed, curve_max_speed);
    raw.clamp(FixedNum::ZERO, cap)
}

/// Distance needed to decelerate from `v_from` to `v_to` at magnitude
/// `decel` (spec §4.2): `(v_from^2 - v_to^2) / (2*|decel|)`, clamped >= 0.
/// Returns 0 when `decel >= 0` (no braking force).
pub fn brake_distance(v_from: FixedNum, v_to: FixedNum, decel: FixedNum) -> FixedNum {
    if decel >= FixedNum::ZERO {
        return FixedNum::ZERO;
    }
    let magnitude = -decel;
    let dist = (v_from * v_from - v_to * v_to) / (FixedNum::from_num(2) * magnitude);
    dist.max(FixedNum::ZERO)
}

/// Inverse of [`brake_distance`]: the speed that, decelerating at `decel`
/// over `dist`, arrives at `v_target` (spec §4.2).
pub fn max_speed_for_distance(v_target: FixedNum, dist: FixedNum, decel: FixedNum) -> FixedNum {
    let magnitude = if decel < FixedNum::ZERO { -decel } else { decel };
    let under_root = v_target * v_target + FixedNum::from_num(2) * magnitude * dist;
    super::fixed_math::sqrt_fixed(under_root)
}
