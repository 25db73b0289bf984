//! Position interpolation (component C3, spec §4.1).
//!
//! Grounded on the teacher's road-movement sibling pattern in
//! `other_examples/.../traffic-control-tower-movement.rs`
//! (`sync_position_system` + `interpolate_along_polyline`: progress along a
//! polyline by accumulating segment lengths), extended with the curve
//! tangent-stabilization rule spec.md requires for short segments.

use super::edge::{Edge, RailType};
use super::fixed_math::{FixedNum, FixedVec2};

/// `(x, y, z, rotation_degrees)`.
pub type InterpolatedPose = (FixedNum, FixedNum, FixedNum, FixedNum);

/// Minimum squared segment length before the tangent is considered stable
/// enough to derive a rotation from (spec §4.1: "< 0.01").
const MIN_STABLE_LEN_SQ: f64 = 0.01;

/// Maps `(edge, ratio)` to a world pose, per spec §4.1.
pub fn interpolate(edge: &Edge, ratio: FixedNum, default_z: FixedNum) -> InterpolatedPose {
    if edge.rendering_points.is_empty() {
        let axis_rotation = FixedNum::ZERO;
        return (FixedNum::ZERO, FixedNum::ZERO, default_z, axis_rotation);
    }

    let clamped = ratio.clamp(FixedNum::ZERO, FixedNum::ONE);

    match edge.rail_type {
        RailType::Linear => interpolate_linear(edge, clamped, default_z),
        _ => interpolate_curve(edge, clamped, default_z),
    }
}

fn interpolate_linear(edge: &Edge, ratio: FixedNum, default_z: FixedNum) -> InterpolatedPose {
    let points = &edge.rendering_points;
    let start = points[0];
    let end = *points.last().unwrap();
    let pos = start + (end - start) * ratio;

    let dx = (end.x - start.x).to_num::<f64>();
    let dy = (end.y - start.y).to_num::<f64>();
    let rotation = snap_axis_rotation(dx, dy);

    (pos.x, pos.y, default_z, FixedNum::from_num(rotation))
}

/// Snaps to {0, 90, 180, -90} degrees based on the dominant axis and sign
/// (spec §4.1: "this guarantees axis-aligned rail segments render cleanly").
fn snap_axis_rotation(dx: f64, dy: f64) -> f64 {
    if dx.abs() >= dy.abs() {
        if dx >= 0.0 {
            0.0
        } else {
            180.0
        }
    } else if dy >= 0.0 {
        90.0
    } else {
        -90.0
    }
}

fn interpolate_curve(edge: &Edge, ratio: FixedNum, default_z: FixedNum) -> InterpolatedPose {
    let points = &edge.rendering_points;
    if points.len() == 1 {
        let p = points[0];
        return (p.x, p.y, default_z, FixedNum::ZERO);
    }

    let n = points.len();
    let scaled = ratio * FixedNum::from_num(n - 1);
    let seg = scaled.floor().to_num::<usize>().min(n - 2);
    let local = (scaled - FixedNum::from_num(seg)).min(FixedNum::ONE);

    let pos = points[seg] + (points[seg + 1] - points[seg]) * local;
    let (dx, dy) = stabilized_tangent(points, seg);
    let rotation = normalize_degrees(atan2_degrees(dy, dx));

    (pos.x, pos.y, default_z, FixedNum::from_num(rotation))
}

/// Finds a tangent direction at `points[seg] -> points[seg+1]`, scanning
/// forward then backward for a farther point if the local segment is too
/// short to give a stable direction (spec §4.1).
fn stabilized_tangent(points: &[FixedVec2], seg: usize) -> (f64, f64) {
    let base = points[seg];

    // Scan forward from seg+1.
    for j in (seg + 1)..points.len() {
        let d = points[j] - base;
        let len_sq = d.length_squared().to_num::<f64>();
        if len_sq >= MIN_STABLE_LEN_SQ || j == points.len() - 1 {
            if len_sq > 0.0 {
                return (d.x.to_num::<f64>(), d.y.to_num::<f64>());
            }
        }
    }

    // Scan backward from seg-1.
    for j in (0..seg).rev() {
        let d = base - points[j];
        let len_sq = d.length_squared().to_num::<f64>();
        if len_sq >= MIN_STABLE_LEN_SQ || j == 0 {
            if len_sq > 0.0 {
                return (d.x.to_num::<f64>(), d.y.to_num::<f64>());
            }
        }
    }

    // Degenerate polyline (all points coincide).
    (1.0, 0.0)
}

fn atan2_degrees(dy: f64, dx: f64) -> f64 {
    dy.atan2(dx).to_degrees()
}

/// Normalizes an angle in degrees to `[0, 360)` (spec §4.1).
fn normalize_degrees(mut deg: f64) -> f64 {
    deg %= 360.0;
    if deg < 0.0 {
        deg += 360.0;
    }
    deg
}
