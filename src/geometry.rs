//! Geometric helpers for side adjacency and gripper contact windows.
//!
//! Pattern sides are numbered counter-clockwise starting at the side nearest
//! the pallet origin: 0 = -Y, 1 = +X, 2 = +Y, 3 = -X.

use crate::model::TcpMount;
use crate::types::{Axis, Rect, Vec2};

/// Axis a side runs along.
pub fn side_axis(side: usize) -> Axis {
    if side % 2 == 0 { Axis::X } else { Axis::Y }
}

/// Checks whether `other` touches `rect` flush along the given side.
///
/// Edges must coincide within `tolerance` and the projections onto the side
/// must overlap by more than `tolerance`; corner contact does not count.
pub fn touches_on_side(rect: &Rect, other: &Rect, side: usize, tolerance: f64) -> bool {
    let flush = match side % 4 {
        0 => (other.max.y - rect.min.y).abs() <= tolerance,
        1 => (other.min.x - rect.max.x).abs() <= tolerance,
        2 => (other.min.y - rect.max.y).abs() <= tolerance,
        _ => (other.max.x - rect.min.x).abs() <= tolerance,
    };
    flush && rect.overlap_along(other, side_axis(side)) > tolerance
}

/// Checks whether `other` lies entirely on the low (or high) side of `rect` along `axis`.
pub fn lies_beyond(rect: &Rect, other: &Rect, axis: Axis, low: bool, tolerance: f64) -> bool {
    if low {
        axis.of(other.max) <= axis.of(rect.min) + tolerance
    } else {
        axis.of(other.min) >= axis.of(rect.max) - tolerance
    }
}

/// Contact window of gripper position `position = 2 * side + end` around `rect`.
///
/// The window sits outside the side with the given `depth`. With a corner
/// mounted TCP it is flush with one corner of the side (`end == 0` at the
/// counter-clockwise start of the side), with a center mounted TCP it is
/// centered on the side and `end` only flips the gripper.
pub fn contact_window(rect: &Rect, position: usize, tcp: TcpMount, width: f64, depth: f64) -> Rect {
    let side = (position / 2) % 4;
    let end = position % 2;
    let axis = side_axis(side);
    let lo = axis.of(rect.min);
    let hi = axis.of(rect.max);

    let (start, stop) = match tcp {
        TcpMount::Center => {
            let mid = (lo + hi) / 2.0;
            (mid - width / 2.0, mid + width / 2.0)
        }
        TcpMount::Corner => {
            // sides 0 and 1 start at their low end, sides 2 and 3 at their high end
            let at_low = (side < 2) == (end == 0);
            if at_low {
                (lo, lo + width)
            } else {
                (hi - width, hi)
            }
        }
    };

    match side {
        0 => Rect::new(
            Vec2::new(start, rect.min.y - depth),
            Vec2::new(stop, rect.min.y),
        ),
        1 => Rect::new(
            Vec2::new(rect.max.x, start),
            Vec2::new(rect.max.x + depth, stop),
        ),
        2 => Rect::new(
            Vec2::new(start, rect.max.y),
            Vec2::new(stop, rect.max.y + depth),
        ),
        _ => Rect::new(
            Vec2::new(rect.min.x - depth, start),
            Vec2::new(rect.min.x, stop),
        ),
    }
}
