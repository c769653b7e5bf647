//! Placement order and approach direction.
//!
//! Units are placed starting at the chosen pattern corner: nearest unit
//! center first, corrected by a single sweep of collision-avoidance swaps.
//! The approach direction of every unit then follows from the units already
//! standing next to it.

use log::debug;

use crate::geometry::{lies_beyond, touches_on_side};
use crate::model::{Layer, PatternItem, StartCorner};
use crate::types::{Axis, EPSILON_CONTACT, EPSILON_GENERAL, Footprint, Rect};

/// Checks whether `later` stands between the start corner and `earlier`.
///
/// True when `later` lies entirely on the corner side of `earlier` along X
/// with overlapping Y ranges, or along Y with overlapping X ranges.
pub fn blocks(later: &Rect, earlier: &Rect, corner: StartCorner) -> bool {
    let along_x = lies_beyond(earlier, later, Axis::X, corner.is_low(Axis::X), EPSILON_CONTACT)
        && earlier.overlap_along(later, Axis::Y) > EPSILON_CONTACT;
    let along_y = lies_beyond(earlier, later, Axis::Y, corner.is_low(Axis::Y), EPSILON_CONTACT)
        && earlier.overlap_along(later, Axis::X) > EPSILON_CONTACT;
    along_x || along_y
}

/// One forward sweep over all pairs, swapping blocked pairs in place.
///
/// This is not repeated until stable: a swap can move a unit in front of
/// one that was already compared against the old occupant of its slot.
pub fn collision_sweep(items: &[PatternItem], order: &mut [usize], corner: StartCorner) {
    for i in 0..order.len() {
        for j in (i + 1)..order.len() {
            if blocks(&items[order[j]].unit_rect, &items[order[i]].unit_rect, corner) {
                order.swap(i, j);
            }
        }
    }
}

/// Computes the placement order of all unit leads and stores it in `layer.order`.
///
/// Deterministic: the sort is a stable insertion sort on the distance from the
/// corner to the unit center, ties keep id order.
pub fn calc_item_order(layer: &mut Layer, corner: StartCorner) -> Vec<usize> {
    let origin = layer.size.corner(corner);
    let leads: Vec<usize> = layer.unit_leads().collect();

    for &id in &leads {
        let item = &mut layer.items[id];
        item.center_dist = origin.distance_to(&item.center());
    }

    let mut order: Vec<usize> = Vec::with_capacity(leads.len());
    for id in leads {
        let dist = layer.items[id].center_dist;
        let at = order
            .iter()
            .position(|&placed| layer.items[placed].center_dist > dist + EPSILON_GENERAL)
            .unwrap_or(order.len());
        order.insert(at, id);
    }

    collision_sweep(&layer.items, &mut order, corner);
    debug!(
        "{:?} corner {}: placement order {:?}",
        layer.pattern_ref,
        corner.code(),
        order
    );
    layer.order = order.clone();
    order
}

/// Maps the summed axis signals to the approach code (1-8 clockwise from east).
pub fn approach_code(x_dir: i8, y_dir: i8) -> u8 {
    match x_dir + y_dir {
        2 => 1,
        -1 => 2,
        -3 => 3,
        -5 => 4,
        -2 => 5,
        1 => 6,
        3 => 7,
        5 => 8,
        _ => 0,
    }
}

/// Sets the approach direction of every unit in `layer.order`.
///
/// The first unit comes straight down. Every later unit slides towards the
/// first earlier unit found flush against it on each axis: `x_dir` is -2 or
/// +2, `y_dir` is -3 or +3, and the sum selects the code.
pub fn calc_approach_angle(layer: &mut Layer) {
    for item in layer.items.iter_mut() {
        item.approach_dir = None;
    }

    let order = layer.order.clone();
    for (pos, &id) in order.iter().enumerate() {
        let rect = layer.items[id].unit_rect;
        let mut x_dir = 0i8;
        let mut y_dir = 0i8;

        for &prev in &order[..pos] {
            let other = &layer.items[prev].unit_rect;
            if x_dir == 0 {
                if touches_on_side(&rect, other, 3, EPSILON_CONTACT) {
                    x_dir = -2;
                } else if touches_on_side(&rect, other, 1, EPSILON_CONTACT) {
                    x_dir = 2;
                }
            }
            if y_dir == 0 {
                if touches_on_side(&rect, other, 0, EPSILON_CONTACT) {
                    y_dir = -3;
                } else if touches_on_side(&rect, other, 2, EPSILON_CONTACT) {
                    y_dir = 3;
                }
            }
        }

        layer.items[id].approach_dir = Some(approach_code(x_dir, y_dir));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linking::link_units;
    use crate::model::{BoxSpec, PatternRef};
    use crate::pattern::calc_pattern;
    use crate::types::Vec2;

    fn layer(formulas: &[&str], pick_lsl: u32, corner: StartCorner) -> Layer {
        let spec = BoxSpec::new(400.0, 300.0, 200.0, 5.0)
            .unwrap()
            .with_picks(pick_lsl, 1);
        let mut layer = Layer::from_formulas(PatternRef::Odd, formulas, &spec);
        calc_pattern(&mut layer, &spec);
        link_units(&mut layer, &spec, corner).unwrap();
        layer
    }

    const GRID: [&str; 4] = ["H;0;0;", "H;l;0;", "H;0;w;", "H;l;w;"];

    #[test]
    fn nearest_to_corner_comes_first() {
        let mut l = layer(&GRID, 1, StartCorner::Origin);
        assert_eq!(calc_item_order(&mut l, StartCorner::Origin), vec![0, 2, 1, 3]);

        let mut l = layer(&GRID, 1, StartCorner::PlusXY);
        assert_eq!(calc_item_order(&mut l, StartCorner::PlusXY), vec![3, 1, 2, 0]);

        let mut l = layer(&GRID, 1, StartCorner::PlusX);
        assert_eq!(calc_item_order(&mut l, StartCorner::PlusX), vec![1, 3, 0, 2]);
    }

    #[test]
    fn ordering_is_deterministic() {
        for corner in StartCorner::ALL {
            let mut l = layer(&GRID, 1, corner);
            let first = calc_item_order(&mut l, corner);
            let second = calc_item_order(&mut l, corner);
            assert_eq!(first, second);
            assert_eq!(l.order, second);
        }
    }

    #[test]
    fn absorbed_boxes_are_not_ordered() {
        let mut l = layer(&["H;0;0;", "H;0;w;", "H;l;0;"], 2, StartCorner::Origin);
        let order = calc_item_order(&mut l, StartCorner::Origin);
        assert_eq!(order.len(), 2);
        assert!(!order.contains(&1));
    }

    #[test]
    fn long_unit_beside_a_nearer_box_is_swapped_forward() {
        // a five box column at x = 0 and a single box to its right
        let mut formulas: Vec<String> = (0..5).map(|i| format!("H;0;{}w;", i)).collect();
        formulas.push("H;l;0;".to_string());
        let refs: Vec<&str> = formulas.iter().map(String::as_str).collect();
        let mut l = layer(&refs, 5, StartCorner::Origin);

        // the single box center is nearer, but the column stands between it and the corner
        assert!(l.items[5].center().distance_to(&Vec2::zero()) < l.items[0].center().distance_to(&Vec2::zero()));
        assert_eq!(calc_item_order(&mut l, StartCorner::Origin), vec![0, 5]);
    }

    #[test]
    fn single_sweep_can_leave_a_blocked_pair() {
        let mut l = layer(&["H;0;0;", "H;l;0;", "H;2l;0;"], 1, StartCorner::Origin);
        let rect = |x0, y0, x1, y1| Rect::new(Vec2::new(x0, y0), Vec2::new(x1, y1));
        let (a, b, c) = (0, 1, 2);
        l.items[a].unit_rect = rect(1000.0, 0.0, 1100.0, 100.0);
        l.items[b].unit_rect = rect(100.0, -200.0, 200.0, -100.0);
        l.items[c].unit_rect = rect(0.0, 50.0, 900.0, 3000.0);

        let mut order = vec![a, b, c];
        collision_sweep(&l.items, &mut order, StartCorner::Origin);
        assert_eq!(order, vec![c, b, a]);
        // b still stands between the corner and c, a second sweep would fix it
        assert!(blocks(&l.items[b].unit_rect, &l.items[c].unit_rect, StartCorner::Origin));
    }

    #[test]
    fn approach_codes_cover_all_directions() {
        assert_eq!(approach_code(0, 0), 0);
        assert_eq!(approach_code(2, 0), 1);
        assert_eq!(approach_code(2, -3), 2);
        assert_eq!(approach_code(0, -3), 3);
        assert_eq!(approach_code(-2, -3), 4);
        assert_eq!(approach_code(-2, 0), 5);
        assert_eq!(approach_code(-2, 3), 6);
        assert_eq!(approach_code(0, 3), 7);
        assert_eq!(approach_code(2, 3), 8);
    }

    #[test]
    fn approach_slides_towards_placed_neighbours() {
        let mut l = layer(&GRID, 1, StartCorner::Origin);
        calc_item_order(&mut l, StartCorner::Origin);
        calc_approach_angle(&mut l);

        assert_eq!(l.order, vec![0, 2, 1, 3]);
        assert_eq!(l.items[0].approach_dir, Some(0));
        // above box 0: moves south
        assert_eq!(l.items[2].approach_dir, Some(3));
        // right of box 0: moves west
        assert_eq!(l.items[1].approach_dir, Some(5));
        // above box 1 and right of box 2: moves south-west
        assert_eq!(l.items[3].approach_dir, Some(4));
    }

    #[test]
    fn approach_mirrors_for_opposite_corner() {
        let mut l = layer(&GRID, 1, StartCorner::PlusXY);
        calc_item_order(&mut l, StartCorner::PlusXY);
        calc_approach_angle(&mut l);

        assert_eq!(l.items[3].approach_dir, Some(0));
        assert_eq!(l.items[2].approach_dir, Some(1));
        assert_eq!(l.items[1].approach_dir, Some(7));
        assert_eq!(l.items[0].approach_dir, Some(8));
    }
}
