//! Gripper pick and place orientation.
//!
//! Orientation values 0-7 name a gripper contact position `2 * side + end`:
//! `side` is the pattern side the gripper plate rests against, `end` the end
//! of that side (see [`crate::geometry::contact_window`]). Pick positions use
//! the same numbering in the box frame, so a box placed with `r` quarter
//! turns maps pick position `q` to place position `(q + 2r) mod 8`.

use log::debug;

use crate::error::ItemIssue;
use crate::geometry::contact_window;
use crate::linking::link_axis;
use crate::model::{BoxOrient, BoxSpec, GripperConfig, GripperKind, GripperPose, Layer, LinkType, StartCorner, TcpMount};
use crate::pattern::{LabelScore, best_rotation, find_outer_box_sides, label_matches};
use crate::project::LayoutConfig;
use crate::types::{Axis, EPSILON_GENERAL, Footprint};

/// Ids of a pick chain from lead to last link.
///
/// Walks `last_link -> parent -> ... -> lead`; a broken chain yields only the lead.
pub fn chain_members(layer: &Layer, lead: usize) -> Vec<usize> {
    let Some(last) = layer.items[lead].last_link else {
        return vec![lead];
    };

    let mut members = Vec::new();
    let mut next = Some(last);
    while let Some(id) = next {
        members.push(id);
        if id == lead || members.len() > layer.items.len() {
            break;
        }
        next = layer.items[id].parent;
    }
    if members.last() != Some(&lead) {
        return vec![lead];
    }
    members.reverse();
    members
}

/// Label orientation of a whole pick unit.
///
/// Sums the label matches of every box in the chain per candidate rotation;
/// the most matches win, long-side matches break ties, then the default.
pub fn get_unit_label_orient(layer: &Layer, lead: usize, box_spec: &BoxSpec) -> Option<u8> {
    let item = layer.items.get(lead)?;
    if !item.is_placeable() {
        return None;
    }

    let rotations = item.orient.label_rotations();
    let mut scores = [LabelScore::default(); 2];
    for id in chain_members(layer, lead) {
        let outer = find_outer_box_sides(&layer.items, id);
        for (score, rotation) in scores.iter_mut().zip(rotations) {
            score.add(label_matches(box_spec, rotation, &outer));
        }
    }

    Some(best_rotation(item.orient, |rotation| {
        if rotation == rotations[0] {
            scores[0]
        } else {
            scores[1]
        }
    }))
}

/// Free gripper contact positions of unit `id`, which sits at `order_index`
/// in the placement order.
///
/// Only units placed before it are considered, and only the two sides facing
/// the start corner are tested: placement moves away from the corner, so the
/// other sides have no placed neighbours yet.
pub fn find_free_sides_new(
    layer: &Layer,
    id: usize,
    corner: StartCorner,
    order_index: usize,
    gripper: &GripperConfig,
    tolerance: f64,
) -> [bool; 8] {
    let rect = layer.items[id].footprint();
    let placed = &layer.order[..order_index.min(layer.order.len())];
    let mut free = [true; 8];

    for side in corner.facing_sides() {
        for end in 0..2 {
            let position = 2 * side + end;
            let window = contact_window(&rect, position, gripper.tcp, gripper.width, gripper.finger_depth);
            if placed
                .iter()
                .any(|&other| window.intersects(&layer.items[other].unit_rect, tolerance))
            {
                free[position] = false;
            }
        }
    }
    free
}

/// Positions the gripper can physically use on a unit.
///
/// A multi-box unit can only be gripped on the sides running along the row;
/// the two row ends are masked out.
fn reachable_positions(layer: &Layer, id: usize, box_spec: &BoxSpec) -> [bool; 8] {
    let item = &layer.items[id];
    if item.last_link.is_none() {
        return [true; 8];
    }
    let (axis, _) = link_axis(box_spec.lead, item.orient);
    // sides 0/2 face along Y, sides 1/3 along X
    let masked_parity = match axis {
        Axis::Y => 0,
        Axis::X => 1,
    };
    let mut reachable = [true; 8];
    for (position, slot) in reachable.iter_mut().enumerate() {
        if (position / 2) % 2 == masked_parity {
            *slot = false;
        }
    }
    reachable
}

fn pick_for(place: u8, rotation: u8) -> u8 {
    (place + 8 - (2 * rotation) % 8) % 8
}

fn set_chain_label_orient(layer: &mut Layer, lead: usize, rotation: u8) {
    for member in chain_members(layer, lead) {
        layer.items[member].label_orient = Some(rotation);
    }
}

/// Quadrant of the unit center around the pattern center, counter-clockwise
/// from the low X / low Y quadrant.
fn quadrant(layer: &Layer, id: usize) -> u8 {
    let center = layer.items[id].center();
    let pattern_center = layer.size.center();
    let high_x = center.x > pattern_center.x + EPSILON_GENERAL;
    let high_y = center.y > pattern_center.y + EPSILON_GENERAL;
    match (high_x, high_y) {
        (false, false) => 0,
        (true, false) => 1,
        (true, true) => 2,
        (false, true) => 3,
    }
}

/// Vacuum gripper orientation for every unit in placement order.
///
/// Multi-box units are rotated to their unit label orientation and picked in
/// the fixed infeed pose. Single boxes point the gripper outwards from the
/// pattern center. A corner mounted TCP uses the odd (corner) positions.
pub fn calc_vac_gripper_orient(layer: &mut Layer, box_spec: &BoxSpec, gripper: &GripperConfig) {
    for item in layer.items.iter_mut() {
        item.gripper = GripperPose::Unset;
    }

    let corner_bit = match gripper.tcp {
        TcpMount::Center => 0,
        TcpMount::Corner => 1,
    };

    let order = layer.order.clone();
    for id in order {
        let item = &layer.items[id];
        let default_rotation = item.orient.label_rotations()[0];

        let pose = if item.last_link.is_some() {
            let rotation = get_unit_label_orient(layer, id, box_spec).unwrap_or(default_rotation);
            set_chain_label_orient(layer, id, rotation);
            let place = 2 * rotation + corner_bit;
            GripperPose::Pose {
                pick: pick_for(place, rotation),
                place,
            }
        } else {
            let rotation = item.label_orient.unwrap_or(default_rotation);
            let place = 2 * quadrant(layer, id) + corner_bit;
            GripperPose::Pose {
                pick: pick_for(place, rotation),
                place,
            }
        };
        layer.items[id].gripper = pose;
    }
}

/// Mechanical gripper orientation for every unit in placement order.
///
/// The place position must be enabled through `avail_pick`, free of earlier
/// units and reachable for the unit shape. The label orientation is kept when
/// possible, otherwise the box is turned by 180 degrees. Units without any
/// valid position get [`GripperPose::NoSolution`] and a recorded failure.
pub fn calc_mech_gripper_orient(
    layer: &mut Layer,
    box_spec: &BoxSpec,
    gripper: &GripperConfig,
    corner: StartCorner,
    config: &LayoutConfig,
) {
    layer.failures.retain(|failure| failure.issue != ItemIssue::NoFreePlacement);
    for item in layer.items.iter_mut() {
        item.free_sides = [false; 8];
        if item.is_placeable() && !item.used {
            item.gripper = GripperPose::NoSolution;
            item.approach_dir = None;
            item.link_type = LinkType::Unset;
        } else {
            item.gripper = GripperPose::Unset;
        }
    }

    let order = layer.order.clone();
    for (order_index, &id) in order.iter().enumerate() {
        let free = find_free_sides_new(layer, id, corner, order_index, gripper, config.contact_gap);
        let reachable = reachable_positions(layer, id, box_spec);
        layer.items[id].free_sides = free;

        let item = &layer.items[id];
        let is_chain = item.last_link.is_some();
        let preferred = if is_chain {
            get_unit_label_orient(layer, id, box_spec)
        } else {
            item.label_orient
        }
        .unwrap_or(item.orient.label_rotations()[0]);

        let solution = [preferred, (preferred + 2) % 4].into_iter().find_map(|rotation| {
            (0u8..8)
                .find(|&place| {
                    let p = place as usize;
                    gripper.avail_pick[pick_for(place, rotation) as usize] && free[p] && reachable[p]
                })
                .map(|place| (rotation, place))
        });

        match solution {
            Some((rotation, place)) => {
                set_chain_label_orient(layer, id, rotation);
                layer.items[id].gripper = GripperPose::Pose {
                    pick: pick_for(place, rotation),
                    place,
                };
            }
            None => {
                layer.items[id].gripper = GripperPose::NoSolution;
                layer.record_failure(id, ItemIssue::NoFreePlacement);
            }
        }

        if is_chain && needs_chain_end_swap(layer, id, box_spec, corner, config) {
            swap_chain_ends(layer, id);
        }
    }
}

/// Whether the first and last box of a chain trade formulas.
///
/// Only active with [`LayoutConfig::swap_chain_ends`]: vertical chains
/// started from corner 1 or 4 whose lead box still sits at the end nearer
/// the start corner. Once swapped the lead box is the far one, so running
/// the solver again leaves the chain alone.
fn needs_chain_end_swap(
    layer: &Layer,
    lead: usize,
    box_spec: &BoxSpec,
    corner: StartCorner,
    config: &LayoutConfig,
) -> bool {
    let item = &layer.items[lead];
    if !config.swap_chain_ends
        || !matches!(corner, StartCorner::Origin | StartCorner::PlusY)
        || item.orient != BoxOrient::V
    {
        return false;
    }
    let Some(last) = item.last_link.filter(|&last| last != lead) else {
        return false;
    };
    let (axis, _) = link_axis(box_spec.lead, item.orient);
    let lead_pos = axis.of(item.box_rect.min);
    let last_pos = axis.of(layer.items[last].box_rect.min);
    if corner.is_low(axis) {
        lead_pos < last_pos - EPSILON_GENERAL
    } else {
        lead_pos > last_pos + EPSILON_GENERAL
    }
}

/// Exchanges the formulas (and their geometry) of the two ends of a chain,
/// so the gripper takes the far box first.
pub fn swap_chain_ends(layer: &mut Layer, lead: usize) {
    let Some(last) = layer.items[lead].last_link else {
        return;
    };
    if last == lead {
        return;
    }
    let (lo, hi) = if lead < last { (lead, last) } else { (last, lead) };
    let (head, tail) = layer.items.split_at_mut(hi);
    let (a, b) = (&mut head[lo], &mut tail[0]);
    std::mem::swap(&mut a.formula, &mut b.formula);
    std::mem::swap(&mut a.parsed, &mut b.parsed);
    std::mem::swap(&mut a.box_rect, &mut b.box_rect);
    debug!("swapped chain ends {} and {}", lead, last);
}

/// Dispatches to the solver of the configured gripper family.
pub fn calc_gripper_orient(
    layer: &mut Layer,
    box_spec: &BoxSpec,
    gripper: &GripperConfig,
    corner: StartCorner,
    config: &LayoutConfig,
) {
    match gripper.kind {
        GripperKind::Vacuum => calc_vac_gripper_orient(layer, box_spec, gripper),
        GripperKind::Mechanical => calc_mech_gripper_orient(layer, box_spec, gripper, corner, config),
    }
}
