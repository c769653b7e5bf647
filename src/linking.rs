//! Multi-box linking.
//!
//! Groups collinear, adjacent boxes into rows the gripper can pick in one
//! cycle. Long-side-lead boxes are linked across their long sides (the row
//! steps by the box width), short-side-lead boxes across their short sides
//! (the row steps by the box length). Rows are split at gaps and at the
//! gripper capacity, then turned into parent chains.

use std::collections::VecDeque;

use log::debug;

use crate::error::LayoutError;
use crate::formula::{Formula, LinearExpr, Var};
use crate::model::{BoxOrient, BoxSpec, Layer, LeadType, PatternItem, StartCorner};
use crate::types::{Axis, EPSILON_GENERAL};

/// Axis a row runs along and the variable its coefficient steps in.
pub fn link_axis(lead: LeadType, orient: BoxOrient) -> (Axis, Var) {
    match (lead, orient) {
        (LeadType::Lsl, BoxOrient::H) => (Axis::Y, Var::Width),
        (LeadType::Lsl, BoxOrient::V) => (Axis::X, Var::Width),
        (LeadType::Ssl, BoxOrient::H) => (Axis::X, Var::Length),
        (LeadType::Ssl, BoxOrient::V) => (Axis::Y, Var::Length),
    }
}

fn axis_expr(formula: &Formula, axis: Axis) -> &LinearExpr {
    match axis {
        Axis::X => &formula.x,
        Axis::Y => &formula.y,
    }
}

/// Stepping coefficient of an item along its link axis.
fn step_of(item: &PatternItem, lead: LeadType) -> f64 {
    match &item.parsed {
        Some(formula) => {
            let (axis, var) = link_axis(lead, formula.orient);
            axis_expr(formula, axis).coeff(var)
        }
        None => 0.0,
    }
}

fn same_row(a: &Formula, b: &Formula, lead: LeadType) -> bool {
    if a.orient != b.orient {
        return false;
    }
    let (axis, var) = link_axis(lead, a.orient);
    if !Formula::same_expr(axis_expr(a, axis.other()), axis_expr(b, axis.other())) {
        return false;
    }

    let (ea, eb) = (axis_expr(a, axis), axis_expr(b, axis));
    let other = var.other();
    let step_diff = ea.coeff(var) - eb.coeff(var);
    (ea.coeff(other) - eb.coeff(other)).abs() < EPSILON_GENERAL
        && (ea.constant - eb.constant).abs() < EPSILON_GENERAL
        && (step_diff - step_diff.round()).abs() < EPSILON_GENERAL
}

/// Groups boxes into candidate rows and splits the rows at gaps.
///
/// Every returned row is sorted ascending along its link axis and consists
/// of boxes exactly one step apart.
pub fn find_linked_candidates(layer: &Layer, lead: LeadType) -> Vec<Vec<usize>> {
    let mut rows: Vec<Vec<usize>> = Vec::new();
    for item in layer.items.iter() {
        let Some(formula) = &item.parsed else {
            continue;
        };
        let existing = rows.iter_mut().find(|row| {
            layer.items[row[0]]
                .parsed
                .as_ref()
                .is_some_and(|first| same_row(first, formula, lead))
        });
        match existing {
            Some(row) => row.push(item.id),
            None => rows.push(vec![item.id]),
        }
    }

    for row in rows.iter_mut() {
        row.sort_by(|&a, &b| {
            step_of(&layer.items[a], lead)
                .partial_cmp(&step_of(&layer.items[b], lead))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });
    }

    split_gaps(rows, &layer.items, lead)
}

/// Long-side-lead candidate rows.
pub fn find_lsl_linked_candidates(layer: &Layer) -> Vec<Vec<usize>> {
    find_linked_candidates(layer, LeadType::Lsl)
}

/// Short-side-lead candidate rows.
pub fn find_ssl_linked_candidates(layer: &Layer) -> Vec<Vec<usize>> {
    find_linked_candidates(layer, LeadType::Ssl)
}

fn split_gaps(rows: Vec<Vec<usize>>, items: &[PatternItem], lead: LeadType) -> Vec<Vec<usize>> {
    let mut queue: VecDeque<Vec<usize>> = rows.into();
    let mut done = Vec::new();

    while let Some(row) = queue.pop_front() {
        // duplicates (step 0) are split too, overlapping boxes cannot share a grip
        let gap = row.windows(2).position(|pair| {
            let diff = step_of(&items[pair[1]], lead) - step_of(&items[pair[0]], lead);
            (diff - 1.0).abs() > EPSILON_GENERAL
        });
        match gap {
            Some(at) => {
                let mut head = row;
                let tail = head.split_off(at + 1);
                done.push(head);
                queue.push_back(tail);
            }
            None => done.push(row),
        }
    }
    done
}

/// Splits rows longer than `capacity` into gripper loads.
///
/// The chunk placed last in a row is always full: when the start corner sits
/// at the low end of the link axis the row is placed from low to high, so
/// full chunks are cut from the high end and the remainder stays at the low
/// end; otherwise the other way round.
pub fn split_rows(
    layer: &Layer,
    rows: Vec<Vec<usize>>,
    lead: LeadType,
    capacity: usize,
    corner: StartCorner,
) -> Vec<Vec<usize>> {
    let capacity = capacity.max(1);
    let mut queue: VecDeque<Vec<usize>> = rows.into();
    let mut done = Vec::new();

    while let Some(mut row) = queue.pop_front() {
        if row.len() <= capacity {
            done.push(row);
            continue;
        }
        let (axis, _) = link_axis(lead, layer.items[row[0]].orient);
        if corner.is_low(axis) {
            let chunk = row.split_off(row.len() - capacity);
            done.push(chunk);
            queue.push_back(row);
        } else {
            let rest = row.split_off(capacity);
            done.push(row);
            queue.push_back(rest);
        }
    }

    done.sort_by_key(|row| row[0]);
    done
}

/// Long-side-lead capacity split.
pub fn split_lsl_rows(
    layer: &Layer,
    rows: Vec<Vec<usize>>,
    box_spec: &BoxSpec,
    corner: StartCorner,
) -> Vec<Vec<usize>> {
    split_rows(layer, rows, LeadType::Lsl, box_spec.pick_lsl as usize, corner)
}

/// Short-side-lead capacity split.
pub fn split_ssl_rows(
    layer: &Layer,
    rows: Vec<Vec<usize>>,
    box_spec: &BoxSpec,
    corner: StartCorner,
) -> Vec<Vec<usize>> {
    split_rows(layer, rows, LeadType::Ssl, box_spec.pick_ssl as usize, corner)
}

/// Turns rows into pick chains: the first box leads, every following box
/// points at its predecessor and is absorbed into the lead's unit.
pub fn assign_chains(layer: &mut Layer, rows: &[Vec<usize>]) {
    for row in rows.iter().filter(|row| row.len() > 1) {
        let lead = row[0];
        let last = row[row.len() - 1];
        for pair in row.windows(2) {
            let child = &mut layer.items[pair[1]];
            child.parent = Some(pair[0]);
            child.used = false;
        }
        let last_unit = layer.items[last].unit_rect;
        let lead_item = &mut layer.items[lead];
        lead_item.parent = None;
        lead_item.last_link = Some(last);
        lead_item.unit_rect.extend_end(&last_unit);
    }
}

/// Recomputes all pick chains of the layer for the active infeed orientation.
pub fn link_units(
    layer: &mut Layer,
    box_spec: &BoxSpec,
    corner: StartCorner,
) -> Result<(), LayoutError> {
    for item in layer.items.iter_mut() {
        item.parent = None;
        item.last_link = None;
        item.used = true;
        item.unit_rect = item.box_rect;
    }

    let capacity = box_spec.pick_count() as usize;
    if capacity <= 1 {
        return Ok(());
    }

    let rows = match box_spec.lead {
        LeadType::Lsl => {
            let candidates = find_lsl_linked_candidates(layer);
            split_lsl_rows(layer, candidates, box_spec, corner)
        }
        LeadType::Ssl => {
            let candidates = find_ssl_linked_candidates(layer);
            split_ssl_rows(layer, candidates, box_spec, corner)
        }
    };
    assign_chains(layer, &rows);
    debug!(
        "{:?} corner {}: {} pick units from {} boxes",
        layer.pattern_ref,
        corner.code(),
        rows.len(),
        layer.items.len()
    );
    validate_links(&layer.items)
}

/// Rejects parent or last-link ids that do not exist and parent cycles.
pub fn validate_links(items: &[PatternItem]) -> Result<(), LayoutError> {
    for item in items {
        if let Some(target) = item.last_link {
            if target >= items.len() {
                return Err(LayoutError::UnresolvableLink {
                    id: item.id,
                    field: "last_link",
                    target,
                });
            }
        }

        let mut steps = 0;
        let mut next = item.parent;
        while let Some(parent) = next {
            if parent >= items.len() || steps >= items.len() {
                return Err(LayoutError::UnresolvableLink {
                    id: item.id,
                    field: "parent",
                    target: parent,
                });
            }
            steps += 1;
            next = items[parent].parent;
        }
    }
    Ok(())
}
