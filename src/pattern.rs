//! Pattern builder: turns formulas into box geometry.
//!
//! Evaluates every item formula of a layer, computes box and unit rectangles,
//! feeds the pattern size tracker, collects cluster groups and derives the
//! default label orientation from the outer sides of every box.

use std::cmp::Ordering;

use log::debug;

use crate::error::LayoutError;
use crate::formula::Formula;
use crate::geometry::touches_on_side;
use crate::linking::validate_links;
use crate::model::{BoxOrient, BoxSpec, Cluster, Layer, PatternItem};
use crate::types::{EPSILON_CONTACT, EPSILON_GENERAL, Rect};

/// Minimum cluster size that gets a geometric intra-cluster order.
const CLUSTER_SORT_MIN: usize = 3;

/// Computes box geometry for every item of the layer.
///
/// Resets all derived state first, so calling it again on the same layer
/// never leaks values from a previous pass. Items whose formula fails are
/// recorded in `layer.failures` and stay without geometry.
pub fn calc_pattern(layer: &mut Layer, box_spec: &BoxSpec) {
    let link_type = box_spec.link_type();
    layer.size.reset_ranges();
    layer.order.clear();
    layer.failures.clear();

    let mut failures = Vec::new();
    for item in layer.items.iter_mut() {
        item.reset_derived(link_type);
        match Formula::parse(&item.formula) {
            Ok(formula) => {
                let origin = formula.origin(box_spec.length, box_spec.width);
                let extent = formula.orient.extent(box_spec.length, box_spec.width);
                item.orient = formula.orient;
                item.box_rect = Rect::from_origin_and_extent(origin, extent);
                item.unit_rect = item.box_rect;
                layer.size.set_x(origin.x, extent.x);
                layer.size.set_y(origin.y, extent.y);
                item.parsed = Some(formula);
            }
            Err(err) => failures.push((item.id, err)),
        }
    }
    for (id, err) in failures {
        layer.record_failure(id, err);
    }

    layer.clusters = collect_clusters(&layer.items);
    debug!(
        "{:?}: {} items, pattern {:.1} x {:.1}",
        layer.pattern_ref,
        layer.items.len(),
        layer.size.size_x,
        layer.size.size_y
    );
}

/// Grows the unit end of every ancestor in a pick chain over its descendants.
///
/// Must run after linking; rejects dangling or cyclic links.
pub fn expand_unit_ends(layer: &mut Layer) -> Result<(), LayoutError> {
    validate_links(&layer.items)?;

    for idx in 0..layer.items.len() {
        let child_unit = layer.items[idx].unit_rect;
        let mut next = layer.items[idx].parent;
        while let Some(parent) = next {
            let ancestor = &mut layer.items[parent];
            ancestor.unit_rect.extend_end(&child_unit);
            next = ancestor.parent;
        }
    }
    Ok(())
}

fn collect_clusters(items: &[PatternItem]) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    for item in items {
        let Some(name) = item.cluster() else {
            continue;
        };
        match clusters.iter_mut().find(|c| c.name == name) {
            Some(cluster) => cluster.members.push(item.id),
            None => clusters.push(Cluster {
                name: name.to_string(),
                members: vec![item.id],
            }),
        }
    }

    for cluster in clusters.iter_mut() {
        if cluster.members.len() < CLUSTER_SORT_MIN {
            continue;
        }
        // one axis is constant inside a cluster, so (y, x) also covers x-runs
        cluster.members.sort_by(|&a, &b| {
            let (ra, rb) = (items[a].box_rect.min, items[b].box_rect.min);
            compare_coord(ra.y, rb.y).then_with(|| compare_coord(ra.x, rb.x))
        });
    }
    clusters
}

fn compare_coord(a: f64, b: f64) -> Ordering {
    if (a - b).abs() <= EPSILON_GENERAL {
        Ordering::Equal
    } else {
        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    }
}

/// Outer sides of box `idx`: sides no other box of the pattern touches flush.
pub fn find_outer_box_sides(items: &[PatternItem], idx: usize) -> [bool; 4] {
    let mut outer = [true; 4];
    let Some(item) = items.get(idx).filter(|item| item.is_placeable()) else {
        return outer;
    };

    for other in items
        .iter()
        .filter(|other| other.id != item.id && other.is_placeable())
    {
        for (side, is_outer) in outer.iter_mut().enumerate() {
            if *is_outer && touches_on_side(&item.box_rect, &other.box_rect, side, EPSILON_CONTACT)
            {
                *is_outer = false;
            }
        }
    }
    outer
}

/// Label matches of one candidate rotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LabelScore {
    /// Labeled sides landing on an outer side.
    pub total: u32,
    /// Of those, long sides; only breaks ties.
    pub long: u32,
}

impl LabelScore {
    pub fn add(&mut self, other: LabelScore) {
        self.total += other.total;
        self.long += other.long;
    }
}

/// Counts the labeled box sides that end up on an outer pattern side when
/// the box is placed with `rotation` quarter turns.
pub fn label_matches(box_spec: &BoxSpec, rotation: u8, outer: &[bool; 4]) -> LabelScore {
    let mut score = LabelScore::default();
    for (box_side, _) in box_spec.labels.iter().enumerate().filter(|(_, l)| **l) {
        let pattern_side = (box_spec.lead.lsl_position(box_side) + rotation as usize) % 4;
        if outer[pattern_side] {
            score.total += 1;
            if box_spec.lead.is_long_side(box_side) {
                score.long += 1;
            }
        }
    }
    score
}

/// Picks the rotation with the better score; ties keep the default rotation.
pub fn best_rotation(orient: BoxOrient, mut score: impl FnMut(u8) -> LabelScore) -> u8 {
    let [default, alternate] = orient.label_rotations();
    if score(alternate) > score(default) {
        alternate
    } else {
        default
    }
}

/// Sets the label orientation of every box that maximizes visible labels.
pub fn calc_default_label_orient(layer: &mut Layer, box_spec: &BoxSpec) {
    let orients: Vec<Option<u8>> = (0..layer.items.len())
        .map(|idx| {
            let item = &layer.items[idx];
            if !item.is_placeable() {
                return None;
            }
            let outer = find_outer_box_sides(&layer.items, idx);
            Some(best_rotation(item.orient, |rotation| {
                label_matches(box_spec, rotation, &outer)
            }))
        })
        .collect();

    for (item, orient) in layer.items.iter_mut().zip(orients) {
        item.label_orient = orient;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ItemIssue;
    use crate::model::{LeadType, PatternRef};
    use crate::types::Vec2;

    fn box_spec() -> BoxSpec {
        BoxSpec::new(400.0, 300.0, 200.0, 5.0).unwrap()
    }

    fn built(formulas: &[&str], spec: &BoxSpec) -> Layer {
        let mut layer = Layer::from_formulas(PatternRef::Odd, formulas, spec);
        calc_pattern(&mut layer, spec);
        layer
    }

    #[test]
    fn single_box_geometry() {
        let layer = built(&["H;0;0;"], &box_spec());
        let item = &layer.items[0];
        assert_eq!(item.box_rect.min, Vec2::new(0.0, 0.0));
        assert_eq!(item.box_rect.max, Vec2::new(400.0, 300.0));
        assert_eq!(item.unit_rect, item.box_rect);
        assert_eq!(layer.size.size_x, 400.0);
        assert_eq!(layer.size.size_y, 300.0);
    }

    #[test]
    fn vertical_boxes_swap_extent() {
        let layer = built(&["H;0;0;", "V;l;0;"], &box_spec());
        assert_eq!(layer.items[1].box_rect.min, Vec2::new(400.0, 0.0));
        assert_eq!(layer.items[1].box_rect.max, Vec2::new(700.0, 400.0));
        assert_eq!(layer.size.size_x, 700.0);
        assert_eq!(layer.size.size_y, 400.0);
    }

    #[test]
    fn formula_errors_are_recorded_and_skipped() {
        let layer = built(&["H;0;0;", "H;2*l;0;", "H;l;0;"], &box_spec());
        assert_eq!(layer.failures.len(), 1);
        assert_eq!(layer.failures[0].id, 1);
        assert!(matches!(layer.failures[0].issue, ItemIssue::Formula(_)));
        assert!(!layer.items[1].is_placeable());
        assert_eq!(layer.size.size_x, 800.0);
    }

    #[test]
    fn recompute_does_not_leak_previous_state() {
        let spec = box_spec();
        let mut layer = built(&["H;0;0;", "H;0;w;"], &spec);
        layer.items[1].parent = Some(0);
        layer.items[1].used = false;
        layer.items[0].unit_rect.max.y = 600.0;

        calc_pattern(&mut layer, &spec);
        assert_eq!(layer.items[1].parent, None);
        assert!(layer.items[1].used);
        assert_eq!(layer.items[0].unit_rect.max.y, 300.0);
        assert!(layer.failures.is_empty());
    }

    #[test]
    fn unit_ends_cover_the_whole_chain() {
        let spec = box_spec();
        let mut layer = built(&["H;0;0;", "H;0;w;", "H;0;2w;"], &spec);
        layer.items[1].parent = Some(0);
        layer.items[2].parent = Some(1);
        expand_unit_ends(&mut layer).unwrap();
        assert_eq!(layer.items[0].unit_rect.max.y, 900.0);
        assert_eq!(layer.items[1].unit_rect.max.y, 900.0);
        assert_eq!(layer.items[2].unit_rect.max.y, 900.0);
    }

    #[test]
    fn unit_expansion_rejects_dangling_parent() {
        let spec = box_spec();
        let mut layer = built(&["H;0;0;"], &spec);
        layer.items[0].parent = Some(7);
        assert!(matches!(
            expand_unit_ends(&mut layer),
            Err(LayoutError::UnresolvableLink { id: 0, .. })
        ));
    }

    #[test]
    fn large_clusters_are_sorted_small_keep_insertion_order() {
        let spec = box_spec();
        let layer = built(
            &["H;0;2w;a", "H;0;0;a", "H;0;w;a", "H;l;w;b", "H;l;0;b"],
            &spec,
        );
        assert_eq!(layer.clusters.len(), 2);
        assert_eq!(layer.clusters[0].name, "a");
        assert_eq!(layer.clusters[0].members, vec![1, 2, 0]);
        assert_eq!(layer.clusters[1].members, vec![3, 4]);
    }

    #[test]
    fn outer_sides_exclude_flush_neighbours() {
        let spec = box_spec();
        let layer = built(&["H;0;0;", "H;0;w;", "H;l;0;"], &spec);
        assert_eq!(find_outer_box_sides(&layer.items, 0), [true, false, false, true]);
        assert_eq!(find_outer_box_sides(&layer.items, 1), [false, true, true, true]);
        assert_eq!(find_outer_box_sides(&layer.items, 2), [true, true, true, false]);
    }

    #[test]
    fn label_orientation_turns_labels_outwards() {
        // label on the front (side 0); box 0 has its +Y side covered by box 1
        let spec = box_spec().with_labels([true, false, false, false]);
        let mut layer = built(&["H;0;0;", "H;0;w;"], &spec);
        calc_default_label_orient(&mut layer, &spec);
        assert_eq!(layer.items[0].label_orient, Some(0));
        assert_eq!(layer.items[1].label_orient, Some(2));
    }

    #[test]
    fn label_orientation_ties_keep_default() {
        let spec = box_spec();
        let mut layer = built(&["H;0;0;", "V;l;0;"], &spec);
        calc_default_label_orient(&mut layer, &spec);
        assert_eq!(layer.items[0].label_orient, Some(0));
        assert_eq!(layer.items[1].label_orient, Some(1));
    }

    #[test]
    fn long_side_matches_break_ties() {
        // SSL box: sides 1 and 3 are long. Labels on a short side (0) and a long side (1).
        let spec = box_spec()
            .with_lead(LeadType::Ssl)
            .with_labels([true, true, false, false]);
        let both_outer = [true, true, true, true];
        let only_low_y = [true, false, false, false];
        let only_high_y = [false, false, true, false];

        // rotation 0: side 0 -> pattern 1, side 1 -> pattern 2
        assert_eq!(
            label_matches(&spec, 0, &both_outer),
            LabelScore { total: 2, long: 1 }
        );
        assert_eq!(
            label_matches(&spec, 2, &only_low_y),
            LabelScore { total: 1, long: 1 }
        );
        assert_eq!(
            label_matches(&spec, 0, &only_high_y),
            LabelScore { total: 1, long: 1 }
        );
        let rotation = best_rotation(BoxOrient::H, |r| {
            label_matches(&spec, r, &[false, true, false, true])
        });
        // rotation 0 shows the short side on +X, rotation 2 shows it on -X: tie on both counts
        assert_eq!(rotation, 0);
    }
}
