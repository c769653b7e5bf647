//! Layer pipeline and project file assembly.
//!
//! [`compute_layer`] runs every stage for one pattern reference and start
//! corner. [`ProjectBuilder`] repeats that for all four corners of every
//! selected pattern reference and [`Project::to_lines`] writes the result in
//! the line format the robot controller reads.

use log::{debug, info};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::LayoutError;
use crate::gripper::calc_gripper_orient;
use crate::linking::link_units;
use crate::model::{BoxSpec, GripperConfig, Layer, PalletSpec, PatternLibrary, PatternRef, StackConfig, StartCorner};
use crate::ordering::{calc_approach_angle, calc_item_order};
use crate::pattern::{calc_default_label_orient, calc_pattern, expand_unit_ends};
use crate::types::EPSILON_CONTACT;

/// Tunables of the layout pipeline.
#[derive(Clone, Debug)]
pub struct LayoutConfig {
    /// Overlap a gripper contact window may have with a placed unit and still count as free.
    pub contact_gap: f64,
    /// Lets vertical chains started from corner 1 or 4 trade the formulas of their ends.
    pub swap_chain_ends: bool,
}

impl LayoutConfig {
    pub const DEFAULT_CONTACT_GAP: f64 = EPSILON_CONTACT;
    pub const DEFAULT_SWAP_CHAIN_ENDS: bool = false;

    pub fn builder() -> LayoutConfigBuilder {
        LayoutConfigBuilder::default()
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            contact_gap: Self::DEFAULT_CONTACT_GAP,
            swap_chain_ends: Self::DEFAULT_SWAP_CHAIN_ENDS,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LayoutConfigBuilder {
    config: LayoutConfig,
}

impl LayoutConfigBuilder {
    pub fn contact_gap(mut self, gap: f64) -> Self {
        self.config.contact_gap = gap;
        self
    }

    pub fn swap_chain_ends(mut self, enabled: bool) -> Self {
        self.config.swap_chain_ends = enabled;
        self
    }

    pub fn build(self) -> LayoutConfig {
        self.config
    }
}

/// Everything a layer computation reads besides the formulas.
#[derive(Clone, Debug)]
pub struct LayoutContext {
    pub box_spec: BoxSpec,
    pub pallet: PalletSpec,
    pub gripper: GripperConfig,
    pub config: LayoutConfig,
}

impl LayoutContext {
    pub fn new(box_spec: BoxSpec, pallet: PalletSpec, gripper: GripperConfig) -> Self {
        Self {
            box_spec,
            pallet,
            gripper,
            config: LayoutConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LayoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        self.box_spec.validate()?;
        self.pallet.validate()?;
        self.gripper.validate()?;
        Ok(())
    }
}

/// Progress of a layer computation, suitable for streaming.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum LayoutEvent {
    /// Box geometry is known.
    PatternBuilt {
        pattern_ref: PatternRef,
        items: usize,
        size_x: f64,
        size_y: f64,
    },
    /// Boxes are grouped into pick units.
    UnitsLinked { units: usize },
    /// Placement order of the unit leads.
    OrderComputed { order: Vec<usize> },
    /// An item could not be fully processed.
    ItemFailed {
        id: usize,
        reason_code: String,
        reason_text: String,
    },
    Finished { units: usize, failures: usize },
    /// The layer could not be computed; no further events follow.
    Aborted { message: String },
}

/// Runs the full pipeline for one pattern reference and start corner.
pub fn compute_layer<S: AsRef<str>>(
    ctx: &LayoutContext,
    pattern_ref: PatternRef,
    formulas: &[S],
    corner: StartCorner,
) -> Result<Layer, LayoutError> {
    compute_layer_with_progress(ctx, pattern_ref, formulas, corner, |_| {})
}

/// Like [`compute_layer`], calling `on_event` after every stage.
///
/// A fatal error is reported as [`LayoutEvent::Aborted`] before it is returned.
pub fn compute_layer_with_progress<S: AsRef<str>>(
    ctx: &LayoutContext,
    pattern_ref: PatternRef,
    formulas: &[S],
    corner: StartCorner,
    mut on_event: impl FnMut(&LayoutEvent),
) -> Result<Layer, LayoutError> {
    run_stages(ctx, pattern_ref, formulas, corner, &mut on_event).inspect_err(|err| {
        on_event(&LayoutEvent::Aborted {
            message: err.to_string(),
        })
    })
}

fn run_stages<S: AsRef<str>>(
    ctx: &LayoutContext,
    pattern_ref: PatternRef,
    formulas: &[S],
    corner: StartCorner,
    on_event: &mut impl FnMut(&LayoutEvent),
) -> Result<Layer, LayoutError> {
    ctx.validate()?;
    let box_spec = &ctx.box_spec;

    let mut layer = Layer::from_formulas(pattern_ref, formulas, box_spec);
    calc_pattern(&mut layer, box_spec);
    calc_default_label_orient(&mut layer, box_spec);
    on_event(&LayoutEvent::PatternBuilt {
        pattern_ref,
        items: layer.items.len(),
        size_x: layer.size.size_x,
        size_y: layer.size.size_y,
    });

    link_units(&mut layer, box_spec, corner)?;
    expand_unit_ends(&mut layer)?;
    on_event(&LayoutEvent::UnitsLinked {
        units: layer.unit_leads().count(),
    });

    let order = calc_item_order(&mut layer, corner);
    calc_approach_angle(&mut layer);
    on_event(&LayoutEvent::OrderComputed { order });

    calc_gripper_orient(&mut layer, box_spec, &ctx.gripper, corner, &ctx.config);

    for failure in &layer.failures {
        on_event(&LayoutEvent::ItemFailed {
            id: failure.id,
            reason_code: failure.issue.code().to_string(),
            reason_text: failure.issue.to_string(),
        });
    }
    on_event(&LayoutEvent::Finished {
        units: layer.order.len(),
        failures: layer.failures.len(),
    });
    Ok(layer)
}

/// One computed layer of a project.
#[derive(Clone, Debug)]
pub struct ProjectEntry {
    pub pattern_ref: PatternRef,
    pub corner: StartCorner,
    pub layer: Layer,
}

/// All layers of a project: every selected pattern reference in all four corners.
#[derive(Clone, Debug, Default)]
pub struct Project {
    pub entries: Vec<ProjectEntry>,
}

impl Project {
    pub fn entry(&self, pattern_ref: PatternRef, corner: StartCorner) -> Option<&ProjectEntry> {
        self.entries
            .iter()
            .find(|e| e.pattern_ref == pattern_ref && e.corner == corner)
    }

    pub fn failure_count(&self) -> usize {
        self.entries.iter().map(|e| e.layer.failures.len()).sum()
    }

    /// One line per item per (pattern reference, corner), in item id order.
    ///
    /// Pick and place are written 1-based, so the unset and no-solution
    /// sentinels come out as 0 and -1.
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for entry in &self.entries {
            for item in &entry.layer.items {
                lines.push(format!(
                    "PRef:{} Cor:{} F:{} PiO:{} PlO:{} LblO:{} Appr:{} ID:{} Par:{} LT:{}",
                    entry.pattern_ref.index(),
                    entry.corner.code(),
                    item.formula,
                    i16::from(item.gripper.pick_code()) + 1,
                    i16::from(item.gripper.place_code()) + 1,
                    optional_code(item.label_orient),
                    optional_code(item.approach_dir),
                    item.id,
                    item.parent.map_or(-1, |p| p as i64),
                    item.link_type.code(),
                ));
            }
        }
        lines
    }
}

fn optional_code(value: Option<u8>) -> i16 {
    value.map_or(-1, i16::from)
}

/// Collects the patterns of a project and computes it.
#[derive(Clone, Debug)]
pub struct ProjectBuilder {
    ctx: LayoutContext,
    patterns: Vec<(PatternRef, Vec<String>)>,
    stack: Option<StackConfig>,
}

impl ProjectBuilder {
    pub fn new(ctx: LayoutContext) -> Self {
        Self {
            ctx,
            patterns: Vec::new(),
            stack: None,
        }
    }

    /// Assigns formulas to a pattern reference, replacing earlier ones.
    pub fn pattern<S: Into<String>>(mut self, pattern_ref: PatternRef, formulas: impl IntoIterator<Item = S>) -> Self {
        let formulas: Vec<String> = formulas.into_iter().map(Into::into).collect();
        self.patterns.retain(|(r, _)| *r != pattern_ref);
        self.patterns.push((pattern_ref, formulas));
        self
    }

    /// Assigns a named library pattern to a pattern reference.
    pub fn library_pattern(
        self,
        pattern_ref: PatternRef,
        library: &PatternLibrary,
        name: &str,
    ) -> Result<Self, LayoutError> {
        let def = library.by_name(name)?;
        Ok(self.pattern(pattern_ref, def.formulas.iter().cloned()))
    }

    /// Restricts the project to the pattern references the stack uses.
    pub fn stack(mut self, stack: StackConfig) -> Self {
        self.stack = Some(stack);
        self
    }

    fn selected_refs(&self) -> Vec<PatternRef> {
        match &self.stack {
            Some(stack) if !stack.layers.is_empty() => stack.selected_refs(),
            _ => {
                let mut refs: Vec<PatternRef> = self.patterns.iter().map(|(r, _)| *r).collect();
                refs.sort();
                refs
            }
        }
    }

    pub fn build(self) -> Result<Project, LayoutError> {
        self.ctx.validate()?;
        let mut project = Project::default();

        for pattern_ref in self.selected_refs() {
            let formulas = self
                .patterns
                .iter()
                .find(|(r, _)| *r == pattern_ref)
                .map(|(_, f)| f)
                .ok_or(LayoutError::UnknownPatternRef(pattern_ref.index()))?;

            for corner in StartCorner::ALL {
                let layer = compute_layer(&self.ctx, pattern_ref, formulas, corner)?;
                debug!(
                    "{:?} corner {}: {} units, {} failures",
                    pattern_ref,
                    corner.code(),
                    layer.order.len(),
                    layer.failures.len()
                );
                project.entries.push(ProjectEntry {
                    pattern_ref,
                    corner,
                    layer,
                });
            }
        }

        info!(
            "📦 Project computed: {} layers, {} item failures",
            project.entries.len(),
            project.failure_count()
        );
        Ok(project)
    }
}
