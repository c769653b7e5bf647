//! Data models for palletizing pattern computation.
//!
//! This module defines the plain records the layout engine consumes and emits:
//! - `BoxSpec`, `PalletSpec`, `GripperConfig`: validated inputs
//! - `PatternItem`: the per-box placement record
//! - `Layer`: all items of one pattern reference plus the pattern size
//! - `StackConfig`, `PatternLibrary`: selection of which formulas feed a layer

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::error::{ItemIssue, LayoutError, ValidationError};
use crate::formula::Formula;
use crate::pattern_size::PatternSize;
use crate::types::{Axis, Footprint, Rect, Vec2, validation};

fn dimension(value: f64, name: &str) -> Result<(), ValidationError> {
    validation::validate_dimension(value, name).map_err(ValidationError::InvalidDimension)
}

/// Orientation of a box in the pattern.
///
/// `H` lays the box length along X, `V` along Y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum BoxOrient {
    H,
    V,
}

impl BoxOrient {
    /// Extent of a box with this orientation.
    pub fn extent(self, length: f64, width: f64) -> Vec2 {
        match self {
            BoxOrient::H => Vec2::new(length, width),
            BoxOrient::V => Vec2::new(width, length),
        }
    }

    /// The two label rotations (quarter turns) this orientation allows.
    ///
    /// The first entry is the default when label matching ties.
    pub fn label_rotations(self) -> [u8; 2] {
        match self {
            BoxOrient::H => [0, 2],
            BoxOrient::V => [1, 3],
        }
    }
}

/// Infeed orientation of the boxes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LeadType {
    /// Long side leads; box sides 0 and 2 are long.
    #[default]
    Lsl,
    /// Short side leads; box sides 1 and 3 are long.
    Ssl,
}

impl LeadType {
    /// Maps a box side (label index) to its position in the long-side-lead frame.
    pub fn lsl_position(self, box_side: usize) -> usize {
        match self {
            LeadType::Lsl => box_side % 4,
            LeadType::Ssl => (box_side + 1) % 4,
        }
    }

    /// Whether a box side is one of the long sides.
    pub fn is_long_side(self, box_side: usize) -> bool {
        self.lsl_position(box_side) % 2 == 0
    }
}

/// Corner of the pattern where placement starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StartCorner {
    /// Corner 1: minimum X, minimum Y.
    Origin = 1,
    /// Corner 2: maximum X, minimum Y.
    PlusX = 2,
    /// Corner 3: maximum X, maximum Y.
    PlusXY = 3,
    /// Corner 4: minimum X, maximum Y.
    PlusY = 4,
}

impl StartCorner {
    pub const ALL: [StartCorner; 4] = [
        StartCorner::Origin,
        StartCorner::PlusX,
        StartCorner::PlusXY,
        StartCorner::PlusY,
    ];

    /// Parses the 1-based corner code used by the controller.
    pub fn from_code(code: u8) -> Result<Self, LayoutError> {
        match code {
            1 => Ok(StartCorner::Origin),
            2 => Ok(StartCorner::PlusX),
            3 => Ok(StartCorner::PlusXY),
            4 => Ok(StartCorner::PlusY),
            other => Err(LayoutError::InvalidStartCorner(other)),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the corner sits at the low end of `axis`.
    pub fn is_low(self, axis: Axis) -> bool {
        match axis {
            Axis::X => matches!(self, StartCorner::Origin | StartCorner::PlusY),
            Axis::Y => matches!(self, StartCorner::Origin | StartCorner::PlusX),
        }
    }

    /// The two pattern sides facing this corner.
    pub fn facing_sides(self) -> [usize; 2] {
        match self {
            StartCorner::Origin => [0, 3],
            StartCorner::PlusX => [0, 1],
            StartCorner::PlusXY => [1, 2],
            StartCorner::PlusY => [2, 3],
        }
    }
}

/// Layer role a pattern applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PatternRef {
    Odd = 0,
    Even = 1,
    Top = 2,
    Temp = 3,
}

impl PatternRef {
    pub const ALL: [PatternRef; 4] = [
        PatternRef::Odd,
        PatternRef::Even,
        PatternRef::Top,
        PatternRef::Temp,
    ];

    pub fn from_index(index: usize) -> Result<Self, LayoutError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(LayoutError::UnknownPatternRef(index))
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Box properties of the current recipe.
///
/// # Fields
/// * `length`, `width`, `height` - Dimensions in mm, `length >= width`
/// * `weight` - Weight in kg
/// * `pick_lsl` / `pick_ssl` - Boxes picked per cycle for long/short side lead
/// * `labels` - Label presence per box side (front, left, back, right)
/// * `lead` - Infeed orientation
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "length": 400.0, "width": 300.0, "height": 220.0, "weight": 8.5,
    "pick_lsl": 2, "pick_ssl": 1, "labels": [true, false, false, false], "lead": "lsl"
}))]
pub struct BoxSpec {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    #[serde(default = "default_pick")]
    pub pick_lsl: u32,
    #[serde(default = "default_pick")]
    pub pick_ssl: u32,
    #[serde(default)]
    pub labels: [bool; 4],
    #[serde(default)]
    pub lead: LeadType,
}

fn default_pick() -> u32 {
    1
}

impl BoxSpec {
    /// Creates a single-pick, unlabeled, long-side-lead box with validation.
    ///
    /// # Examples
    /// ```
    /// use pallet_pattern::model::BoxSpec;
    ///
    /// assert!(BoxSpec::new(400.0, 300.0, 200.0, 5.0).is_ok());
    /// assert!(BoxSpec::new(-400.0, 300.0, 200.0, 5.0).is_err());
    /// ```
    pub fn new(length: f64, width: f64, height: f64, weight: f64) -> Result<Self, ValidationError> {
        let spec = Self {
            length,
            width,
            height,
            weight,
            pick_lsl: 1,
            pick_ssl: 1,
            labels: [false; 4],
            lead: LeadType::Lsl,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Sets the per-cycle pick counts.
    pub fn with_picks(mut self, pick_lsl: u32, pick_ssl: u32) -> Self {
        self.pick_lsl = pick_lsl;
        self.pick_ssl = pick_ssl;
        self
    }

    /// Sets the label presence per box side.
    pub fn with_labels(mut self, labels: [bool; 4]) -> Self {
        self.labels = labels;
        self
    }

    /// Sets the infeed orientation.
    pub fn with_lead(mut self, lead: LeadType) -> Self {
        self.lead = lead;
        self
    }

    /// Checks dimensions, weight and pick counts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        dimension(self.length, "Box length")?;
        dimension(self.width, "Box width")?;
        dimension(self.height, "Box height")?;
        validation::validate_weight(self.weight).map_err(ValidationError::InvalidWeight)?;
        validation::validate_pick_count(self.pick_lsl, "pick_lsl")
            .map_err(ValidationError::InvalidConfiguration)?;
        validation::validate_pick_count(self.pick_ssl, "pick_ssl")
            .map_err(ValidationError::InvalidConfiguration)?;
        if self.width > self.length {
            return Err(ValidationError::InvalidDimension(format!(
                "Box width ({}) must not exceed box length ({})",
                self.width, self.length
            )));
        }
        Ok(())
    }

    /// Pick count of the active infeed orientation.
    pub fn pick_count(&self) -> u32 {
        match self.lead {
            LeadType::Lsl => self.pick_lsl,
            LeadType::Ssl => self.pick_ssl,
        }
    }

    /// Link type every item gets at construction.
    pub fn link_type(&self) -> LinkType {
        match self.lead {
            LeadType::Lsl if self.pick_lsl > 1 => LinkType::LongSide,
            LeadType::Ssl if self.pick_ssl > 1 => LinkType::ShortSide,
            _ => LinkType::None,
        }
    }
}

/// Pallet dimensions.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PalletSpec {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    /// Height including all layers; filled in from the stack configuration.
    #[serde(default)]
    pub full_height: f64,
}

impl PalletSpec {
    pub fn new(length: f64, width: f64, height: f64) -> Result<Self, ValidationError> {
        let pallet = Self {
            length,
            width,
            height,
            full_height: height,
        };
        pallet.validate()?;
        Ok(pallet)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        dimension(self.length, "Pallet length")?;
        dimension(self.width, "Pallet width")?;
        dimension(self.height, "Pallet height")?;
        Ok(())
    }
}

/// Gripper family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GripperKind {
    Vacuum,
    Mechanical,
}

/// Where the tool center point sits on the gripper.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TcpMount {
    #[default]
    Center,
    Corner,
}

/// Gripper configuration as read from the controller.
///
/// `avail_pick[q]` enables pick position `q = 2 * side + end` in the box frame.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct GripperConfig {
    pub kind: GripperKind,
    #[serde(default)]
    pub tcp: TcpMount,
    pub width: f64,
    #[serde(default = "default_finger_depth")]
    pub finger_depth: f64,
    #[serde(default = "all_positions")]
    pub avail_pick: [bool; 8],
}

fn default_finger_depth() -> f64 {
    GripperConfig::DEFAULT_FINGER_DEPTH
}

fn all_positions() -> [bool; 8] {
    [true; 8]
}

impl GripperConfig {
    pub const DEFAULT_FINGER_DEPTH: f64 = 20.0;

    pub fn new(kind: GripperKind, width: f64) -> Result<Self, ValidationError> {
        let gripper = Self {
            kind,
            tcp: TcpMount::Center,
            width,
            finger_depth: Self::DEFAULT_FINGER_DEPTH,
            avail_pick: all_positions(),
        };
        gripper.validate()?;
        Ok(gripper)
    }

    pub fn with_tcp(mut self, tcp: TcpMount) -> Self {
        self.tcp = tcp;
        self
    }

    pub fn with_avail_pick(mut self, avail_pick: [bool; 8]) -> Self {
        self.avail_pick = avail_pick;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        dimension(self.width, "Gripper width")?;
        dimension(self.finger_depth, "Gripper finger depth")?;
        Ok(())
    }
}

/// How a box is linked into a multi-box pick unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkType {
    /// Cleared by the mechanical solver on absorbed boxes.
    Unset,
    None,
    LongSide,
    ShortSide,
}

impl LinkType {
    /// Integer code of the project file format.
    pub fn code(self) -> i8 {
        match self {
            LinkType::Unset => -1,
            LinkType::None => 0,
            LinkType::LongSide => 1,
            LinkType::ShortSide => 2,
        }
    }
}

/// Pick and place orientation of the gripper for one unit.
///
/// Pick and place are always set together, so a half-valid pair cannot exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GripperPose {
    #[default]
    Unset,
    /// The solver found no reachable free place position.
    NoSolution,
    Pose { pick: u8, place: u8 },
}

impl GripperPose {
    /// Raw pick value, sentinels included.
    pub fn pick_code(self) -> i8 {
        match self {
            GripperPose::Unset => -1,
            GripperPose::NoSolution => -2,
            GripperPose::Pose { pick, .. } => pick as i8,
        }
    }

    /// Raw place value, sentinels included.
    pub fn place_code(self) -> i8 {
        match self {
            GripperPose::Unset => -1,
            GripperPose::NoSolution => -2,
            GripperPose::Pose { place, .. } => place as i8,
        }
    }
}

/// Placement record of one box in a layer pattern.
#[derive(Clone, Debug)]
pub struct PatternItem {
    pub id: usize,
    pub formula: String,
    /// `None` when the formula failed to parse.
    pub parsed: Option<Formula>,
    pub orient: BoxOrient,
    pub parent: Option<usize>,
    pub last_link: Option<usize>,
    pub link_type: LinkType,
    pub used: bool,
    pub box_rect: Rect,
    pub unit_rect: Rect,
    pub label_orient: Option<u8>,
    pub gripper: GripperPose,
    pub approach_dir: Option<u8>,
    pub free_sides: [bool; 8],
    pub center_dist: f64,
}

impl PatternItem {
    pub fn new(id: usize, formula: impl Into<String>, link_type: LinkType) -> Self {
        Self {
            id,
            formula: formula.into(),
            parsed: None,
            orient: BoxOrient::H,
            parent: None,
            last_link: None,
            link_type,
            used: true,
            box_rect: Rect::zero(),
            unit_rect: Rect::zero(),
            label_orient: None,
            gripper: GripperPose::Unset,
            approach_dir: None,
            free_sides: [false; 8],
            center_dist: 0.0,
        }
    }

    /// Clears everything a recompute derives, keeping id and formula.
    pub fn reset_derived(&mut self, link_type: LinkType) {
        let id = self.id;
        let formula = std::mem::take(&mut self.formula);
        *self = Self::new(id, formula, link_type);
    }

    /// Whether the item has geometry and takes part in linking and ordering.
    pub fn is_placeable(&self) -> bool {
        self.parsed.is_some()
    }

    /// Whether the item is placed as an independent unit.
    pub fn is_unit_lead(&self) -> bool {
        self.used && self.is_placeable()
    }

    /// Cluster tag from the formula, if any.
    pub fn cluster(&self) -> Option<&str> {
        self.parsed.as_ref().and_then(|f| f.cluster.as_deref())
    }
}

impl Footprint for PatternItem {
    fn footprint(&self) -> Rect {
        self.unit_rect
    }
}

/// A recorded per-item problem.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemFailure {
    pub id: usize,
    pub issue: ItemIssue,
}

/// Boxes sharing a cluster tag, in their stable intra-cluster order.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub members: Vec<usize>,
}

/// Computation state of one pattern reference.
#[derive(Clone, Debug)]
pub struct Layer {
    pub pattern_ref: PatternRef,
    pub items: Vec<PatternItem>,
    pub size: PatternSize,
    /// Ids of unit leads in placement order.
    pub order: Vec<usize>,
    pub clusters: Vec<Cluster>,
    pub failures: Vec<ItemFailure>,
}

impl Layer {
    /// Creates a layer with one item per formula; ids follow the formula order.
    pub fn from_formulas<S: AsRef<str>>(
        pattern_ref: PatternRef,
        formulas: &[S],
        box_spec: &BoxSpec,
    ) -> Self {
        let link_type = box_spec.link_type();
        let items = formulas
            .iter()
            .enumerate()
            .map(|(id, formula)| PatternItem::new(id, formula.as_ref(), link_type))
            .collect();
        Self {
            pattern_ref,
            items,
            size: PatternSize::default(),
            order: Vec::new(),
            clusters: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn item(&self, id: usize) -> Option<&PatternItem> {
        self.items.get(id)
    }

    pub fn record_failure(&mut self, id: usize, issue: impl Into<ItemIssue>) {
        let issue = issue.into();
        log::warn!("⚠️ {:?} item {}: {}", self.pattern_ref, id, issue);
        self.failures.push(ItemFailure { id, issue });
    }

    /// Ids of unit leads that can be placed, in id order.
    pub fn unit_leads(&self) -> impl Iterator<Item = usize> + '_ {
        self.items
            .iter()
            .filter(|item| item.is_unit_lead())
            .map(|item| item.id)
    }
}

/// Ordered layer-to-pattern assignment of a stack.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct StackConfig {
    /// Pattern reference per layer, bottom layer first.
    pub layers: Vec<PatternRef>,
    /// Layer indices that have a slip sheet below them.
    #[serde(default)]
    pub slip_sheets: Vec<usize>,
    #[serde(default)]
    pub slip_sheet_thickness: f64,
}

impl StackConfig {
    /// Distinct pattern references in use, in index order.
    pub fn selected_refs(&self) -> Vec<PatternRef> {
        let mut refs = self.layers.clone();
        refs.sort();
        refs.dedup();
        refs
    }

    /// Pattern reference of a 0-based layer index.
    pub fn pattern_ref_for_layer(&self, layer: usize) -> Option<PatternRef> {
        self.layers.get(layer).copied()
    }

    /// Pallet height plus all layers and slip sheets.
    pub fn full_height(&self, pallet: &PalletSpec, box_spec: &BoxSpec) -> f64 {
        let sheets = self
            .slip_sheets
            .iter()
            .filter(|&&idx| idx <= self.layers.len())
            .count();
        pallet.height
            + self.layers.len() as f64 * box_spec.height
            + sheets as f64 * self.slip_sheet_thickness
    }
}

/// Named pattern: one formula per box.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PatternDef {
    pub name: String,
    pub formulas: Vec<String>,
}

/// Pattern library lookup.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct PatternLibrary {
    pub patterns: Vec<PatternDef>,
}

impl PatternLibrary {
    pub fn by_index(&self, index: usize) -> Result<&PatternDef, LayoutError> {
        self.patterns
            .get(index)
            .ok_or_else(|| LayoutError::UnknownPattern(format!("#{}", index)))
    }

    pub fn by_name(&self, name: &str) -> Result<&PatternDef, LayoutError> {
        self.patterns
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| LayoutError::UnknownPattern(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_spec() -> BoxSpec {
        BoxSpec::new(400.0, 300.0, 200.0, 5.0).unwrap()
    }

    #[test]
    fn box_spec_rejects_invalid_values() {
        assert!(BoxSpec::new(0.0, 300.0, 200.0, 5.0).is_err());
        assert!(BoxSpec::new(400.0, 300.0, 200.0, -1.0).is_err());
        assert!(BoxSpec::new(300.0, 400.0, 200.0, 5.0).is_err());
        assert!(box_spec().with_picks(0, 1).validate().is_err());
    }

    #[test]
    fn link_type_follows_lead_and_pick_count() {
        assert_eq!(box_spec().link_type(), LinkType::None);
        assert_eq!(box_spec().with_picks(2, 1).link_type(), LinkType::LongSide);
        assert_eq!(
            box_spec().with_picks(2, 3).with_lead(LeadType::Ssl).link_type(),
            LinkType::ShortSide
        );
        assert_eq!(
            box_spec().with_picks(2, 1).with_lead(LeadType::Ssl).link_type(),
            LinkType::None
        );
    }

    #[test]
    fn ssl_mirrors_long_sides() {
        assert!(LeadType::Lsl.is_long_side(0));
        assert!(!LeadType::Lsl.is_long_side(1));
        assert!(LeadType::Ssl.is_long_side(1));
        assert!(!LeadType::Ssl.is_long_side(2));
    }

    #[test]
    fn start_corner_codes_round_trip() {
        for corner in StartCorner::ALL {
            assert_eq!(StartCorner::from_code(corner.code()).unwrap(), corner);
        }
        assert!(matches!(
            StartCorner::from_code(5),
            Err(LayoutError::InvalidStartCorner(5))
        ));
    }

    #[test]
    fn pattern_ref_index_out_of_range_is_fatal() {
        assert_eq!(PatternRef::from_index(2).unwrap(), PatternRef::Top);
        assert!(matches!(
            PatternRef::from_index(4),
            Err(LayoutError::UnknownPatternRef(4))
        ));
    }

    #[test]
    fn reset_derived_keeps_identity() {
        let mut item = PatternItem::new(3, "H;0;0;", LinkType::LongSide);
        item.parent = Some(1);
        item.used = false;
        item.gripper = GripperPose::Pose { pick: 1, place: 3 };
        item.reset_derived(LinkType::None);

        assert_eq!(item.id, 3);
        assert_eq!(item.formula, "H;0;0;");
        assert_eq!(item.parent, None);
        assert!(item.used);
        assert_eq!(item.gripper, GripperPose::Unset);
        assert_eq!(item.link_type, LinkType::None);
    }

    #[test]
    fn gripper_pose_codes() {
        assert_eq!(GripperPose::Unset.pick_code(), -1);
        assert_eq!(GripperPose::NoSolution.place_code(), -2);
        let pose = GripperPose::Pose { pick: 2, place: 6 };
        assert_eq!((pose.pick_code(), pose.place_code()), (2, 6));
    }

    #[test]
    fn stack_config_selects_refs_and_height() {
        let stack = StackConfig {
            layers: vec![PatternRef::Odd, PatternRef::Even, PatternRef::Odd, PatternRef::Top],
            slip_sheets: vec![0, 2],
            slip_sheet_thickness: 2.0,
        };
        assert_eq!(
            stack.selected_refs(),
            vec![PatternRef::Odd, PatternRef::Even, PatternRef::Top]
        );
        assert_eq!(stack.pattern_ref_for_layer(3), Some(PatternRef::Top));
        let pallet = PalletSpec::new(1200.0, 800.0, 144.0).unwrap();
        let height = stack.full_height(&pallet, &box_spec());
        assert!((height - (144.0 + 4.0 * 200.0 + 4.0)).abs() < 1e-9);
    }

    #[test]
    fn library_lookup() {
        let library = PatternLibrary {
            patterns: vec![PatternDef {
                name: "column".to_string(),
                formulas: vec!["H;0;0;".to_string()],
            }],
        };
        assert_eq!(library.by_index(0).unwrap().name, "column");
        assert!(library.by_name("column").is_ok());
        assert!(matches!(
            library.by_name("missing"),
            Err(LayoutError::UnknownPattern(_))
        ));
    }
}
