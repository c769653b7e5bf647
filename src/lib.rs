//! Palletizing pattern engine.
//!
//! Turns per-box coordinate formulas into pallet layer layouts: box geometry,
//! multi-box pick units, placement order, approach directions and gripper
//! orientations, and writes them as robot project lines.

pub mod api;
pub mod config;
pub mod error;
pub mod formula;
pub mod geometry;
pub mod gripper;
pub mod linking;
pub mod model;
pub mod ordering;
pub mod pattern;
pub mod pattern_size;
pub mod project;
pub mod types;

pub use error::{FormulaError, ItemIssue, LayoutError, ValidationError};
pub use project::{LayoutConfig, LayoutContext, Project, ProjectBuilder, compute_layer};
