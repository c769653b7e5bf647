//! Error types for formula parsing and layout computation.

use thiserror::Error;

/// A malformed per-box coordinate formula.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("unsupported token '{token}' in expression '{expr}'")]
    UnsupportedToken { expr: String, token: String },
    #[error("malformed expression '{expr}': {reason}")]
    Malformed { expr: String, reason: &'static str },
    #[error("invalid box orientation '{0}', expected H or V")]
    InvalidOrient(String),
    #[error("formula '{formula}' is missing the {field} field")]
    MissingField {
        formula: String,
        field: &'static str,
    },
}

/// Invalid box, pallet or gripper data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Recoverable per-item problem; the rest of the layer is still computed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItemIssue {
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error("no free place position for the gripper")]
    NoFreePlacement,
}

impl ItemIssue {
    /// Stable machine readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            ItemIssue::Formula(_) => "formula_error",
            ItemIssue::NoFreePlacement => "no_free_placement",
        }
    }
}

/// Failure of a whole layout calculation call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("item {id} references missing or cyclic {field} {target}")]
    UnresolvableLink {
        id: usize,
        field: &'static str,
        target: usize,
    },
    #[error("pattern reference {0} is out of range (0..=3)")]
    UnknownPatternRef(usize),
    #[error("pattern '{0}' not found in library")]
    UnknownPattern(String),
    #[error("start corner {0} is out of range (1..=4)")]
    InvalidStartCorner(u8),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
