//! Common types and traits for 2D pattern geometry.
//!
//! A pallet layer is a flat arrangement, so everything the layout engine
//! reasons about lives in the XY plane: points, extents and axis-aligned
//! rectangles.

use std::ops::{Add, Mul, Sub};

/// Global numerical tolerance for floating-point comparisons.
///
/// Used for coefficient and coordinate comparisons.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Tolerance for deciding whether two box edges touch.
///
/// Slightly larger than [`EPSILON_GENERAL`] because coordinates are the
/// result of evaluating formulas with fractional coefficients.
pub const EPSILON_CONTACT: f64 = 1e-3;

/// Represents a 2D vector or point in the pattern plane.
///
/// # Examples
/// ```
/// use pallet_pattern::types::Vec2;
///
/// let origin = Vec2::new(0.0, 0.0);
/// let extent = Vec2::new(400.0, 300.0);
/// let center = origin + extent * 0.5;
/// assert_eq!(center, Vec2::new(200.0, 150.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    /// Creates a new 2D vector.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Creates a zero vector (origin).
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Converts to tuple format for API compatibility.
    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Calculates the Euclidean distance to another point.
    #[inline]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Returns the component-wise maximum.
    #[inline]
    pub fn max(&self, other: &Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }
}

impl Add for Vec2 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

/// Axis of the pattern plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Returns the other axis.
    pub fn other(self) -> Self {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }

    /// Picks the component of `v` along this axis.
    #[inline]
    pub fn of(self, v: Vec2) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
        }
    }
}

/// Represents an axis-aligned rectangle in the pattern plane.
///
/// Used for box extents, multi-box unit extents and gripper contact windows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    /// Minimum corner (start)
    pub min: Vec2,
    /// Maximum corner (end)
    pub max: Vec2,
}

impl Rect {
    /// Creates a new rectangle.
    #[inline]
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Creates a degenerate rectangle at the origin.
    #[inline]
    pub const fn zero() -> Self {
        Self::new(Vec2::zero(), Vec2::zero())
    }

    /// Creates a rectangle from an origin and an extent.
    #[inline]
    pub fn from_origin_and_extent(origin: Vec2, extent: Vec2) -> Self {
        Self {
            min: origin,
            max: origin + extent,
        }
    }

    /// Checks if two rectangles overlap by more than `tolerance` on both axes.
    ///
    /// Rectangles that merely share an edge do not intersect.
    #[inline]
    pub fn intersects(&self, other: &Self, tolerance: f64) -> bool {
        self.overlap_along(other, Axis::X) > tolerance
            && self.overlap_along(other, Axis::Y) > tolerance
    }

    /// Calculates the overlap length of the projections onto one axis.
    #[inline]
    pub fn overlap_along(&self, other: &Self, axis: Axis) -> f64 {
        overlap_1d(
            axis.of(self.min),
            axis.of(self.max),
            axis.of(other.min),
            axis.of(other.max),
        )
    }

    /// Grows this rectangle so its end corner covers the end corner of `other`.
    #[inline]
    pub fn extend_end(&mut self, other: &Self) {
        self.max = self.max.max(&other.max);
    }

    /// Returns the center point.
    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }
}

/// Calculates the overlap of two intervals in one dimension.
///
/// # Returns
/// Length of the overlap, at least 0.0
#[inline]
pub fn overlap_1d(a1: f64, a2: f64, b1: f64, b2: f64) -> f64 {
    (a2.min(b2) - a1.max(b1)).max(0.0)
}

/// Trait for pattern elements occupying a rectangle on the layer.
pub trait Footprint {
    /// Returns the occupied rectangle.
    fn footprint(&self) -> Rect;

    /// Returns the center of the occupied rectangle.
    fn center(&self) -> Vec2 {
        self.footprint().center()
    }
}

/// Validation functions shared by the data model.
pub mod validation {

    /// Validates a single dimension.
    ///
    /// # Parameters
    /// * `value` - The value to validate
    /// * `name` - Name of the dimension for error messages
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_dimension(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates a weight.
    pub fn validate_weight(value: f64) -> Result<(), String> {
        if value.is_nan() {
            return Err("Weight must not be NaN".to_string());
        }
        if value.is_infinite() {
            return Err("Weight must not be infinite".to_string());
        }
        if value <= 0.0 {
            return Err(format!("Weight must be positive, got: {}", value));
        }
        Ok(())
    }

    /// Validates a per-cycle pick count.
    pub fn validate_pick_count(value: u32, name: &str) -> Result<(), String> {
        if value == 0 {
            return Err(format!("{} must be at least 1", name));
        }
        Ok(())
    }
}
