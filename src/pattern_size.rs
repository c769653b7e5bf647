//! Running bounding-box accumulator for a layer footprint.

use crate::model::StartCorner;
use crate::types::Vec2;

/// Footprint of one layer pattern.
///
/// `size_x`/`size_y` are always `max - min` of the bounds seen so far.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatternSize {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub size_x: f64,
    pub size_y: f64,
}

impl Default for PatternSize {
    fn default() -> Self {
        let mut size = Self {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 0.0,
            size_x: 0.0,
            size_y: 0.0,
        };
        size.reset_ranges();
        size
    }
}

impl PatternSize {
    /// Resets the bounds to the empty sentinels (min = +inf, max = -inf).
    pub fn reset_ranges(&mut self) {
        self.min_x = f64::INFINITY;
        self.min_y = f64::INFINITY;
        self.max_x = f64::NEG_INFINITY;
        self.max_y = f64::NEG_INFINITY;
        self.size_x = 0.0;
        self.size_y = 0.0;
    }

    /// Extends the X bounds with the interval `[x, x + extent]`.
    pub fn set_x(&mut self, x: f64, extent: f64) {
        self.max_x = self.max_x.max(x + extent);
        self.min_x = self.min_x.min(x);
        self.size_x = self.max_x - self.min_x;
    }

    /// Extends the Y bounds with the interval `[y, y + extent]`.
    pub fn set_y(&mut self, y: f64, extent: f64) {
        self.max_y = self.max_y.max(y + extent);
        self.min_y = self.min_y.min(y);
        self.size_y = self.max_y - self.min_y;
    }

    /// True until at least one box has been fed on both axes.
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Pattern corner used as the placement origin.
    pub fn corner(&self, corner: StartCorner) -> Vec2 {
        if self.is_empty() {
            return Vec2::zero();
        }
        match corner {
            StartCorner::Origin => Vec2::new(self.min_x, self.min_y),
            StartCorner::PlusX => Vec2::new(self.max_x, self.min_y),
            StartCorner::PlusXY => Vec2::new(self.max_x, self.max_y),
            StartCorner::PlusY => Vec2::new(self.min_x, self.max_y),
        }
    }

    /// Center of the footprint.
    pub fn center(&self) -> Vec2 {
        if self.is_empty() {
            return Vec2::zero();
        }
        Vec2::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tracker_is_empty() {
        let size = PatternSize::default();
        assert!(size.is_empty());
        assert_eq!(size.size_x, 0.0);
        assert_eq!(size.center(), Vec2::zero());
    }

    #[test]
    fn size_is_max_minus_min() {
        let mut size = PatternSize::default();
        size.set_x(100.0, 400.0);
        size.set_x(-50.0, 300.0);
        size.set_y(0.0, 300.0);

        assert_eq!(size.min_x, -50.0);
        assert_eq!(size.max_x, 500.0);
        assert_eq!(size.size_x, size.max_x - size.min_x);
        assert_eq!(size.size_y, 300.0);
    }

    #[test]
    fn call_order_does_not_change_final_size() {
        let calls = [(0.0, 400.0), (400.0, 300.0), (-120.0, 400.0), (700.0, 300.0)];

        let mut forward = PatternSize::default();
        for (x, extent) in calls {
            forward.set_x(x, extent);
            forward.set_y(x / 2.0, extent);
        }

        let mut shuffled = PatternSize::default();
        for idx in [2, 0, 3, 1] {
            let (x, extent) = calls[idx];
            shuffled.set_y(x / 2.0, extent);
            shuffled.set_x(x, extent);
        }

        assert_eq!(forward, shuffled);
    }

    #[test]
    fn reset_clears_previous_bounds() {
        let mut size = PatternSize::default();
        size.set_x(0.0, 1200.0);
        size.set_y(0.0, 800.0);
        size.reset_ranges();
        size.set_x(0.0, 400.0);
        size.set_y(0.0, 300.0);
        assert_eq!(size.size_x, 400.0);
        assert_eq!(size.size_y, 300.0);
    }

    #[test]
    fn corners_follow_numbering() {
        let mut size = PatternSize::default();
        size.set_x(0.0, 1200.0);
        size.set_y(0.0, 800.0);
        assert_eq!(size.corner(StartCorner::Origin), Vec2::new(0.0, 0.0));
        assert_eq!(size.corner(StartCorner::PlusX), Vec2::new(1200.0, 0.0));
        assert_eq!(size.corner(StartCorner::PlusXY), Vec2::new(1200.0, 800.0));
        assert_eq!(size.corner(StartCorner::PlusY), Vec2::new(0.0, 800.0));
        assert_eq!(size.center(), Vec2::new(600.0, 400.0));
    }
}
