// Copyright (c) 2024-present, seqtree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Compile-shape parameters (`S`, `MAX`) and the balance thresholds derived
//! from them.
//!
//! `S` and `MAX` are runtime values carried by value rather than const
//! generics; see `DESIGN.md` for why. Both must be powers of two, `MAX`
//! additionally at least 4, checked once at construction time so every
//! downstream `log2` call is exact.

/// The leaf capacity / fan-out pair that governs balance for one
/// [`crate::Sequence`]. Cheap to copy, carried by every node and by
/// [`crate::Builder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    /// Leaf capacity. Power of two.
    pub s: usize,
    /// Inner-node fan-out. Power of two, `>= 4`.
    pub max: usize,
}

impl Shape {
    /// Constructs a shape, panicking if `s`/`max` are not powers of two or
    /// `max < 4`. This is a one-time construction-site check, not a hot
    /// path, so a panic (rather than a `Result`) matches how the rest of
    /// the core treats precondition violations: fatal and uncaught.
    #[must_use]
    pub fn new(s: usize, max: usize) -> Self {
        assert!(s.is_power_of_two(), "leaf capacity S must be a power of two");
        assert!(
            max.is_power_of_two() && max >= 4,
            "fan-out MAX must be a power of two >= 4"
        );
        Self { s, max }
    }

    #[must_use]
    pub fn log_s(self) -> u32 {
        self.s.trailing_zeros()
    }

    #[must_use]
    pub fn log_max(self) -> u32 {
        self.max.trailing_zeros()
    }

    /// `minSizeForHeight(h) = 2^((log S - 1) + (log MAX - 1) * h)`.
    #[must_use]
    pub fn min_size_for_height(self, h: i8) -> usize {
        let exponent = (self.log_s() as i64 - 1) + (self.log_max() as i64 - 1) * i64::from(h);
        debug_assert!(exponent >= 0, "minSizeForHeight exponent went negative");
        1usize << exponent.max(0)
    }

    /// Maximum aggregated size two adjacent `ANode` overlays may have and
    /// still be worth fusing (`ANode::can_compact`).
    #[must_use]
    pub fn max_compaction_size(self, h: i8) -> usize {
        if h == 0 {
            self.s / self.max
        } else {
            self.min_size_for_height(h - 1)
        }
    }

    /// At height 0, the maximum window size an `ANode` overlay may cover:
    /// the window must be `<= 2*S/MAX`.
    #[must_use]
    pub fn max_leaf_overlay_window(self) -> usize {
        2 * self.s / self.max
    }

    /// Upper bound on tree height for this shape, used to size the fixed
    /// "active seam parents" scratch arrays the `Builder` descends with.
    #[must_use]
    pub fn max_height(self) -> usize {
        let log_half_s = (self.s / 2).max(1).trailing_zeros().max(1) as usize;
        let log_half_max = (self.max / 2).max(1).trailing_zeros().max(1) as usize;
        let numerator = 64usize.saturating_sub(log_half_s);
        numerator.div_ceil(log_half_max) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::Shape;

    #[test]
    fn min_size_for_height_matches_spec_example() {
        // S=16, MAX=4, a common shape used throughout the test suite
        let shape = Shape::new(16, 4);
        // height 0: 2^(3) = 8
        assert_eq!(shape.min_size_for_height(0), 8);
        // height 1: 2^(3 + 1) = 16
        assert_eq!(shape.min_size_for_height(1), 16);
        // height 2: 2^(3 + 2) = 32
        assert_eq!(shape.min_size_for_height(2), 32);
    }

    #[test]
    fn max_compaction_size_height_zero_uses_s_over_max() {
        let shape = Shape::new(16, 4);
        assert_eq!(shape.max_compaction_size(0), 4);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two_s() {
        Shape::new(15, 4);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_small_max() {
        Shape::new(16, 2);
    }
}
