//! Boundary policies for reads outside a view's bounds.

/// How an extended view answers queries outside the source bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extension {
    /// The element type's additive identity.
    #[default]
    Zero,
    /// The nearest boundary sample.
    Border,
    /// Reflect about the boundary, excluding the boundary sample itself:
    /// `-1 -> 1`, `n -> n - 2`.
    MirrorSingle,
    /// Reflect about the boundary, repeating the boundary sample:
    /// `-1 -> 0`, `n -> n - 1`.
    MirrorDouble,
    /// Wrap around: `-1 -> n - 1`, `n -> 0`.
    Periodic,
}

impl Extension {
    /// Map a coordinate on one axis into `[min, max]`.
    ///
    /// Returns `None` for [`Extension::Zero`] when `x` lies outside, which
    /// the resolver answers with zero.
    pub fn map_coordinate(self, x: i64, min: i64, max: i64) -> Option<i64> {
        if min <= x && x <= max {
            return Some(x);
        }
        let n = max - min + 1;
        let rel = x - min;
        let mapped = match self {
            Extension::Zero => return None,
            Extension::Border => rel.clamp(0, n - 1),
            Extension::Periodic => rel.rem_euclid(n),
            Extension::MirrorSingle => {
                if n == 1 {
                    0
                } else {
                    let period = 2 * n - 2;
                    let r = rel.rem_euclid(period);
                    if r < n {
                        r
                    } else {
                        period - r
                    }
                }
            }
            Extension::MirrorDouble => {
                let period = 2 * n;
                let r = rel.rem_euclid(period);
                if r < n {
                    r
                } else {
                    period - 1 - r
                }
            }
        };
        Some(min + mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_single() {
        let ext = Extension::MirrorSingle;
        // [0, 9]
        assert_eq!(ext.map_coordinate(-1, 0, 9), Some(1));
        assert_eq!(ext.map_coordinate(-2, 0, 9), Some(2));
        assert_eq!(ext.map_coordinate(10, 0, 9), Some(8));
        assert_eq!(ext.map_coordinate(18, 0, 9), Some(0));
        assert_eq!(ext.map_coordinate(19, 0, 9), Some(1));
        assert_eq!(ext.map_coordinate(5, 0, 9), Some(5));
        // shifted bounds
        assert_eq!(ext.map_coordinate(3, 4, 7), Some(5));
        // single sample
        assert_eq!(ext.map_coordinate(-5, 2, 2), Some(2));
    }

    #[test]
    fn test_mirror_double() {
        let ext = Extension::MirrorDouble;
        assert_eq!(ext.map_coordinate(-1, 0, 9), Some(0));
        assert_eq!(ext.map_coordinate(-2, 0, 9), Some(1));
        assert_eq!(ext.map_coordinate(10, 0, 9), Some(9));
        assert_eq!(ext.map_coordinate(11, 0, 9), Some(8));
    }

    #[test]
    fn test_border_periodic_zero() {
        assert_eq!(Extension::Border.map_coordinate(-7, 0, 3), Some(0));
        assert_eq!(Extension::Border.map_coordinate(12, 0, 3), Some(3));
        assert_eq!(Extension::Periodic.map_coordinate(-1, 0, 3), Some(3));
        assert_eq!(Extension::Periodic.map_coordinate(4, 0, 3), Some(0));
        assert_eq!(Extension::Zero.map_coordinate(4, 0, 3), None);
        assert_eq!(Extension::Zero.map_coordinate(2, 0, 3), Some(2));
    }
}
