//! Axis-aligned bounding boxes in lon/lat space.

use geo::{Coord, Rect};
use rstar::AABB;

/// An axis-aligned box, possibly empty.
///
/// The empty extent has inverted infinite corners, so extending it with any
/// point yields that point and it intersects nothing.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osm_edit_core::Extent;
///
/// let a = Extent::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 2.0 });
/// let b = Extent::from_point(Coord { x: 1.0, y: 1.0 });
/// assert!(a.intersects(&b));
/// assert!(!Extent::empty().intersects(&a));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    min: Coord<f64>,
    max: Coord<f64>,
}

impl Default for Extent {
    fn default() -> Self {
        Self::empty()
    }
}

impl Extent {
    /// An extent containing nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min: Coord {
                x: f64::INFINITY,
                y: f64::INFINITY,
            },
            max: Coord {
                x: f64::NEG_INFINITY,
                y: f64::NEG_INFINITY,
            },
        }
    }

    /// The box spanned by two corners, in any order.
    #[must_use]
    pub const fn new(a: Coord<f64>, b: Coord<f64>) -> Self {
        Self {
            min: Coord {
                x: a.x.min(b.x),
                y: a.y.min(b.y),
            },
            max: Coord {
                x: a.x.max(b.x),
                y: a.y.max(b.y),
            },
        }
    }

    /// A zero-area box at `point`.
    #[must_use]
    pub const fn from_point(point: Coord<f64>) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Minimum corner.
    #[must_use]
    pub const fn min(&self) -> Coord<f64> {
        self.min
    }

    /// Maximum corner.
    #[must_use]
    pub const fn max(&self) -> Coord<f64> {
        self.max
    }

    /// True when the extent contains no point.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// Smallest extent covering both.
    #[must_use]
    pub const fn extend(&self, other: &Self) -> Self {
        Self {
            min: Coord {
                x: self.min.x.min(other.min.x),
                y: self.min.y.min(other.min.y),
            },
            max: Coord {
                x: self.max.x.max(other.max.x),
                y: self.max.y.max(other.max.y),
            },
        }
    }

    /// Smallest extent covering this one and `point`.
    #[must_use]
    pub const fn extend_point(&self, point: Coord<f64>) -> Self {
        self.extend(&Self::from_point(point))
    }

    /// True if the boxes overlap or touch.
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        other.min.x <= self.max.x
            && other.min.y <= self.max.y
            && other.max.x >= self.min.x
            && other.max.y >= self.min.y
    }

    /// True if `other` lies entirely within this box.
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        other.min.x >= self.min.x
            && other.min.y >= self.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    /// Planar area, zero when empty.
    #[must_use]
    pub const fn area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (self.max.x - self.min.x) * (self.max.y - self.min.y)
    }

    /// Centre point.
    #[must_use]
    pub const fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.min.x + self.max.x) / 2.0,
            y: (self.min.y + self.max.y) / 2.0,
        }
    }

    /// Closed ring tracing the box, starting at the minimum corner.
    #[must_use]
    pub const fn polygon(&self) -> [Coord<f64>; 5] {
        [
            self.min,
            Coord {
                x: self.min.x,
                y: self.max.y,
            },
            self.max,
            Coord {
                x: self.max.x,
                y: self.min.y,
            },
            self.min,
        ]
    }

    /// Envelope for spatial indexing, or `None` for the empty extent.
    #[must_use]
    pub fn to_aabb(&self) -> Option<AABB<[f64; 2]>> {
        (!self.is_empty()).then(|| {
            AABB::from_corners([self.min.x, self.min.y], [self.max.x, self.max.y])
        })
    }

    /// The equivalent `geo` rectangle, or `None` for the empty extent.
    #[must_use]
    pub fn to_rect(&self) -> Option<Rect<f64>> {
        (!self.is_empty()).then(|| Rect::new(self.min, self.max))
    }
}

impl FromIterator<Coord<f64>> for Extent {
    fn from_iter<T: IntoIterator<Item = Coord<f64>>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |acc, point| acc.extend_point(point))
    }
}
