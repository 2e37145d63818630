//! Planar and spherical geometry helpers used by entities and actions.
//!
//! Coordinates are `geo::Coord<f64>`; for geographic input `x` is longitude
//! and `y` latitude, for projected input they are screen units.

use std::f64::consts::TAU;

use geo::coordinate_position::CoordPos;
use geo::{
    Centroid, ConvexHull, Coord, CoordinatePosition, Intersects, LineString, MultiPoint, Polygon,
};

use crate::extent::Extent;

/// WGS84 equatorial radius in metres.
pub const EQUATORIAL_RADIUS: f64 = 6_378_137.0;
/// WGS84 polar radius in metres.
pub const POLAR_RADIUS: f64 = 6_356_752.314_245_179;

/// Convert a latitude delta in degrees to metres.
#[must_use]
pub const fn lat_to_meters(d_lat: f64) -> f64 {
    d_lat * (TAU * POLAR_RADIUS / 360.0)
}

/// Convert a longitude delta in degrees to metres at latitude `at_lat`.
#[must_use]
pub fn lon_to_meters(d_lon: f64, at_lat: f64) -> f64 {
    if at_lat.abs() >= 90.0 {
        0.0
    } else {
        d_lon * (TAU * EQUATORIAL_RADIUS / 360.0) * at_lat.to_radians().cos().abs()
    }
}

/// Approximate distance in metres between two lon/lat points.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osm_edit_core::geom::spherical_distance;
///
/// let d = spherical_distance(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 1.0 });
/// assert!((d - 110_946.0).abs() < 1.0);
/// ```
#[must_use]
pub fn spherical_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let x = lon_to_meters(a.x - b.x, (a.y + b.y) / 2.0);
    let y = lat_to_meters(a.y - b.y);
    x.hypot(y)
}

/// Unsigned area of a lon/lat ring on the unit sphere, in steradians.
///
/// Uses the Chamberlain-Duquette approximation; the ring may be open or
/// closed.
#[must_use]
pub fn spherical_ring_area(ring: &[Coord<f64>]) -> f64 {
    let Some(&last) = ring.last() else {
        return 0.0;
    };
    let mut prev = last;
    let mut total = 0.0;
    for &point in ring {
        let d_lon = (point.x - prev.x).to_radians();
        total += d_lon * (2.0 + prev.y.to_radians().sin() + point.y.to_radians().sin());
        prev = point;
    }
    let area = (total / 2.0).abs();
    if area.is_finite() { area } else { 0.0 }
}

/// Linear interpolation between `a` and `b`.
#[must_use]
pub const fn interp(a: Coord<f64>, b: Coord<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: a.x + (b.x - a.x) * t,
        y: a.y + (b.y - a.y) * t,
    }
}

/// Euclidean distance.
#[must_use]
pub fn vec_length(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Dot product of `a - origin` and `b - origin`.
#[must_use]
pub fn vec_dot(a: Coord<f64>, b: Coord<f64>, origin: Coord<f64>) -> f64 {
    let p = a - origin;
    let q = b - origin;
    p.x * q.x + p.y * q.y
}

/// Z component of the cross product of `a - origin` and `b - origin`.
#[must_use]
pub fn vec_cross(a: Coord<f64>, b: Coord<f64>, origin: Coord<f64>) -> f64 {
    let p = a - origin;
    let q = b - origin;
    p.x * q.y - p.y * q.x
}

/// Intersection point of two segments.
///
/// Segments that are parallel, or whose second segment starts on the line
/// through the first, report no intersection; shared endpoints between
/// consecutive path segments are therefore not counted.
#[must_use]
pub fn line_intersection(a: [Coord<f64>; 2], b: [Coord<f64>; 2]) -> Option<Coord<f64>> {
    let [p, p2] = a;
    let [q, q2] = b;
    let r = p2 - p;
    let s = q2 - q;
    let origin = Coord { x: 0.0, y: 0.0 };
    let u_numerator = vec_cross(q - p, r, origin);
    let denominator = vec_cross(r, s, origin);
    if u_numerator == 0.0 || denominator == 0.0 {
        return None;
    }
    let u = u_numerator / denominator;
    let t = vec_cross(q - p, s, origin) / denominator;
    ((0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)).then(|| interp(p, p2, t))
}

/// Every crossing between the segments of two paths.
#[must_use]
pub fn path_intersections(a: &[Coord<f64>], b: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut hits = Vec::new();
    for sa in a.windows(2) {
        for sb in b.windows(2) {
            if let Some(hit) = line_intersection([sa[0], sa[1]], [sb[0], sb[1]]) {
                hits.push(hit);
            }
        }
    }
    hits
}

fn polygon_of(ring: &[Coord<f64>]) -> Polygon<f64> {
    Polygon::new(LineString::from(ring.to_vec()), Vec::new())
}

/// True if `point` lies strictly inside the ring.
#[must_use]
pub fn point_in_polygon(point: Coord<f64>, ring: &[Coord<f64>]) -> bool {
    ring.len() >= 3 && polygon_of(ring).coordinate_position(&point) == CoordPos::Inside
}

/// True if every vertex of `inner` lies inside `outer`.
#[must_use]
pub fn polygon_contains_polygon(outer: &[Coord<f64>], inner: &[Coord<f64>]) -> bool {
    if outer.len() < 3 {
        return false;
    }
    let polygon = polygon_of(outer);
    inner
        .iter()
        .all(|p| polygon.coordinate_position(p) == CoordPos::Inside)
}

/// True if the rings overlap at all.
#[must_use]
pub fn polygon_intersects_polygon(a: &[Coord<f64>], b: &[Coord<f64>]) -> bool {
    polygon_of(a).intersects(&polygon_of(b))
}

/// Signed shoelace area; positive for counterclockwise rings.
#[must_use]
pub fn signed_area(ring: &[Coord<f64>]) -> f64 {
    let Some(&last) = ring.last() else {
        return 0.0;
    };
    let mut prev = last;
    let mut twice = 0.0;
    for &point in ring {
        twice += prev.x * point.y - point.x * prev.y;
        prev = point;
    }
    twice / 2.0
}

/// Area-weighted centroid of a ring, falling back to lower dimensions when
/// the ring is degenerate.
#[must_use]
pub fn polygon_centroid(ring: &[Coord<f64>]) -> Option<Coord<f64>> {
    if ring.is_empty() {
        return None;
    }
    polygon_of(ring).centroid().map(Coord::from)
}

/// Convex hull as an open counterclockwise ring.
#[must_use]
pub fn convex_hull(points: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let hull = MultiPoint::from(points.to_vec()).convex_hull();
    let mut ring: Vec<Coord<f64>> = hull.exterior().coords().copied().collect();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Rotate points by `angle` radians around `pivot`.
#[must_use]
pub fn rotate(points: &[Coord<f64>], angle: f64, pivot: Coord<f64>) -> Vec<Coord<f64>> {
    let (sin, cos) = angle.sin_cos();
    points
        .iter()
        .map(|&point| {
            let radial = point - pivot;
            Coord {
                x: radial.x * cos - radial.y * sin + pivot.x,
                y: radial.x * sin + radial.y * cos + pivot.y,
            }
        })
        .collect()
}

/// Smallest-area rectangle enclosing `points`, as a closed five-point ring.
///
/// The rectangle is aligned with one edge of the convex hull.
#[must_use]
pub fn smallest_surrounding_rectangle(points: &[Coord<f64>]) -> Option<[Coord<f64>; 5]> {
    let hull = convex_hull(points);
    let centroid = polygon_centroid(&hull)?;
    let first = *hull.first()?;
    let mut best: Option<(f64, Extent, f64)> = None;
    let mut c1 = first;
    for i in 0..hull.len() {
        let c2 = hull.get(i + 1).copied().unwrap_or(first);
        let angle = (c2.y - c1.y).atan2(c2.x - c1.x);
        let extent: Extent = rotate(&hull, -angle, centroid).into_iter().collect();
        let area = extent.area();
        if best.as_ref().is_none_or(|(min, _, _)| area < *min) {
            best = Some((area, extent, angle));
        }
        c1 = c2;
    }
    let (_, extent, angle) = best?;
    let ring = rotate(&extent.polygon(), angle, centroid);
    ring.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[rstest]
    fn crossing_segments_intersect() {
        let hit = line_intersection([c(0.0, 0.0), c(2.0, 2.0)], [c(0.0, 2.0), c(2.0, 0.0)]);
        assert_eq!(hit, Some(c(1.0, 1.0)));
    }

    #[rstest]
    fn shared_endpoint_is_not_an_intersection() {
        let hit = line_intersection([c(0.0, 0.0), c(1.0, 0.0)], [c(1.0, 0.0), c(2.0, 1.0)]);
        assert!(hit.is_none());
    }

    #[rstest]
    fn path_intersections_finds_crossing() {
        let a = [c(0.0, 0.0), c(0.0, 10.0), c(5.0, 5.0)];
        let b = [c(5.0, 5.0), c(-5.0, 5.0)];
        assert_eq!(path_intersections(&a, &b), vec![c(0.0, 5.0)]);
    }

    #[rstest]
    fn ring_containment() {
        let outer = [c(0.0, 0.0), c(0.0, 4.0), c(4.0, 4.0), c(4.0, 0.0), c(0.0, 0.0)];
        let inner = [c(1.0, 1.0), c(1.0, 2.0), c(2.0, 2.0), c(1.0, 1.0)];
        assert!(polygon_contains_polygon(&outer, &inner));
        assert!(!polygon_contains_polygon(&inner, &outer));
        assert!(point_in_polygon(c(2.0, 2.0), &outer));
    }

    #[rstest]
    fn signed_area_tracks_winding() {
        let ccw = [c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0)];
        let mut cw = ccw;
        cw.reverse();
        assert_eq!(signed_area(&ccw), 1.0);
        assert_eq!(signed_area(&cw), -1.0);
    }

    #[rstest]
    fn hull_drops_interior_points() {
        let points = [c(0.0, 0.0), c(2.0, 0.0), c(1.0, 0.5), c(2.0, 2.0), c(0.0, 2.0)];
        let hull = convex_hull(&points);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&c(1.0, 0.5)));
    }

    #[rstest]
    fn surrounding_rectangle_of_axis_aligned_box() {
        let points = [c(0.0, 0.0), c(4.0, 0.0), c(4.0, 1.0), c(0.0, 1.0)];
        let rect = smallest_surrounding_rectangle(&points).unwrap();
        let extent: Extent = rect.into_iter().collect();
        assert!((extent.area() - 4.0).abs() < 1e-9);
    }

    #[rstest]
    fn spherical_area_of_small_square() {
        let ring = [c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0)];
        let expected = 1_f64.to_radians() * 1_f64.to_radians();
        assert!((spherical_ring_area(&ring) - expected).abs() < 1e-6);
        assert_eq!(spherical_ring_area(&[]), 0.0);
    }

    #[rstest]
    fn spherical_distance_along_equator() {
        let d = spherical_distance(c(0.0, 0.0), c(1.0, 0.0));
        assert!((d - TAU * EQUATORIAL_RADIUS / 360.0).abs() < 1e-6);
    }
}
