//! Projections and terse builders for tests.
//!
//! Enabled under `cfg(test)` and by the `test-support` feature so that
//! downstream crates can drive actions without a rendering layer.

use std::f64::consts::FRAC_PI_4;

use geo::Coord;

use crate::entity::{Entity, Member, Node, Relation, Way};
use crate::id::EntityId;
use crate::projection::Projection;
use crate::tags::tags_from;

/// Treats coordinates as already planar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityProjection;

impl Projection for IdentityProjection {
    fn project(&self, loc: Coord<f64>) -> Coord<f64> {
        loc
    }

    fn invert(&self, point: Coord<f64>) -> Coord<f64> {
        point
    }
}

/// Spherical Mercator with `y` growing northwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorProjection {
    /// Planar units per radian.
    pub scale: f64,
}

impl Default for MercatorProjection {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl Projection for MercatorProjection {
    fn project(&self, loc: Coord<f64>) -> Coord<f64> {
        let lat = loc.y.to_radians();
        Coord {
            x: self.scale * loc.x.to_radians(),
            y: self.scale * (FRAC_PI_4 + lat / 2.0).tan().ln(),
        }
    }

    fn invert(&self, point: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (point.x / self.scale).to_degrees(),
            y: (2.0 * (point.y / self.scale).exp().atan() - 2.0 * FRAC_PI_4).to_degrees(),
        }
    }
}

/// Ids from string literals.
#[must_use]
pub fn ids(values: &[&str]) -> Vec<EntityId> {
    values.iter().map(|v| EntityId::new(v)).collect()
}

/// An untagged node at `(x, y)`.
#[must_use]
pub fn node(id: &str, x: f64, y: f64) -> Entity {
    Node::new(id, Coord { x, y }).into()
}

/// A node at `(x, y)` carrying `tags`.
#[must_use]
pub fn tagged_node(id: &str, x: f64, y: f64, tags: &[(&str, &str)]) -> Entity {
    Node::new(id, Coord { x, y })
        .with_tags(tags_from(tags.iter().copied()))
        .into()
}

/// An untagged way through `nodes`.
#[must_use]
pub fn way(id: &str, nodes: &[&str]) -> Entity {
    Way::new(id, ids(nodes)).into()
}

/// A way through `nodes` carrying `tags`.
#[must_use]
pub fn tagged_way(id: &str, nodes: &[&str], tags: &[(&str, &str)]) -> Entity {
    Way::new(id, ids(nodes))
        .with_tags(tags_from(tags.iter().copied()))
        .into()
}

/// A relation of way members given as `(id, role)` pairs.
#[must_use]
pub fn relation(id: &str, ways: &[(&str, &str)], tags: &[(&str, &str)]) -> Entity {
    Relation::new(id, ways.iter().map(|&(way, role)| Member::way(way, role)).collect())
        .with_tags(tags_from(tags.iter().copied()))
        .into()
}
