//! Point features and way vertices.

use std::rc::Rc;

use geo::Coord;
use serde_json::{Value, json};

use super::{Geometry, OsmEntity, Way, tag_jxon, version_jxon};
use crate::extent::Extent;
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};
use crate::tags::Tags;

/// A single located point.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osm_edit_core::{Node, OsmEntity};
///
/// let node = Node::new("n1", Coord { x: 1.0, y: 2.0 });
/// let moved = node.move_to(Coord { x: 3.0, y: 4.0 });
/// assert_eq!(moved.id(), node.id());
/// assert_eq!(node.loc, Coord { x: 1.0, y: 2.0 });
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Stable identifier.
    pub id: EntityId,
    /// Free-form tags.
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: Tags,
    /// Server version, if uploaded.
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: Option<String>,
    /// False when deleted on the server.
    #[cfg_attr(feature = "serde", serde(default = "visible_default"))]
    pub visible: bool,
    /// Last editor, if known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub user: Option<String>,
    /// Longitude (`x`) and latitude (`y`).
    pub loc: Coord<f64>,
}

#[cfg(feature = "serde")]
pub(super) const fn visible_default() -> bool {
    true
}

impl Node {
    /// A visible, untagged node.
    #[must_use]
    pub fn new(id: impl Into<EntityId>, loc: Coord<f64>) -> Self {
        Self {
            id: id.into(),
            tags: Tags::new(),
            version: None,
            visible: true,
            user: None,
            loc,
        }
    }

    /// A node with a freshly issued id.
    #[must_use]
    pub fn create(loc: Coord<f64>) -> Self {
        Self::new(EntityId::next(EntityKind::Node), loc)
    }

    /// Replace the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Set the server version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the last editor.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// A copy at `loc`.
    #[must_use]
    pub fn move_to(&self, loc: Coord<f64>) -> Self {
        Self {
            loc,
            ..self.clone()
        }
    }

    /// A zero-area extent at the node.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        Extent::from_point(self.loc)
    }

    /// True when the location lies outside the lon/lat range.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !((-180.0..=180.0).contains(&self.loc.x) && (-90.0..=90.0).contains(&self.loc.y))
    }

    /// [`Geometry::Point`] for standalone nodes, [`Geometry::Vertex`] otherwise.
    #[must_use]
    pub fn geometry(&self, graph: &Graph) -> Geometry {
        graph.cached(self, "geometry", || {
            if graph.is_poi(&self.id) {
                Geometry::Point
            } else {
                Geometry::Vertex
            }
        })
    }

    /// True if the node is the first or last node of an unclosed parent way.
    #[must_use]
    pub fn is_endpoint(&self, graph: &Graph) -> bool {
        graph.cached(self, "is_endpoint", || {
            graph
                .parent_ways(&self.id)
                .iter()
                .any(|way| !way.is_closed() && way.affix(&self.id).is_some())
        })
    }

    /// True if the node joins several interesting lines, or one way twice.
    #[must_use]
    pub fn is_connected(&self, graph: &Graph) -> bool {
        graph.cached(self, "is_connected", || {
            let parents = graph.parent_ways(&self.id);
            match parents.as_slice() {
                [] => false,
                [way] => {
                    let mut nodes = way.nodes.as_slice();
                    if way.is_closed() {
                        nodes = nodes.split_last().map_or(nodes, |(_, rest)| rest);
                    }
                    nodes.iter().filter(|id| **id == self.id).count() > 1
                }
                many => many
                    .iter()
                    .any(|way| way.geometry(graph) == Geometry::Line && way.has_interesting_tags()),
            }
        })
    }

    /// Parent lines that belong to a transport network.
    #[must_use]
    pub fn parent_intersection_ways(&self, graph: &Graph) -> Vec<Rc<Way>> {
        graph.cached(self, "parent_intersection_ways", || {
            graph
                .parent_ways(&self.id)
                .into_iter()
                .filter(|way| {
                    ["highway", "waterway", "railway", "aeroway"]
                        .iter()
                        .any(|key| way.tags.contains_key(*key))
                        && way.geometry(graph) == Geometry::Line
                })
                .collect()
        })
    }

    /// True if more than one network line passes through the node.
    #[must_use]
    pub fn is_intersection(&self, graph: &Graph) -> bool {
        self.parent_intersection_ways(graph).len() > 1
    }

    /// True if more than one highway line passes through the node.
    #[must_use]
    pub fn is_highway_intersection(&self, graph: &Graph) -> bool {
        graph.cached(self, "is_highway_intersection", || {
            graph
                .parent_ways(&self.id)
                .iter()
                .filter(|way| {
                    way.tags.contains_key("highway") && way.geometry(graph) == Geometry::Line
                })
                .count()
                > 1
        })
    }

    /// True for highway or railway crossings.
    #[must_use]
    pub fn is_crossing(&self) -> bool {
        self.tags.get("highway").is_some_and(|v| v == "crossing")
            || self.tags.get("railway").is_some_and(|v| v.contains("crossing"))
    }

    /// Upload representation.
    ///
    /// # Examples
    /// ```
    /// use geo::Coord;
    /// use osm_edit_core::Node;
    ///
    /// let jxon = Node::new("n-1", Coord { x: 1.0, y: 2.0 }).as_jxon(Some("9"));
    /// assert_eq!(jxon["node"]["@id"], "-1");
    /// assert_eq!(jxon["node"]["@lat"], 2.0);
    /// assert_eq!(jxon["node"]["@changeset"], "9");
    /// ```
    #[must_use]
    pub fn as_jxon(&self, changeset: Option<&str>) -> Value {
        let mut body = json!({
            "@id": self.osm_id(),
            "@lon": self.loc.x,
            "@lat": self.loc.y,
            "@version": version_jxon(self.version.as_deref()),
            "tag": tag_jxon(&self.tags),
        });
        if let (Some(changeset), Some(map)) = (changeset, body.as_object_mut()) {
            map.insert("@changeset".to_owned(), json!(changeset));
        }
        json!({ "node": body })
    }
}
