//! Ordered node sequences: lines and closed areas.

use std::collections::HashSet;

use geo::Coord;
use serde_json::{Value, json};

use super::{Geometry, OsmEntity, tag_jxon, version_jxon};
use crate::config::{AreaKeys, remove_lifecycle_prefix};
use crate::error::WayError;
use crate::extent::Extent;
use crate::geom::{spherical_ring_area, vec_cross};
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};
use crate::tags::Tags;

/// Where a node sits at the end of a way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affix {
    /// The first node.
    Prefix,
    /// The last node.
    Suffix,
}

/// A pair of consecutive way nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// `<way id>-<index>`.
    pub id: String,
    /// The owning way.
    pub way_id: EntityId,
    /// Position of the first node in the way.
    pub index: usize,
    /// The two node ids.
    pub nodes: [EntityId; 2],
}

/// Keys and values that make a way one-way without an `oneway` tag.
const IMPLIED_ONEWAY: &[(&str, &[&str])] = &[
    (
        "aerialway",
        &[
            "chair_lift",
            "drag_lift",
            "j-bar",
            "magic_carpet",
            "mixed_lift",
            "platter",
            "rope_tow",
            "t-bar",
            "zip_line",
        ],
    ),
    ("highway", &["motorway"]),
    ("junction", &["circular", "roundabout"]),
    ("man_made", &["goods_conveyor", "piste:halfpipe"]),
    ("piste:type", &["downhill", "sled", "yes"]),
    (
        "seamark:type",
        &[
            "two-way_route",
            "recommended_traffic_lane",
            "separation_lane",
            "separation_roundabout",
        ],
    ),
    (
        "waterway",
        &[
            "canal",
            "ditch",
            "drain",
            "fish_pass",
            "flowline",
            "pressurised",
            "river",
            "stream",
            "tidal_channel",
        ],
    ),
];

/// Tags whose right-hand side is the inside of the feature. An entry of
/// `None` reports the key itself as the sidedness identifier.
const RIGHT_SIDE_IS_INSIDE: &[(&str, &str, Option<&str>)] = &[
    ("natural", "cliff", None),
    ("natural", "coastline", Some("coastline")),
    ("barrier", "retaining_wall", None),
    ("barrier", "kerb", None),
    ("barrier", "guard_rail", None),
    ("barrier", "city_wall", None),
    ("man_made", "embankment", None),
    ("man_made", "quay", None),
    ("waterway", "weir", None),
];

/// An ordered list of node ids.
///
/// Ways reference nodes by id and may repeat them; a way is closed when it
/// has more than one node and its first and last ids match.
///
/// # Examples
/// ```
/// use osm_edit_core::Way;
///
/// let way = Way::new("w1", vec!["a".into(), "b".into(), "a".into()]);
/// assert!(way.is_closed());
/// let open = way.unclose();
/// assert_eq!(open.nodes.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Way {
    /// Stable identifier.
    pub id: EntityId,
    /// Free-form tags.
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: Tags,
    /// Server version, if uploaded.
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: Option<String>,
    /// False when deleted on the server.
    #[cfg_attr(feature = "serde", serde(default = "super::node::visible_default"))]
    pub visible: bool,
    /// Last editor, if known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub user: Option<String>,
    /// Node ids in drawing order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub nodes: Vec<EntityId>,
}

impl Way {
    /// A visible, untagged way over `nodes`.
    #[must_use]
    pub fn new(id: impl Into<EntityId>, nodes: Vec<EntityId>) -> Self {
        Self {
            id: id.into(),
            tags: Tags::new(),
            version: None,
            visible: true,
            user: None,
            nodes,
        }
    }

    /// A way with a freshly issued id.
    #[must_use]
    pub fn create(nodes: Vec<EntityId>) -> Self {
        Self::new(EntityId::next(EntityKind::Way), nodes)
    }

    /// Replace the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Replace the node list.
    #[must_use]
    pub fn with_nodes(mut self, nodes: Vec<EntityId>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Set the server version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// First node id.
    #[must_use]
    pub fn first(&self) -> Option<&EntityId> {
        self.nodes.first()
    }

    /// Last node id.
    #[must_use]
    pub fn last(&self) -> Option<&EntityId> {
        self.nodes.last()
    }

    /// True if `node` occurs anywhere in the way.
    #[must_use]
    pub fn contains(&self, node: &EntityId) -> bool {
        self.nodes.contains(node)
    }

    /// Whether `node` starts or ends the way.
    #[must_use]
    pub fn affix(&self, node: &EntityId) -> Option<Affix> {
        if self.first() == Some(node) {
            Some(Affix::Prefix)
        } else if self.last() == Some(node) {
            Some(Affix::Suffix)
        } else {
            None
        }
    }

    /// Vertical layer in `-10..=10`, from `layer` or implied by other tags.
    #[must_use]
    pub fn layer(&self) -> f64 {
        let tag = |key: &str| self.tags.get(key).map(String::as_str);
        if let Some(layer) = tag("layer")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
        {
            return layer.clamp(-10.0, 10.0);
        }
        if tag("covered") == Some("yes") {
            return -1.0;
        }
        match tag("location") {
            Some("overground") => return 1.0,
            Some("underground") => return -1.0,
            Some("underwater") => return -10.0,
            _ => {}
        }
        if matches!(tag("power"), Some("line" | "minor_line")) || tag("aerialway").is_some() {
            return 10.0;
        }
        if tag("bridge").is_some() {
            return 1.0;
        }
        if tag("cutting").is_some() || tag("tunnel").is_some() || tag("waterway").is_some() {
            return -1.0;
        }
        if tag("man_made") == Some("pipeline") || tag("boundary").is_some() {
            return -10.0;
        }
        0.0
    }

    /// True if traffic may only flow in one direction.
    #[must_use]
    pub fn is_one_way(&self) -> bool {
        match self.tags.get("oneway").map(String::as_str) {
            Some("yes" | "1" | "-1" | "reversible" | "alternating") => return true,
            Some("no" | "0") => return false,
            _ => {}
        }
        self.tags.iter().any(|(key, value)| {
            IMPLIED_ONEWAY
                .iter()
                .any(|(k, values)| k == key && values.contains(&value.as_str()))
        })
    }

    /// The key (or special value) that makes this way sided, if any.
    #[must_use]
    pub fn sidedness_identifier(&self) -> Option<&str> {
        self.tags.iter().find_map(|(real_key, value)| {
            let key = remove_lifecycle_prefix(real_key);
            RIGHT_SIDE_IS_INSIDE
                .iter()
                .find(|(k, v, _)| *k == key && v == value)
                .map(|(_, _, special)| special.unwrap_or(key))
        })
    }

    /// True if the left and right sides of the way differ in meaning.
    #[must_use]
    pub fn is_sided(&self) -> bool {
        if self.tags.get("two_sided").is_some_and(|v| v == "yes") {
            return false;
        }
        self.sidedness_identifier().is_some()
    }

    /// True if first and last node match.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.nodes.len() > 1 && self.first() == self.last()
    }

    /// True if the way is an area according to the built-in area keys.
    #[must_use]
    pub fn is_area(&self) -> bool {
        self.is_area_with(AreaKeys::builtin())
    }

    /// True if the way is an area according to `keys`.
    #[must_use]
    pub fn is_area_with(&self, keys: &AreaKeys) -> bool {
        match self.tags.get("area").map(String::as_str) {
            Some("yes") => return true,
            Some("no") => return false,
            _ => {}
        }
        self.is_closed() && keys.tag_suggesting_area(&self.tags).is_some()
    }

    /// True when too few distinct nodes remain to draw the way.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        let unique: HashSet<&EntityId> = self.nodes.iter().collect();
        unique.len() < if self.is_closed() { 3 } else { 2 }
    }

    /// True if `a` and `b` are consecutive somewhere in the way.
    #[must_use]
    pub fn are_adjacent(&self, a: &EntityId, b: &EntityId) -> bool {
        self.nodes
            .windows(2)
            .any(|pair| (pair[0] == *a && pair[1] == *b) || (pair[0] == *b && pair[1] == *a))
    }

    /// [`Geometry::Area`] or [`Geometry::Line`].
    #[must_use]
    pub fn geometry(&self, graph: &Graph) -> Geometry {
        graph.cached(self, "geometry", || {
            if self.is_area() {
                Geometry::Area
            } else {
                Geometry::Line
            }
        })
    }

    /// Locations of the nodes present in `graph`, in order.
    #[must_use]
    pub fn locs(&self, graph: &Graph) -> Vec<Coord<f64>> {
        self.nodes
            .iter()
            .filter_map(|id| graph.has_entity(id))
            .filter_map(|entity| entity.as_node().map(|node| node.loc))
            .collect()
    }

    /// Bounding box of the resolvable child nodes.
    #[must_use]
    pub fn extent(&self, graph: &Graph) -> Extent {
        graph.cached(self, "extent", || self.locs(graph).into_iter().collect())
    }

    /// Whether the closed way turns consistently in one direction.
    ///
    /// `None` for unclosed or degenerate ways.
    #[must_use]
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "ring positions wrap modulo the ring length"
    )]
    pub fn is_convex(&self, graph: &Graph) -> Option<bool> {
        if !self.is_closed() || self.is_degenerate() {
            return None;
        }
        let mut seen = HashSet::new();
        let coords: Vec<Coord<f64>> = self
            .nodes
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| graph.has_entity(id))
            .filter_map(|entity| entity.as_node().map(|node| node.loc))
            .collect();
        let n = coords.len();
        let mut prev = 0;
        for i in 0..n {
            let a = coords[i];
            let o = coords[(i + 1) % n];
            let b = coords[(i + 2) % n];
            let cross = vec_cross(a, b, o);
            let curr = if cross > 0.0 {
                1
            } else if cross < 0.0 {
                -1
            } else {
                continue;
            };
            if prev != 0 && curr != prev {
                return Some(false);
            }
            prev = curr;
        }
        Some(true)
    }

    /// Area of the way on the unit sphere, in steradians.
    ///
    /// Unclosed ways are measured as if closed.
    #[must_use]
    pub fn area(&self, graph: &Graph) -> f64 {
        graph.cached(self, "area", || spherical_ring_area(&self.locs(graph)))
    }

    /// Consecutive node pairs.
    #[must_use]
    pub fn segments(&self, graph: &Graph) -> Vec<Segment> {
        graph.cached(self, "segments", || {
            self.nodes
                .windows(2)
                .enumerate()
                .map(|(index, pair)| Segment {
                    id: format!("{}-{index}", self.id),
                    way_id: self.id.clone(),
                    index,
                    nodes: [pair[0].clone(), pair[1].clone()],
                })
                .collect()
        })
    }

    fn reclose(&self, mut nodes: Vec<EntityId>, was_closed: bool) -> Self {
        nodes.dedup();
        if was_closed && (nodes.len() == 1 || nodes.first() != nodes.last()) {
            if let Some(first) = nodes.first().cloned() {
                nodes.push(first);
            }
        }
        self.clone().with_nodes(nodes)
    }

    /// Close the way by repeating its first node, collapsing repeats.
    #[must_use]
    pub fn close(&self) -> Self {
        if self.is_closed() || self.nodes.is_empty() {
            return self.clone();
        }
        let mut nodes = self.nodes.clone();
        nodes.dedup();
        if let Some(first) = nodes.first().cloned() {
            nodes.push(first);
        }
        self.clone().with_nodes(nodes)
    }

    /// Drop trailing connector nodes of a closed way, collapsing repeats.
    #[must_use]
    pub fn unclose(&self) -> Self {
        if !self.is_closed() {
            return self.clone();
        }
        let mut nodes = self.nodes.clone();
        let connector = nodes.first().cloned();
        while nodes.len() > 1 && nodes.last().cloned() == connector {
            nodes.pop();
        }
        nodes.dedup();
        self.clone().with_nodes(nodes)
    }

    /// Remove extra connector copies of a closed way, shifting `index` to
    /// keep pointing at the same slot. `on_trailing` adjusts the index when a
    /// trailing connector is removed.
    fn strip_connectors(
        nodes: &mut Vec<EntityId>,
        index: &mut usize,
        on_trailing: fn(&mut usize, usize),
    ) {
        let Some(connector) = nodes.first().cloned() else {
            return;
        };
        let i = 1;
        while i < nodes.len() && nodes.len() > 2 && nodes[i] == connector {
            nodes.remove(i);
            if *index > i {
                *index -= 1;
            }
        }
        let mut i = nodes.len() - 1;
        while i > 0 && nodes.len() > 1 && nodes[i] == connector {
            nodes.remove(i);
            on_trailing(index, i);
            i = nodes.len() - 1;
        }
    }

    /// Insert `id` at `index`, or at the end when `None`. Closed ways stay
    /// closed.
    ///
    /// # Errors
    /// [`WayError::IndexOutOfRange`] when `index` exceeds the insertable range.
    pub fn add_node(&self, id: EntityId, index: Option<usize>) -> Result<Self, WayError> {
        let was_closed = self.is_closed();
        let max = if was_closed {
            self.nodes.len() - 1
        } else {
            self.nodes.len()
        };
        let mut index = index.unwrap_or(max);
        if index > max {
            return Err(WayError::IndexOutOfRange {
                index,
                max: isize::try_from(max).unwrap_or(isize::MAX),
            });
        }
        let mut nodes = self.nodes.clone();
        if was_closed {
            Self::strip_connectors(&mut nodes, &mut index, |index, i| {
                if *index > i {
                    *index -= 1;
                }
            });
        }
        nodes.insert(index.min(nodes.len()), id);
        Ok(self.reclose(nodes, was_closed))
    }

    /// Replace the node at `index` with `id`. Closed ways stay closed.
    ///
    /// # Errors
    /// [`WayError::IndexOutOfRange`] when `index` is not a node position.
    pub fn update_node(&self, id: EntityId, index: usize) -> Result<Self, WayError> {
        let was_closed = self.is_closed();
        if index >= self.nodes.len() {
            let max = isize::try_from(self.nodes.len()).unwrap_or(isize::MAX) - 1;
            return Err(WayError::IndexOutOfRange { index, max });
        }
        let mut index = index;
        let mut nodes = self.nodes.clone();
        if was_closed {
            Self::strip_connectors(&mut nodes, &mut index, |index, i| {
                if *index == i {
                    *index = 0;
                }
            });
        }
        if let Some(slot) = nodes.get_mut(index) {
            *slot = id;
        }
        Ok(self.reclose(nodes, was_closed))
    }

    /// Replace every occurrence of `needle` with `replacement`.
    #[must_use]
    pub fn replace_node(&self, needle: &EntityId, replacement: &EntityId) -> Self {
        let nodes = self
            .nodes
            .iter()
            .map(|id| if id == needle { replacement.clone() } else { id.clone() })
            .collect();
        self.reclose(nodes, self.is_closed())
    }

    /// Remove every occurrence of `id`.
    #[must_use]
    pub fn remove_node(&self, id: &EntityId) -> Self {
        let nodes = self.nodes.iter().filter(|n| *n != id).cloned().collect();
        self.reclose(nodes, self.is_closed())
    }

    /// Upload representation.
    #[must_use]
    pub fn as_jxon(&self, changeset: Option<&str>) -> Value {
        let nd: Vec<Value> = self
            .nodes
            .iter()
            .map(|id| json!({ "keyAttributes": { "ref": id.osm_id() } }))
            .collect();
        let mut body = json!({
            "@id": self.osm_id(),
            "@version": version_jxon(self.version.as_deref()),
            "nd": nd,
            "tag": tag_jxon(&self.tags),
        });
        if let (Some(changeset), Some(map)) = (changeset, body.as_object_mut()) {
            map.insert("@changeset".to_owned(), json!(changeset));
        }
        json!({ "way": body })
    }
}
