//! Relations: ordered, role-bearing member lists.

use std::collections::HashSet;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{Value, json};

use super::{Geometry, OsmEntity, tag_jxon, version_jxon};
use crate::extent::Extent;
use crate::geom::{polygon_contains_polygon, polygon_intersects_polygon, signed_area};
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};
use crate::join_ways::join_ways;
use crate::tags::Tags;

/// One entry in a relation's member list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Member {
    /// Referenced entity.
    pub id: EntityId,
    /// Kind of the referenced entity.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: EntityKind,
    /// Role within the relation; empty when unspecified.
    #[cfg_attr(feature = "serde", serde(default))]
    pub role: String,
}

impl Member {
    /// A member with the given role.
    #[must_use]
    pub fn new(id: impl Into<EntityId>, kind: EntityKind, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            role: role.into(),
        }
    }

    /// A way member with the given role.
    #[must_use]
    pub fn way(id: impl Into<EntityId>, role: impl Into<String>) -> Self {
        Self::new(id, EntityKind::Way, role)
    }

    /// A node member with the given role.
    #[must_use]
    pub fn node(id: impl Into<EntityId>, role: impl Into<String>) -> Self {
        Self::new(id, EntityKind::Node, role)
    }

    fn same_slot(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind && self.role == other.role
    }
}

/// A grouping of nodes, ways and other relations.
///
/// Members are held by id so relations can reference themselves or each
/// other; traversals guard against cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relation {
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
    /// Members in order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub members: Vec<Member>,
}

impl Relation {
    /// A visible, untagged relation.
    #[must_use]
    pub fn new(id: impl Into<EntityId>, members: Vec<Member>) -> Self {
        Self {
            id: id.into(),
            tags: Tags::new(),
            version: None,
            visible: true,
            user: None,
            members,
        }
    }

    /// A relation with a freshly issued id.
    #[must_use]
    pub fn create(members: Vec<Member>) -> Self {
        Self::new(EntityId::next(EntityKind::Relation), members)
    }

    /// Replace the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Replace the members.
    #[must_use]
    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.members = members;
        self
    }

    /// Set the server version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// First member referencing `id`.
    #[must_use]
    pub fn member_by_id(&self, id: &EntityId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == *id)
    }

    /// First member with `role`.
    #[must_use]
    pub fn member_by_role(&self, role: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.role == role)
    }

    /// Every member with `role`, with its position.
    #[must_use]
    pub fn members_by_role(&self, role: &str) -> Vec<(usize, &Member)> {
        self.members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == role)
            .collect()
    }

    /// First member referencing `id` with `role`, with its position.
    #[must_use]
    pub fn member_by_id_and_role(&self, id: &EntityId, role: &str) -> Option<(usize, &Member)> {
        self.members
            .iter()
            .enumerate()
            .find(|(_, m)| m.id == *id && m.role == role)
    }

    /// Position of the first member referencing `id`.
    #[must_use]
    pub fn index_of_member(&self, id: &EntityId) -> Option<usize> {
        self.members.iter().position(|m| m.id == *id)
    }

    /// Insert `member` at `index`, or append when `None`. Indexes past the
    /// end append.
    #[must_use]
    pub fn add_member(&self, member: Member, index: Option<usize>) -> Self {
        let mut members = self.members.clone();
        let index = index.map_or(members.len(), |i| i.min(members.len()));
        members.insert(index, member);
        self.clone().with_members(members)
    }

    /// Replace the member at `index`.
    #[must_use]
    pub fn update_member(&self, member: Member, index: usize) -> Self {
        let mut members = self.members.clone();
        if let Some(slot) = members.get_mut(index) {
            *slot = member;
        }
        self.clone().with_members(members)
    }

    /// Remove the member at `index`.
    #[must_use]
    pub fn remove_member(&self, index: usize) -> Self {
        let mut members = self.members.clone();
        if index < members.len() {
            members.remove(index);
        }
        self.clone().with_members(members)
    }

    /// Remove every member referencing `id`.
    #[must_use]
    pub fn remove_members_with_id(&self, id: &EntityId) -> Self {
        let members = self.members.iter().filter(|m| m.id != *id).cloned().collect();
        self.clone().with_members(members)
    }

    /// Move the member at `from` to position `to`.
    #[must_use]
    pub fn move_member(&self, from: usize, to: usize) -> Self {
        let mut members = self.members.clone();
        if from < members.len() {
            let member = members.remove(from);
            members.insert(to.min(members.len()), member);
        }
        self.clone().with_members(members)
    }

    /// Point every member referencing `needle` at `replacement`, keeping each
    /// member's role. Unless `keep_duplicates` is set, a replaced member that
    /// would duplicate another member's id, kind and role is dropped.
    ///
    /// Returns `None` when no member references `needle`.
    #[must_use]
    pub fn replace_member(
        &self,
        needle: &EntityId,
        replacement: &EntityId,
        replacement_kind: EntityKind,
        keep_duplicates: bool,
    ) -> Option<Self> {
        self.member_by_id(needle)?;
        let untouched: Vec<&Member> = self.members.iter().filter(|m| m.id != *needle).collect();
        let mut members: Vec<Member> = Vec::with_capacity(self.members.len());
        for member in &self.members {
            if member.id != *needle {
                members.push(member.clone());
                continue;
            }
            let replaced = Member::new(replacement.clone(), replacement_kind, member.role.clone());
            let duplicate = members.iter().any(|m| m.same_slot(&replaced))
                || untouched.iter().any(|m| m.same_slot(&replaced));
            if keep_duplicates || !duplicate {
                members.push(replaced);
            }
        }
        Some(self.clone().with_members(members))
    }

    /// True for `type=multipolygon`.
    #[must_use]
    pub fn is_multipolygon(&self) -> bool {
        self.tag("type") == Some("multipolygon")
    }

    /// True for `type=restriction` and its `restriction:*` variants.
    #[must_use]
    pub fn is_restriction(&self) -> bool {
        self.tag("type").is_some_and(|t| t.starts_with("restriction"))
    }

    /// True for `type=connectivity` and its variants.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        self.tag("type").is_some_and(|t| t.starts_with("connectivity"))
    }

    /// True when `from`, `via` and `to` roles are all present.
    #[must_use]
    pub fn has_from_via_to(&self) -> bool {
        ["from", "via", "to"]
            .iter()
            .all(|role| self.member_by_role(role).is_some())
    }

    /// True for a restriction with a usable member layout.
    ///
    /// One `from` way (several for `no_entry`), one `to` way (several for
    /// `no_exit`) and at least one `via`; several vias must all be ways.
    #[must_use]
    pub fn is_valid_restriction(&self) -> bool {
        if !self.is_restriction() {
            return false;
        }
        let restriction = self.tag("restriction");
        let froms = self.members_by_role("from");
        let vias = self.members_by_role("via");
        let tos = self.members_by_role("to");
        let all_ways = |members: &[(usize, &Member)]| {
            members.iter().all(|(_, m)| m.kind == EntityKind::Way)
        };
        if (froms.len() != 1 && restriction != Some("no_entry")) || !all_ways(&froms) {
            return false;
        }
        if (tos.len() != 1 && restriction != Some("no_exit")) || !all_ways(&tos) {
            return false;
        }
        !vias.is_empty() && (vias.len() == 1 || all_ways(&vias))
    }

    /// True when every member is present in `graph`.
    #[must_use]
    pub fn is_complete(&self, graph: &Graph) -> bool {
        self.members.iter().all(|m| graph.has_entity(&m.id).is_some())
    }

    /// True for a relation without members.
    #[must_use]
    pub const fn is_degenerate(&self) -> bool {
        self.members.is_empty()
    }

    /// [`Geometry::Area`] for multipolygons, [`Geometry::Relation`] otherwise.
    #[must_use]
    pub fn geometry(&self, graph: &Graph) -> Geometry {
        graph.cached(self, "geometry", || {
            if self.is_multipolygon() {
                Geometry::Area
            } else {
                Geometry::Relation
            }
        })
    }

    /// Union of the extents of members present in `graph`.
    #[must_use]
    pub fn extent(&self, graph: &Graph) -> Extent {
        graph.cached(self, "extent", || {
            let mut path = HashSet::new();
            self.extent_along(graph, &mut path)
        })
    }

    fn extent_along(&self, graph: &Graph, path: &mut HashSet<EntityId>) -> Extent {
        if !path.insert(self.id.clone()) {
            log::warn!("relation {} references itself; skipping the cycle", self.id);
            return Extent::empty();
        }
        let mut extent = Extent::empty();
        for member in &self.members {
            let Some(entity) = graph.has_entity(&member.id) else {
                continue;
            };
            let member_extent = entity.as_relation().map_or_else(
                || entity.extent(graph),
                |relation| relation.extent_along(graph, path),
            );
            extent = extent.extend(&member_extent);
        }
        path.remove(&self.id);
        extent
    }

    /// Outer and inner rings assembled from way members.
    ///
    /// Outer rings (role `outer` or empty) wind clockwise and inner rings
    /// counterclockwise. Each inner ring is attached to the first outer ring
    /// containing it, else the first one it touches; an unmatched inner
    /// becomes a polygon of its own. Unclosed chains are closed.
    #[must_use]
    pub fn multipolygon(&self, graph: &Graph) -> MultiPolygon<f64> {
        let (outer_members, inner_members): (Vec<Member>, Vec<Member>) = self
            .members
            .iter()
            .filter(|m| m.role.is_empty() || m.role == "outer" || m.role == "inner")
            .cloned()
            .partition(|m| m.role != "inner");

        let mut outers = rings(&outer_members, graph);
        for ring in &mut outers {
            if signed_area(ring) > 0.0 {
                ring.reverse();
            }
        }
        let mut inners = rings(&inner_members, graph);
        for ring in &mut inners {
            if signed_area(ring) < 0.0 {
                ring.reverse();
            }
        }

        let mut polygons: Vec<(Vec<Coord<f64>>, Vec<Vec<Coord<f64>>>)> =
            outers.iter().map(|o| (o.clone(), Vec::new())).collect();
        for inner in inners {
            let host = outers
                .iter()
                .position(|outer| polygon_contains_polygon(outer, &inner))
                .or_else(|| {
                    outers
                        .iter()
                        .position(|outer| polygon_intersects_polygon(outer, &inner))
                });
            match host.and_then(|i| polygons.get_mut(i)) {
                Some((_, holes)) => holes.push(inner),
                None => polygons.push((inner, Vec::new())),
            }
        }
        MultiPolygon::new(
            polygons
                .into_iter()
                .map(|(exterior, holes)| {
                    Polygon::new(
                        LineString::from(exterior),
                        holes.into_iter().map(LineString::from).collect(),
                    )
                })
                .collect(),
        )
    }

    /// Upload representation.
    #[must_use]
    pub fn as_jxon(&self, changeset: Option<&str>) -> Value {
        let member: Vec<Value> = self
            .members
            .iter()
            .map(|m| {
                json!({ "keyAttributes": {
                    "type": m.kind.as_str(),
                    "ref": m.id.osm_id(),
                    "role": m.role,
                } })
            })
            .collect();
        let mut body = json!({
            "@id": self.osm_id(),
            "@version": version_jxon(self.version.as_deref()),
            "member": member,
            "tag": tag_jxon(&self.tags),
        });
        if let (Some(changeset), Some(map)) = (changeset, body.as_object_mut()) {
            map.insert("@changeset".to_owned(), json!(changeset));
        }
        json!({ "relation": body })
    }
}

/// Join `members` into chains and resolve each to a closed coordinate ring.
fn rings(members: &[Member], graph: &Graph) -> Vec<Vec<Coord<f64>>> {
    join_ways(members, graph)
        .chains
        .into_iter()
        .map(|chain| {
            let mut nodes = chain.nodes;
            if nodes.len() > 2 && nodes.first() != nodes.last() {
                if let Some(first) = nodes.first().cloned() {
                    nodes.push(first);
                }
            }
            nodes
                .iter()
                .filter_map(|id| graph.has_entity(id))
                .filter_map(|entity| entity.as_node().map(|node| node.loc))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Node, Way};
    use crate::tags::tags_from;
    use rstest::rstest;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn ids(s: &str) -> Vec<EntityId> {
        s.chars().map(|ch| EntityId::new(&ch.to_string())).collect()
    }

    fn member_ids(relation: &Relation) -> Vec<&str> {
        relation.members.iter().map(|m| m.id.as_str()).collect()
    }

    #[rstest]
    #[case(None, &["1", "3", "2"])]
    #[case(Some(0), &["2", "1", "3"])]
    #[case(Some(1), &["1", "2", "3"])]
    #[case(Some(9), &["1", "3", "2"])]
    fn add_member(#[case] index: Option<usize>, #[case] expected: &[&str]) {
        let r = Relation::new("r", vec![Member::node("1", ""), Member::node("3", "")]);
        assert_eq!(member_ids(&r.add_member(Member::node("2", ""), index)), expected);
    }

    #[rstest]
    fn remove_and_move_members() {
        let r = Relation::new(
            "r",
            vec![Member::node("a", ""), Member::node("b", ""), Member::node("a", "")],
        );
        assert_eq!(member_ids(&r.remove_member(1)), ["a", "a"]);
        assert_eq!(member_ids(&r.remove_members_with_id(&"a".into())), ["b"]);
        assert_eq!(member_ids(&r.move_member(0, 2)), ["b", "a", "a"]);
    }

    #[rstest]
    fn replace_member_absent_needle() {
        let r = Relation::new("r", Vec::new());
        assert!(r.replace_member(&"a".into(), &"b".into(), EntityKind::Node, false).is_none());
    }

    #[rstest]
    fn replace_member_keeps_role_and_takes_kind() {
        let r = Relation::new("r", vec![Member::node("a", "a")]);
        let replaced = r
            .replace_member(&"a".into(), &"b".into(), EntityKind::Way, false)
            .unwrap();
        assert_eq!(replaced.members, vec![Member::way("b", "a")]);
    }

    #[rstest]
    #[case(false, 1)]
    #[case(true, 2)]
    fn replace_member_duplicates(#[case] keep: bool, #[case] expected: usize) {
        let r = Relation::new("r", vec![Member::node("a", "b"), Member::node("b", "b")]);
        let replaced = r
            .replace_member(&"a".into(), &"b".into(), EntityKind::Node, keep)
            .unwrap();
        assert_eq!(replaced.members.len(), expected);
        assert!(replaced.members.iter().all(|m| m == &Member::node("b", "b")));
    }

    fn restriction(kind: &str, members: Vec<Member>) -> Relation {
        Relation::new("r", members)
            .with_tags(tags_from([("type", "restriction"), ("restriction", kind)]))
    }

    #[rstest]
    #[case("no_left_turn", vec![Member::way("f", "from"), Member::node("v", "via"), Member::way("t", "to")], true)]
    #[case("no_left_turn", vec![Member::way("f1", "from"), Member::way("f2", "from"), Member::node("v", "via"), Member::way("t", "to")], false)]
    #[case("no_entry", vec![Member::way("f1", "from"), Member::way("f2", "from"), Member::node("v", "via"), Member::way("t", "to")], true)]
    #[case("no_left_turn", vec![Member::way("f", "from"), Member::node("v", "via"), Member::way("t1", "to"), Member::way("t2", "to")], false)]
    #[case("no_exit", vec![Member::way("f", "from"), Member::node("v", "via"), Member::way("t1", "to"), Member::way("t2", "to")], true)]
    #[case("no_left_turn", vec![Member::way("f", "from"), Member::node("v1", "via"), Member::way("v2", "via"), Member::way("t", "to")], false)]
    #[case("no_left_turn", vec![Member::way("f", "from"), Member::way("v1", "via"), Member::way("v2", "via"), Member::way("t", "to")], true)]
    #[case("no_left_turn", vec![Member::way("f", "from"), Member::way("t", "to")], false)]
    fn restriction_validity(
        #[case] kind: &str,
        #[case] members: Vec<Member>,
        #[case] valid: bool,
    ) {
        assert_eq!(restriction(kind, members).is_valid_restriction(), valid);
    }

    #[rstest]
    #[case("restriction", true)]
    #[case("restriction:bus", true)]
    #[case("route", false)]
    fn restriction_types(#[case] kind: &str, #[case] expected: bool) {
        let r = Relation::new("r", Vec::new()).with_tags(tags_from([("type", kind)]));
        assert_eq!(r.is_restriction(), expected);
    }

    #[rstest]
    fn from_via_to_needs_all_roles() {
        let full = Relation::new(
            "r",
            vec![Member::way("f", "from"), Member::node("v", "via"), Member::way("t", "to")],
        );
        assert!(full.has_from_via_to());
        assert!(!full.remove_member(1).has_from_via_to());
    }

    #[rstest]
    fn extent_covers_members_and_tolerates_gaps() {
        let a = Node::new("a", c(0.0, 0.0));
        let b = Node::new("b", c(5.0, 10.0));
        let r = Relation::new("r", vec![Member::node("a", ""), Member::node("b", "")]);
        let graph = Graph::new([a.clone().into(), b.into(), r.clone().into()]);
        assert_eq!(r.extent(&graph), Extent::new(c(0.0, 0.0), c(5.0, 10.0)));

        let partial = Graph::new([a.into(), r.clone().into()]);
        assert_eq!(r.extent(&partial), Extent::from_point(c(0.0, 0.0)));
        assert!(!r.is_complete(&partial));
    }

    #[rstest]
    fn extent_of_self_referencing_relation_is_empty() {
        let r = Relation::new("r1", vec![Member::new("r1", EntityKind::Relation, "")]);
        let graph = Graph::new([r.clone().into()]);
        assert!(r.extent(&graph).is_empty());
    }

    #[rstest]
    fn extent_through_mutual_references() {
        let n = Node::new("n", c(1.0, 1.0));
        let r1 = Relation::new(
            "r1",
            vec![Member::new("r2", EntityKind::Relation, ""), Member::node("n", "")],
        );
        let r2 = Relation::new("r2", vec![Member::new("r1", EntityKind::Relation, "")]);
        let graph = Graph::new([n.into(), r1.clone().into(), r2.into()]);
        assert_eq!(r1.extent(&graph), Extent::from_point(c(1.0, 1.0)));
    }

    fn triangle_graph(extra: Vec<crate::Entity>) -> Graph {
        let mut entities: Vec<crate::Entity> = vec![
            Node::new("a", c(0.0, 0.0)).into(),
            Node::new("b", c(0.0, 1.0)).into(),
            Node::new("c", c(1.0, 0.0)).into(),
            Node::new("d", c(0.1, 0.1)).into(),
            Node::new("e", c(0.2, 0.1)).into(),
            Node::new("f", c(0.1, 0.2)).into(),
        ];
        entities.extend(extra);
        Graph::new(entities)
    }

    fn exterior(polygon: &Polygon<f64>) -> Vec<Coord<f64>> {
        polygon.exterior().coords().copied().collect()
    }

    #[rstest]
    fn multipolygon_outer_winds_clockwise() {
        let r = Relation::new("r", vec![Member::way("w", "")]);
        let graph = triangle_graph(vec![Way::new("w", ids("acba")).into(), r.clone().into()]);
        let mp = r.multipolygon(&graph);
        assert_eq!(mp.0.len(), 1);
        assert_eq!(
            exterior(&mp.0[0]),
            vec![c(0.0, 0.0), c(0.0, 1.0), c(1.0, 0.0), c(0.0, 0.0)]
        );
    }

    #[rstest]
    fn multipolygon_joins_split_outer() {
        let r = Relation::new("r", vec![Member::way("w1", ""), Member::way("w2", "outer")]);
        let graph = triangle_graph(vec![
            Way::new("w1", ids("ab")).into(),
            Way::new("w2", ids("acb")).into(),
            r.clone().into(),
        ]);
        let mp = r.multipolygon(&graph);
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].exterior().coords().count(), 4);
    }

    #[rstest]
    fn multipolygon_assigns_inner_to_containing_outer() {
        let r = Relation::new("r", vec![Member::way("outer", ""), Member::way("inner", "inner")]);
        let graph = triangle_graph(vec![
            Way::new("outer", ids("abca")).into(),
            Way::new("inner", ids("dfed")).into(),
            r.clone().into(),
        ]);
        let mp = r.multipolygon(&graph);
        assert_eq!(mp.0.len(), 1);
        let holes = mp.0[0].interiors();
        assert_eq!(holes.len(), 1);
        let hole: Vec<Coord<f64>> = holes[0].coords().copied().collect();
        assert_eq!(hole, vec![c(0.1, 0.1), c(0.2, 0.1), c(0.1, 0.2), c(0.1, 0.1)]);
    }

    #[rstest]
    fn multipolygon_unmatched_inner_stands_alone() {
        let r = Relation::new("r", vec![Member::way("w", "inner")]);
        let graph = triangle_graph(vec![Way::new("w", ids("abca")).into(), r.clone().into()]);
        let mp = r.multipolygon(&graph);
        assert_eq!(mp.0.len(), 1);
        assert!(mp.0[0].interiors().is_empty());
    }

    #[rstest]
    fn jxon_lists_members() {
        let r = Relation::new("r-1", vec![Member::way("w1", "forward")])
            .with_tags(tags_from([("type", "route")]));
        let jxon = r.as_jxon(None);
        assert_eq!(jxon["relation"]["@id"], "-1");
        assert_eq!(
            jxon["relation"]["member"][0]["keyAttributes"],
            json!({ "type": "way", "ref": "1", "role": "forward" })
        );
        assert_eq!(Relation::new("r1", Vec::new()).as_jxon(Some("12"))["relation"]["@changeset"], "12");
    }
}
