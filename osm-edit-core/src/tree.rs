//! Spatial index over entity extents.
//!
//! The [`Tree`] follows a stream of graphs. Each query brings the index up
//! to date with the graph it is given by diffing against the previous one,
//! so only moved entities and their ancestors are re-indexed.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use rstar::{AABB, RTree, RTreeObject};

use crate::difference::Difference;
use crate::entity::{Entity, OsmEntity, Segment};
use crate::extent::Extent;
use crate::graph::Graph;
use crate::id::EntityId;

type Envelope = AABB<[f64; 2]>;

#[derive(Debug, Clone, PartialEq)]
struct EntityBox {
    id: EntityId,
    envelope: Envelope,
}

impl RTreeObject for EntityBox {
    type Envelope = Envelope;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SegmentBox {
    segment: Segment,
    envelope: Envelope,
}

impl RTreeObject for SegmentBox {
    type Envelope = Envelope;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Incrementally maintained R*-tree of entity and way-segment boxes.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osm_edit_core::{Extent, Graph, Node};
/// use osm_edit_core::tree::Tree;
///
/// let graph = Graph::default();
/// let mut tree = Tree::new(&graph);
/// let graph = graph.replace(Node::new("n1", Coord { x: 1.0, y: 1.0 }));
/// let hits = tree.intersects(
///     &Extent::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 2.0 }),
///     &graph,
/// );
/// assert_eq!(hits.len(), 1);
/// ```
#[derive(Debug)]
pub struct Tree {
    current: Graph,
    entities: RTree<EntityBox>,
    /// `None` marks entities tracked without a resolvable extent yet.
    entity_boxes: HashMap<EntityId, Option<EntityBox>>,
    segments: RTree<SegmentBox>,
    entity_segments: HashMap<EntityId, Vec<SegmentBox>>,
}

impl Tree {
    /// An empty index tracking `graph`.
    #[must_use]
    pub fn new(graph: &Graph) -> Self {
        Self {
            current: graph.clone(),
            entities: RTree::new(),
            entity_boxes: HashMap::new(),
            segments: RTree::new(),
            entity_segments: HashMap::new(),
        }
    }

    /// Number of entities tracked, including those without an extent.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entity_boxes.len()
    }

    /// True if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_boxes.is_empty()
    }

    fn remove_entity(&mut self, id: &EntityId) {
        if let Some(Some(entity_box)) = self.entity_boxes.remove(id) {
            self.entities.remove(&entity_box);
        }
        for segment_box in self.entity_segments.remove(id).unwrap_or_default() {
            self.segments.remove(&segment_box);
        }
    }

    fn load_entities(&mut self, to_update: IndexMap<EntityId, Entity>) {
        for (id, entity) in to_update {
            let envelope = entity.extent(&self.current).to_aabb();
            let Some(envelope) = envelope else {
                log::debug!("tree defers {id}: children not yet resolvable");
                self.entity_boxes.insert(id, None);
                continue;
            };
            let entity_box = EntityBox {
                id: id.clone(),
                envelope,
            };
            self.entities.insert(entity_box.clone());
            self.entity_boxes.insert(id.clone(), Some(entity_box));

            let Some(way) = entity.as_way() else {
                continue;
            };
            let boxes: Vec<SegmentBox> = way
                .segments(&self.current)
                .into_iter()
                .filter_map(|segment| self.segment_box(segment))
                .collect();
            for segment_box in &boxes {
                self.segments.insert(segment_box.clone());
            }
            self.entity_segments.insert(id, boxes);
        }
    }

    fn segment_box(&self, segment: Segment) -> Option<SegmentBox> {
        let [a, b] = &segment.nodes;
        let a = self.current.node(a).ok()?;
        let b = self.current.node(b).ok()?;
        let envelope = Extent::new(a.loc, b.loc).to_aabb()?;
        Some(SegmentBox { segment, envelope })
    }

    /// Queue tracked ancestors of `entity` for re-indexing.
    fn include_parents(&mut self, entity: &EntityId, to_update: &mut IndexMap<EntityId, Entity>) {
        let mut seen: HashSet<EntityId> = HashSet::new();
        let mut stack = vec![entity.clone()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let parents = self
                .current
                .parent_ways(&id)
                .into_iter()
                .map(Entity::Way)
                .chain(
                    self.current
                        .parent_relations(&id)
                        .into_iter()
                        .map(Entity::Relation),
                );
            let parents: Vec<Entity> = parents.collect();
            for parent in parents {
                let parent_id = parent.id().clone();
                if self.entity_boxes.contains_key(&parent_id) {
                    self.remove_entity(&parent_id);
                    to_update.insert(parent_id.clone(), parent);
                }
                stack.push(parent_id);
            }
        }
    }

    fn set_current_graph(&mut self, graph: &Graph) {
        if graph.ptr_eq(&self.current) {
            return;
        }
        let diff = Difference::new(&self.current, graph);
        self.current = graph.clone();
        let changed = diff.did_change();
        if !changed.addition && !changed.deletion && !changed.geometry {
            return;
        }

        let mut to_update: IndexMap<EntityId, Entity> = IndexMap::new();
        if changed.deletion {
            for entity in diff.deleted() {
                self.remove_entity(entity.id());
            }
        }
        if changed.geometry {
            for entity in diff.modified() {
                let id = entity.id().clone();
                self.remove_entity(&id);
                to_update.insert(id.clone(), entity);
                self.include_parents(&id, &mut to_update);
            }
        }
        if changed.addition {
            for entity in diff.created() {
                to_update.insert(entity.id().clone(), entity);
            }
        }
        self.load_entities(to_update);
    }

    /// Fold freshly loaded `entities` into the index without changing the
    /// current graph.
    ///
    /// Invisible entities and entities modified or deleted in the current
    /// graph are skipped, even when forced. Entities already tracked are kept unless `force` is set.
    /// Tracked ancestors are re-indexed, which is how a way or relation
    /// picks up an extent once its missing children arrive.
    pub fn rebase(&mut self, entities: &[Entity], force: bool) {
        let mut to_update: IndexMap<EntityId, Entity> = IndexMap::new();
        for entity in entities {
            let id = entity.id();
            if !entity.is_visible() || self.current.is_locally_edited(id) {
                continue;
            }
            if self.entity_boxes.contains_key(id) && !force {
                continue;
            }
            self.remove_entity(id);
            to_update.insert(id.clone(), entity.clone());
            self.include_parents(id, &mut to_update);
        }
        self.load_entities(to_update);
    }

    /// Entities of `graph` whose extent meets `extent`.
    ///
    /// Results are ordered nodes, ways, relations, then by id.
    pub fn intersects(&mut self, extent: &Extent, graph: &Graph) -> Vec<Entity> {
        self.set_current_graph(graph);
        let Some(query) = extent.to_aabb() else {
            return Vec::new();
        };
        let mut hits: Vec<Entity> = self
            .entities
            .locate_in_envelope_intersecting(&query)
            .filter_map(|entity_box| graph.has_entity(&entity_box.id))
            .collect();
        hits.sort_by(|a, b| {
            a.kind()
                .rank()
                .cmp(&b.kind().rank())
                .then_with(|| a.id().as_str().cmp(b.id().as_str()))
        });
        hits
    }

    /// Way segments of `graph` whose box meets `extent`, ordered by id.
    pub fn way_segments(&mut self, extent: &Extent, graph: &Graph) -> Vec<Segment> {
        self.set_current_graph(graph);
        let Some(query) = extent.to_aabb() else {
            return Vec::new();
        };
        let mut hits: Vec<Segment> = self
            .segments
            .locate_in_envelope_intersecting(&query)
            .map(|segment_box| segment_box.segment.clone())
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Member, Node, Relation, Way};
    use crate::id::EntityKind;
    use geo::Coord;
    use rstest::{fixture, rstest};

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn node(id: &str, x: f64, y: f64) -> Node {
        Node::new(id, c(x, y))
    }

    fn extent(min: f64, max: f64) -> Extent {
        Extent::new(c(min, min), c(max, max))
    }

    fn ids(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(|e| e.id().as_str()).collect()
    }

    #[fixture]
    fn empty() -> (Graph, Tree) {
        let graph = Graph::default();
        let tree = Tree::new(&graph);
        (graph, tree)
    }

    #[rstest]
    fn rebase_adds_entities_idempotently(empty: (Graph, Tree)) {
        let (mut graph, mut tree) = empty;
        let n: Entity = node("n", 1.0, 1.0).into();
        for _ in 0..2 {
            graph.rebase(std::slice::from_ref(&n), &mut [], false);
            tree.rebase(std::slice::from_ref(&n), false);
            assert_eq!(ids(&tree.intersects(&extent(0.0, 2.0), &graph)), ["n"]);
        }
        assert_eq!(tree.len(), 1);
    }

    #[rstest]
    fn rebase_keeps_locally_modified_version(empty: (Graph, Tree)) {
        let (mut g1, mut tree) = empty;
        let n1 = node("n", 1.0, 1.0);
        let g2 = g1.replace(n1.move_to(c(10.0, 10.0)));
        assert_eq!(ids(&tree.intersects(&extent(9.0, 11.0), &g2)), ["n"]);

        g1.rebase(&[n1.clone().into()], &mut [], false);
        tree.rebase(&[n1.into()], false);
        assert!(tree.intersects(&extent(0.0, 2.0), &g2).is_empty());
        assert_eq!(ids(&tree.intersects(&extent(0.0, 11.0), &g2)), ["n"]);
    }

    #[rstest]
    fn forced_rebase_keeps_locally_modified_version(empty: (Graph, Tree)) {
        let (mut g1, mut tree) = empty;
        let n1 = node("n", 1.0, 1.0);
        g1.rebase(&[n1.clone().into()], &mut [], false);
        let g2 = g1.replace(n1.move_to(c(10.0, 10.0)));
        assert_eq!(ids(&tree.intersects(&extent(9.0, 11.0), &g2)), ["n"]);

        let remote: Entity = n1.move_to(c(-1.0, -1.0)).into();
        g1.rebase(std::slice::from_ref(&remote), &mut [], true);
        tree.rebase(&[remote], true);
        assert!(tree.intersects(&extent(-2.0, 0.0), &g2).is_empty());
        assert_eq!(ids(&tree.intersects(&extent(9.0, 11.0), &g2)), ["n"]);
    }

    #[rstest]
    fn rebase_handles_self_referencing_relation(empty: (Graph, Tree)) {
        let (mut graph, mut tree) = empty;
        let relation: Entity = Relation::new(
            "r",
            vec![Member::node("n", ""), Member::new("r", EntityKind::Relation, "")],
        )
        .into();
        graph.rebase(&[node("n", 1.0, 1.0).into(), relation.clone()], &mut [], false);
        tree.rebase(&[relation], false);
        assert_eq!(ids(&tree.intersects(&extent(0.0, 2.0), &graph)), ["r"]);
    }

    #[rstest]
    fn forced_rebase_moves_entities(empty: (Graph, Tree)) {
        let (mut graph, mut tree) = empty;
        let n = node("n", 1.0, 1.0);
        graph.rebase(&[n.clone().into()], &mut [], false);
        tree.rebase(&[n.clone().into()], false);

        let moved: Entity = n.move_to(c(-1.0, -1.0)).into();
        graph.rebase(std::slice::from_ref(&moved), &mut [], true);
        tree.rebase(&[moved], true);
        assert!(tree.intersects(&extent(0.0, 2.0), &graph).is_empty());
    }

    #[rstest]
    fn intersects_filters_by_extent(empty: (Graph, Tree)) {
        let (graph, mut tree) = empty;
        let graph = graph.replace(node("a", 1.0, 1.0)).replace(node("b", 3.0, 3.0));
        assert_eq!(ids(&tree.intersects(&extent(0.0, 2.0), &graph)), ["a"]);
    }

    #[rstest]
    fn relation_grows_when_members_arrive(empty: (Graph, Tree)) {
        let (mut graph, mut tree) = empty;
        let relation: Entity =
            Relation::new("r", vec![Member::node("n1", ""), Member::node("n2", "")]).into();
        let n1: Entity = node("n1", 0.0, 0.0).into();
        let n2: Entity = node("n2", 1.0, 1.0).into();
        let query = extent(0.5, 1.5);

        graph.rebase(&[relation.clone(), n1.clone()], &mut [], false);
        tree.rebase(&[relation, n1], false);
        assert!(tree.intersects(&query, &graph).is_empty());

        graph.rebase(std::slice::from_ref(&n2), &mut [], false);
        tree.rebase(&[n2], false);
        assert_eq!(ids(&tree.intersects(&query, &graph)), ["n2", "r"]);
    }

    #[rstest]
    fn way_found_once_missing_nodes_load(empty: (Graph, Tree)) {
        let (mut base, mut tree) = empty;
        let graph = base.replace(Way::new("w", vec!["n".into()]));
        let query = extent(0.0, 1.0);
        assert!(tree.intersects(&query, &graph).is_empty());

        let n: Entity = node("n", 0.5, 0.5).into();
        base.rebase(std::slice::from_ref(&n), &mut [graph.clone()], false);
        tree.rebase(&[n], false);
        assert_eq!(ids(&tree.intersects(&query, &graph)), ["n", "w"]);
    }

    #[rstest]
    #[case::way(false)]
    #[case::relation_of_way(true)]
    fn ancestors_follow_moved_node(empty: (Graph, Tree), #[case] with_relation: bool) {
        let (graph, mut tree) = empty;
        let n = node("n", 1.0, 1.0);
        let mut graph = graph
            .replace(n.clone())
            .replace(Way::new("w", vec!["n".into()]));
        let mut expected = vec!["n", "w"];
        if with_relation {
            graph = graph.replace(Relation::new("r", vec![Member::way("w", "outer")]));
            expected.push("r");
        }
        assert_eq!(ids(&tree.intersects(&extent(0.0, 2.0), &graph)), expected);

        let graph = graph.replace(n.move_to(c(3.0, 3.0)));
        assert!(tree.intersects(&extent(0.0, 2.0), &graph).is_empty());
    }

    #[rstest]
    fn relation_follows_moved_member_node(empty: (Graph, Tree)) {
        let (graph, mut tree) = empty;
        let n = node("n", 1.0, 1.0);
        let graph = graph
            .replace(n.clone())
            .replace(Relation::new("r", vec![Member::node("n", "")]));
        assert_eq!(ids(&tree.intersects(&extent(0.0, 2.0), &graph)), ["n", "r"]);
        let graph = graph.replace(n.move_to(c(3.0, 3.0)));
        assert!(tree.intersects(&extent(0.0, 2.0), &graph).is_empty());
    }

    #[rstest]
    fn way_shrinks_when_node_removed(empty: (Graph, Tree)) {
        let (graph, mut tree) = empty;
        let way = Way::new("w", vec!["n1".into(), "n2".into()]);
        let graph = graph
            .replace(node("n1", 1.0, 1.0))
            .replace(node("n2", 3.0, 3.0))
            .replace(way.clone());
        assert_eq!(ids(&tree.intersects(&extent(0.0, 2.0), &graph)), ["n1", "w"]);
        let graph = graph.replace(way.remove_node(&"n1".into()));
        assert_eq!(ids(&tree.intersects(&extent(0.0, 2.0), &graph)), ["n1"]);
    }

    #[rstest]
    fn parent_listed_once_when_several_children_move(empty: (Graph, Tree)) {
        let (graph, mut tree) = empty;
        let (n1, n2) = (node("n1", 1.0, 1.0), node("n2", 3.0, 3.0));
        let graph = graph
            .replace(n1.clone())
            .replace(n2.clone())
            .replace(Way::new("w1", vec!["n1".into(), "n2".into()]));
        assert_eq!(ids(&tree.intersects(&extent(0.0, 4.0), &graph)), ["n1", "n2", "w1"]);
        let graph = graph
            .replace(n1.move_to(c(1.1, 1.1)))
            .replace(n2.move_to(c(2.1, 2.1)));
        assert_eq!(ids(&tree.intersects(&extent(0.0, 4.0), &graph)), ["n1", "n2", "w1"]);
    }

    #[rstest]
    fn removed_entities_are_excluded(empty: (Graph, Tree)) {
        let (base, mut tree) = empty;
        let graph = base.replace(node("n", 1.0, 1.0));
        assert_eq!(ids(&tree.intersects(&extent(0.0, 2.0), &graph)), ["n"]);
        let graph = graph.remove(&"n".into());
        assert!(tree.intersects(&extent(0.0, 2.0), &graph).is_empty());
    }

    #[rstest]
    fn removed_entities_stay_out_after_rebase(empty: (Graph, Tree)) {
        let (mut base, mut tree) = empty;
        let n: Entity = node("n", 1.0, 1.0).into();
        let graph = base.replace(n.clone()).remove(&"n".into());
        assert!(tree.intersects(&extent(0.0, 2.0), &graph).is_empty());
        base.rebase(std::slice::from_ref(&n), &mut [graph.clone()], false);
        tree.rebase(&[n], false);
        assert!(tree.intersects(&extent(0.0, 2.0), &graph).is_empty());
    }

    #[rstest]
    fn nested_relations_resolve_after_rebase(empty: (Graph, Tree)) {
        let (mut base, mut tree) = empty;
        let graph = base
            .replace(Relation::new("r1", vec![Member::node("n", "")]))
            .replace(Relation::new(
                "r2",
                vec![Member::new("r1", EntityKind::Relation, "")],
            ));
        assert!(tree.intersects(&extent(0.0, 2.0), &graph).is_empty());

        let n: Entity = node("n", 1.0, 1.0).into();
        base.rebase(std::slice::from_ref(&n), &mut [graph.clone()], false);
        tree.rebase(&[n], false);
        assert_eq!(ids(&tree.intersects(&extent(0.0, 2.0), &graph)), ["n", "r1", "r2"]);
    }

    #[rstest]
    fn way_segments_are_indexed(empty: (Graph, Tree)) {
        let (graph, mut tree) = empty;
        let graph = graph
            .replace(node("a", 0.0, 0.0))
            .replace(node("b", 1.0, 0.0))
            .replace(node("c", 5.0, 0.0))
            .replace(Way::new("w", vec!["a".into(), "b".into(), "c".into()]));
        let hits = tree.way_segments(&Extent::new(c(-0.5, -0.5), c(0.5, 0.5)), &graph);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }
}
