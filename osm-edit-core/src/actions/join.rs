//! Join a run of connected lines into one way.

use std::rc::Rc;

use crate::entity::{Geometry, Way};
use crate::error::{ActionError, DisabledReason};
use crate::geom::path_intersections;
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind, oldest_id};
use crate::join_ways::{JoinedChain, join_way_entities};
use crate::tags::{Tags, is_interesting_key, merge_tags};

use super::Action;
use super::delete::{delete_relation, delete_way};

/// Join lines end to end.
///
/// Sided ways are joined first so their direction wins. The survivor is the
/// oldest existing way; the others are deleted and their relation
/// memberships and tags moved onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    way_ids: Vec<EntityId>,
}

impl Join {
    /// Join the listed ways.
    #[must_use]
    pub const fn new(way_ids: Vec<EntityId>) -> Self {
        Self { way_ids }
    }

    fn ways(&self, graph: &Graph) -> Result<Vec<Rc<Way>>, ActionError> {
        let mut ways = self
            .way_ids
            .iter()
            .map(|id| graph.way(id))
            .collect::<Result<Vec<_>, _>>()?;
        // Stable: sided ways first, others keep their order.
        ways.sort_by_key(|way| !way.is_sided());
        Ok(ways)
    }

    /// The first chain and the number of chains found.
    fn chain(&self, graph: &Graph) -> Result<(Option<JoinedChain>, usize), ActionError> {
        let joined = join_way_entities(&self.ways(graph)?, graph);
        let count = joined.chains.len();
        Ok((joined.chains.into_iter().next(), count))
    }

    fn non_turn_relations(graph: &Graph, id: &EntityId) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = graph
            .parent_relations(id)
            .iter()
            .filter(|r| !r.is_restriction() && !r.is_connectivity())
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn paths_intersect(&self, graph: &Graph, chain: &JoinedChain) -> bool {
        let Ok(joined_locs) = chain
            .nodes
            .iter()
            .map(|id| graph.node(id).map(|n| n.loc))
            .collect::<Result<Vec<_>, _>>()
        else {
            return true;
        };
        let paths: Vec<Vec<_>> = self
            .way_ids
            .iter()
            .filter_map(|id| graph.way(id).ok())
            .map(|way| way.locs(graph))
            .collect();
        for (i, a) in paths.iter().enumerate() {
            for b in &paths[i + 1..] {
                let crossings = path_intersections(a, b);
                if crossings.iter().any(|hit| !joined_locs.contains(hit)) {
                    return true;
                }
            }
        }
        false
    }

    /// Turn a closed survivor that is the only member of a multipolygon
    /// into a plain area, when the tags agree.
    fn collapse_multipolygon(graph: Graph, survivor_id: &EntityId) -> Result<Graph, ActionError> {
        let survivor = graph.way(survivor_id)?;
        if !survivor.is_closed() {
            return Ok(graph);
        }
        let sole: Vec<_> = graph
            .parent_multipolygons(survivor_id)
            .into_iter()
            .filter(|r| r.members.len() == 1)
            .collect();
        let [multipolygon] = sole.as_slice() else {
            return Ok(graph);
        };
        let conflicts = survivor.tags.iter().any(|(key, value)| {
            multipolygon
                .tags
                .get(key)
                .is_some_and(|theirs| !theirs.is_empty() && theirs != value)
        });
        if conflicts {
            return Ok(graph);
        }

        let merged = merge_tags(&survivor.tags, &multipolygon.tags).unwrap_or_else(|| survivor.tags.clone());
        let graph = delete_relation(graph, &multipolygon.id, true)?;
        let mut tags: Tags = merged.clone();
        let as_area = Way::clone(&survivor).with_tags(merged);
        if !as_area.is_area() {
            tags.insert("area".to_owned(), "yes".to_owned());
        }
        tags.remove("type");
        Ok(graph.replace(as_area.with_tags(tags)))
    }
}

impl Action for Join {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let ways = self.ways(graph)?;
        let ids: Vec<EntityId> = ways.iter().map(|w| w.id.clone()).collect();
        let survivor_id = oldest_id(&ids)
            .cloned()
            .ok_or(ActionError::Disabled(DisabledReason::NotEligible))?;

        let joined = join_way_entities(&ways, graph);
        let mut graph = graph.clone();
        for reverse in &joined.actions {
            graph = reverse.apply(&graph)?;
        }
        let Some(chain) = joined.chains.into_iter().next() else {
            return Ok(graph);
        };

        let mut survivor = Way::clone(&*graph.way(&survivor_id)?).with_nodes(chain.nodes.clone());
        graph = graph.replace(survivor.clone());

        for item in &chain.items {
            let id = &item.way.id;
            if *id == survivor_id {
                continue;
            }
            for parent in graph.parent_relations(id) {
                if let Some(updated) = parent.replace_member(id, &survivor_id, EntityKind::Way, false) {
                    graph = graph.replace(updated);
                }
            }
            if let Some(tags) = merge_tags(&survivor.tags, &item.way.tags) {
                survivor = survivor.with_tags(tags);
            }
            graph = delete_way(graph, id)?;
        }
        graph = graph.replace(survivor);

        Self::collapse_multipolygon(graph, &survivor_id)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let lines = self
            .way_ids
            .iter()
            .filter(|id| {
                graph
                    .has_entity(id)
                    .is_some_and(|e| e.geometry(graph) == Geometry::Line)
            })
            .count();
        if self.way_ids.len() < 2 || lines != self.way_ids.len() {
            return Some(DisabledReason::NotEligible);
        }

        let Ok((Some(chain), count)) = self.chain(graph) else {
            return Some(DisabledReason::NotEligible);
        };
        if count > 1 {
            return Some(DisabledReason::NotAdjacent);
        }

        let first = Self::non_turn_relations(graph, &self.way_ids[0]);
        if self.way_ids[1..]
            .iter()
            .any(|id| Self::non_turn_relations(graph, id) != first)
        {
            return Some(DisabledReason::ConflictingRelations);
        }

        if self.paths_intersect(graph, &chain) {
            return Some(DisabledReason::PathsIntersect);
        }

        let interior = chain
            .nodes
            .get(1..chain.nodes.len().saturating_sub(1))
            .unwrap_or_default();
        let mut tags = Tags::new();
        let mut conflicting = false;
        for item in &chain.items {
            for parent in graph.parent_relations(&item.way.id) {
                let turn = parent.is_restriction() || parent.is_connectivity();
                if turn && parent.members.iter().any(|m| interior.contains(&m.id)) {
                    return Some(if parent.is_restriction() {
                        DisabledReason::Restriction
                    } else {
                        DisabledReason::Connectivity
                    });
                }
            }
            for (key, value) in &item.way.tags {
                match tags.get(key) {
                    None => {
                        tags.insert(key.clone(), value.clone());
                    }
                    Some(existing) => {
                        if !existing.is_empty() && is_interesting_key(key) && existing != value {
                            conflicting = true;
                        }
                    }
                }
            }
        }
        conflicting.then_some(DisabledReason::ConflictingTags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Member, Node, Relation};
    use crate::tags::tags_from;
    use geo::Coord;
    use rstest::rstest;

    fn n(id: &str, x: f64, y: f64) -> Entity {
        Node::new(id, Coord { x, y }).into()
    }

    fn w(id: &str, nodes: &[&str]) -> Way {
        Way::new(id, ids(nodes))
    }

    fn ids(values: &[&str]) -> Vec<EntityId> {
        values.iter().map(|v| EntityId::new(v)).collect()
    }

    fn line(extra: Vec<Entity>) -> Graph {
        let mut entities = vec![n("a", 0.0, 0.0), n("b", 2.0, 0.0), n("c", 4.0, 0.0), n("d", 2.0, 2.0)];
        entities.extend(extra);
        Graph::new(entities)
    }

    fn join(list: &[&str]) -> Join {
        Join::new(ids(list))
    }

    #[rstest]
    #[case::end_start(&["a", "b"], &["b", "c"])]
    #[case::start_end(&["b", "a"], &["c", "b"])]
    #[case::start_start(&["b", "a"], &["b", "c"])]
    #[case::end_end(&["a", "b"], &["c", "b"])]
    fn shared_endpoints_are_joinable(#[case] first: &[&str], #[case] second: &[&str]) {
        let graph = line(vec![w("-", first).into(), w("=", second).into()]);
        assert_eq!(join(&["-", "="]).disabled(&graph), None);
    }

    #[rstest]
    fn order_of_ids_does_not_matter() {
        let mut graph = line(vec![
            w("-", &["a", "b"]).into(),
            w("=", &["b", "c"]).into(),
        ]);
        graph = graph.replace(Node::new("e", Coord { x: 6.0, y: 0.0 }));
        graph = graph.replace(w("~", &["c", "e"]));
        for order in [
            ["-", "=", "~"],
            ["-", "~", "="],
            ["=", "-", "~"],
            ["=", "~", "-"],
            ["~", "=", "-"],
            ["~", "-", "="],
        ] {
            assert_eq!(join(&order).disabled(&graph), None, "{order:?}");
        }
    }

    #[rstest]
    fn nodes_are_not_eligible() {
        assert_eq!(join(&["a"]).disabled(&line(vec![])), Some(DisabledReason::NotEligible));
    }

    #[rstest]
    fn joining_mid_way_is_not_adjacent() {
        let graph = line(vec![w("-", &["a", "b", "c"]).into(), w("=", &["b", "d"]).into()]);
        assert_eq!(join(&["-", "="]).disabled(&graph), Some(DisabledReason::NotAdjacent));
    }

    fn turn(kind: &str, from: &str, to: &str, via: &str) -> Entity {
        Relation::new(
            "r",
            vec![Member::way(from, "from"), Member::way(to, "to"), Member::node(via, "via")],
        )
        .with_tags(tags_from([("type", kind)]))
        .into()
    }

    #[rstest]
    #[case::restriction_through_joint("restriction", "-", "=", "b", Some(DisabledReason::Restriction))]
    #[case::restriction_to_branch("restriction", "-", "|", "b", Some(DisabledReason::Restriction))]
    #[case::restriction_elsewhere("restriction", "-", "|", "a", None)]
    #[case::connectivity_through_joint("connectivity", "-", "=", "b", Some(DisabledReason::Connectivity))]
    #[case::connectivity_elsewhere("connectivity", "-", "|", "a", None)]
    fn turn_relations_guard_joints(
        #[case] kind: &str,
        #[case] from: &str,
        #[case] to: &str,
        #[case] via: &str,
        #[case] expected: Option<DisabledReason>,
    ) {
        let branch = if via == "a" { w("|", &["a", "d"]) } else { w("|", &["b", "d"]) };
        let graph = line(vec![
            w("-", &["a", "b"]).into(),
            w("=", &["b", "c"]).into(),
            branch.into(),
            turn(kind, from, to, via),
        ]);
        assert_eq!(join(&["-", "="]).disabled(&graph), expected);
    }

    #[rstest]
    fn turn_relation_on_other_ways_is_ignored() {
        let graph = line(vec![
            n("e", 3.0, 2.0),
            w("-", &["a", "b"]).into(),
            w("=", &["b", "c"]).into(),
            w("|", &["d", "b"]).into(),
            w("\\", &["b", "e"]).into(),
            turn("restriction", "|", "\\", "b"),
        ]);
        assert_eq!(join(&["-", "="]).disabled(&graph), None);
    }

    #[rstest]
    #[case::extended(vec![Member::way("-", "")], &["-", "="])]
    #[case::forked(vec![Member::way("-", ""), Member::way("=", "")], &["-", "|"])]
    fn relation_membership_must_match(#[case] members: Vec<Member>, #[case] joining: &[&str]) {
        let graph = line(vec![
            w("-", &["a", "b"]).into(),
            w("=", &["b", "c"]).into(),
            w("|", &["b", "d"]).into(),
            Relation::new("r", members).into(),
        ]);
        assert_eq!(join(joining).disabled(&graph), Some(DisabledReason::ConflictingRelations));
    }

    #[rstest]
    fn shared_relations_in_any_order_are_fine() {
        let graph = line(vec![
            w("-", &["a", "b"]).into(),
            w("=", &["b", "c"]).into(),
            Relation::new("r1", vec![Member::way("-", ""), Member::way("=", "")]).into(),
            Relation::new("r2", vec![Member::way("=", ""), Member::way("-", "")]).into(),
        ]);
        assert_eq!(join(&["-", "="]).disabled(&graph), None);
    }

    #[rstest]
    fn self_crossing_result_is_refused() {
        let graph = Graph::new([
            n("a", 0.0, 0.0),
            n("b", 0.0, 10.0),
            n("c", 5.0, 5.0),
            n("d", -5.0, 5.0),
            w("-", &["a", "b", "c"]).into(),
            w("=", &["c", "d"]).into(),
        ]);
        assert_eq!(join(&["-", "="]).disabled(&graph), Some(DisabledReason::PathsIntersect));
    }

    #[rstest]
    #[case::conflict(&[("highway", "primary")], &[("highway", "secondary")], Some(DisabledReason::ConflictingTags))]
    #[case::missing(&[("highway", "primary")], &[], None)]
    #[case::uninteresting(&[("tiger:cfcc", "A41")], &[("tiger:cfcc", "A42")], None)]
    fn tag_conflicts(
        #[case] first: &[(&str, &str)],
        #[case] second: &[(&str, &str)],
        #[case] expected: Option<DisabledReason>,
    ) {
        let graph = line(vec![
            w("-", &["a", "b"]).with_tags(tags_from(first.iter().copied())).into(),
            w("=", &["b", "c"]).with_tags(tags_from(second.iter().copied())).into(),
        ]);
        assert_eq!(join(&["-", "="]).disabled(&graph), expected);
    }

    #[rstest]
    fn reversed_tags_are_compared_after_reversal() {
        let graph = line(vec![
            w("-", &["a", "b"]).with_tags(tags_from([("oneway", "yes")])).into(),
            w("=", &["c", "b"]).with_tags(tags_from([("oneway", "-1")])).into(),
        ]);
        assert_eq!(join(&["-", "="]).disabled(&graph), None);
    }

    fn nodes_of(graph: &Graph, id: &str) -> Vec<EntityId> {
        graph.way(&id.into()).unwrap().nodes.clone()
    }

    fn tags_of(graph: &Graph, id: &str) -> Tags {
        graph.way(&id.into()).unwrap().tags.clone()
    }

    #[rstest]
    #[case::forward(&["a", "b"], &["b", "c"], &[], &["a", "b", "c"], &[])]
    #[case::backward(&["b", "a"], &["c", "b"], &[], &["c", "b", "a"], &[])]
    #[case::diverging(
        &["b", "a"],
        &["b", "c"],
        &[("lanes:forward", "2")],
        &["c", "b", "a"],
        &[("lanes:forward", "2")]
    )]
    fn survivor_takes_joined_nodes(
        #[case] first: &[&str],
        #[case] second: &[&str],
        #[case] first_tags: &[(&str, &str)],
        #[case] nodes: &[&str],
        #[case] tags: &[(&str, &str)],
    ) {
        let graph = line(vec![
            w("-", first).with_tags(tags_from(first_tags.iter().copied())).into(),
            w("=", second).into(),
        ]);
        let result = join(&["-", "="]).apply(&graph).unwrap();
        assert_eq!(nodes_of(&result, "-"), ids(nodes));
        assert_eq!(tags_of(&result, "-"), tags_from(tags.iter().copied()));
        assert!(result.has_entity(&"=".into()).is_none());
    }

    #[rstest]
    fn reversed_segments_flip_their_tags() {
        let graph = Graph::new([
            n("a", 0.0, 0.0),
            n("b", 2.0, 0.0),
            n("c", 4.0, 0.0),
            n("d", 6.0, 0.0),
            n("e", 8.0, 0.0),
            w("-", &["a", "b"]).into(),
            w("=", &["c", "b"]).with_tags(tags_from([("lanes:forward", "2")])).into(),
            w("+", &["d", "c"]).into(),
            w("*", &["d", "e"]).with_tags(tags_from([("lanes:backward", "2")])).into(),
        ]);
        let result = join(&["-", "=", "+", "*"]).apply(&graph).unwrap();
        assert_eq!(nodes_of(&result, "-"), ids(&["a", "b", "c", "d", "e"]));
        assert_eq!(tags_of(&result, "-"), tags_from([("lanes:backward", "2")]));
        for gone in ["=", "+", "*"] {
            assert!(result.has_entity(&gone.into()).is_none());
        }
    }

    #[rstest]
    #[case::existing_beats_new(&["w-1", "w1", "w-2"], &[("w-1", "a", "b"), ("w1", "b", "c"), ("w-2", "c", "d")], "w1")]
    #[case::lowest_id(&["w2", "w1", "w-1"], &[("w1", "b", "c"), ("w2", "a", "b"), ("w-1", "c", "d")], "w1")]
    fn survivor_is_the_oldest_way(
        #[case] order: &[&str],
        #[case] ways: &[(&str, &str, &str)],
        #[case] survivor: &str,
    ) {
        let mut entities = vec![
            n("a", 0.0, 0.0),
            n("b", 2.0, 0.0),
            n("c", 4.0, 0.0),
            n("d", 6.0, 0.0),
        ];
        entities.extend(ways.iter().map(|(id, from, to)| w(id, &[*from, *to]).into()));
        let result = join(order).apply(&Graph::new(entities)).unwrap();
        assert_eq!(nodes_of(&result, survivor), ids(&["a", "b", "c", "d"]));
        for id in order.iter().filter(|id| **id != survivor) {
            assert!(result.has_entity(&(*id).into()).is_none());
        }
    }

    #[rstest]
    fn tags_are_merged() {
        let graph = Graph::new([
            n("a", 0.0, 0.0),
            n("b", 2.0, 0.0),
            n("c", 4.0, 0.0),
            n("d", 6.0, 0.0),
            w("-", &["a", "b"]).with_tags(tags_from([("a", "a"), ("b", "-"), ("c", "c")])).into(),
            w("=", &["b", "c"]).with_tags(tags_from([("a", "a"), ("b", "="), ("d", "d")])).into(),
            w("+", &["c", "d"]).with_tags(tags_from([("a", "a"), ("b", "="), ("e", "e")])).into(),
        ]);
        let result = join(&["-", "=", "+"]).apply(&graph).unwrap();
        assert_eq!(
            tags_of(&result, "-"),
            tags_from([("a", "a"), ("b", "-;="), ("c", "c"), ("d", "d"), ("e", "e")])
        );
    }

    #[rstest]
    #[case::start_co(&["a", "b"], &["b", "c"], "-", "-", &["a", "b", "c"])]
    #[case::end_co(&["a", "b"], &["b", "c"], "=", "=", &["a", "b", "c"])]
    #[case::start_contra(&["a", "b"], &["c", "b"], "-", "-", &["a", "b", "c"])]
    #[case::end_contra(&["a", "b"], &["c", "b"], "=", "=", &["c", "b", "a"])]
    fn sided_way_keeps_its_direction(
        #[case] first: &[&str],
        #[case] second: &[&str],
        #[case] sided: &str,
        #[case] survivor: &str,
        #[case] nodes: &[&str],
    ) {
        let cliff = tags_from([("natural", "cliff")]);
        let tag = |id: &str, way: Way| if id == sided { way.with_tags(cliff.clone()) } else { way };
        let graph = line(vec![
            tag("-", w("-", first)).into(),
            tag("=", w("=", second)).into(),
        ]);
        let result = join(&["-", "="]).apply(&graph).unwrap();
        assert_eq!(nodes_of(&result, survivor), ids(nodes));
        assert_eq!(tags_of(&result, survivor), cliff);
    }

    fn member_ids(graph: &Graph, id: &str) -> Vec<(String, String)> {
        graph
            .relation(&id.into())
            .unwrap()
            .members
            .iter()
            .map(|m| (m.id.to_string(), m.role.clone()))
            .collect()
    }

    #[rstest]
    fn relations_point_at_the_survivor() {
        let graph = line(vec![
            w("-", &["a", "b"]).into(),
            w("=", &["b", "c"]).into(),
            Relation::new("r1", vec![Member::way("=", "r1")]).into(),
            Relation::new("r2", vec![Member::way("=", "r2"), Member::way("-", "r2")]).into(),
        ]);
        let result = join(&["-", "="]).apply(&graph).unwrap();
        assert_eq!(member_ids(&result, "r1"), [("-".to_owned(), "r1".to_owned())]);
        assert_eq!(member_ids(&result, "r2"), [("-".to_owned(), "r2".to_owned())]);
    }

    #[rstest]
    fn out_and_back_routes_keep_repeats() {
        let graph = Graph::new([
            n("a", 0.0, 0.0),
            n("b", 1.0, 0.0),
            n("c", 2.0, 0.0),
            n("d", 3.0, 0.0),
            w("-", &["a", "b"]).into(),
            w("=", &["b", "c"]).into(),
            w("~", &["c", "d"]).into(),
            Relation::new(
                "r",
                ["-", "=", "~", "~", "=", "-"]
                    .into_iter()
                    .map(|id| Member::way(id, "forward"))
                    .collect(),
            )
            .into(),
        ]);
        let result = join(&["-", "="]).apply(&graph).unwrap();
        assert_eq!(nodes_of(&result, "-"), ids(&["a", "b", "c"]));
        assert_eq!(nodes_of(&result, "~"), ids(&["c", "d"]));
        let members: Vec<String> = member_ids(&result, "r").into_iter().map(|(id, _)| id).collect();
        assert_eq!(members, ["-", "~", "~", "-"]);
    }

    fn pier(way_tags: &[(&str, &str)], relation_tags: &[(&str, &str)]) -> Graph {
        Graph::new([
            n("a", 0.0, 0.0),
            n("b", 0.0, 2.0),
            n("c", 2.0, 2.0),
            n("d", 2.0, 0.0),
            w("-", &["a", "b", "c", "d"]).with_tags(tags_from(way_tags.iter().copied())).into(),
            w("=", &["d", "a"]).into(),
            Relation::new("r", vec![Member::way("-", "outer"), Member::way("=", "outer")])
                .with_tags(tags_from(relation_tags.iter().copied()))
                .into(),
        ])
    }

    #[rstest]
    fn single_member_multipolygon_becomes_an_area() {
        let graph = pier(&[], &[("type", "multipolygon"), ("man_made", "pier")]);
        let result = join(&["-", "="]).apply(&graph).unwrap();
        assert_eq!(nodes_of(&result, "-"), ids(&["a", "b", "c", "d", "a"]));
        assert_eq!(tags_of(&result, "-"), tags_from([("man_made", "pier"), ("area", "yes")]));
        assert!(result.has_entity(&"=".into()).is_none());
        assert!(result.has_entity(&"r".into()).is_none());
    }

    #[rstest]
    fn conflicting_multipolygon_is_kept() {
        let relation_tags = [("type", "multipolygon"), ("man_made", "pier"), ("surface", "wood")];
        let graph = pier(&[("surface", "paved")], &relation_tags);
        let result = join(&["-", "="]).apply(&graph).unwrap();
        assert_eq!(nodes_of(&result, "-"), ids(&["a", "b", "c", "d", "a"]));
        assert_eq!(tags_of(&result, "-"), tags_from([("surface", "paved")]));
        assert_eq!(
            result.relation(&"r".into()).unwrap().tags,
            tags_from(relation_tags)
        );
    }
}
