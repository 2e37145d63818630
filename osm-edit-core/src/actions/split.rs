//! Split ways at a node.
//!
//! Open ways are cut in two at the node. Closed ways are cut at the node and
//! at the node farthest round the ring relative to its straight-line
//! distance, so each half stays a sensible shape. Relations that held the
//! original way get the new way beside it, in route order.

use std::rc::Rc;

use geo::Coord;

use crate::entity::{Geometry, Member, Relation, Way};
use crate::error::{ActionError, DisabledReason, GraphError};
use crate::geom::spherical_distance;
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};
use crate::tags::{Tags, has_interesting_tags, is_interesting_key, merge_tags};

use super::Action;
use super::add_member::{AddMember, InsertPair};

/// Which half of a split way keeps the original id, and so its history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeepHistoryOn {
    /// The longer half.
    #[default]
    Longest,
    /// The half running from the way's first node.
    First,
}

/// Options for [`Split`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitOptions {
    /// Split only these ways. Every listed way must pass through the node.
    pub limit_ways: Option<Vec<EntityId>>,
    /// Which half keeps the original id.
    pub keep_history_on: KeepHistoryOn,
    /// Ids for the new ways, in the order the ways are split. Missing ids
    /// are issued fresh.
    pub new_way_ids: Vec<EntityId>,
}

/// Split every eligible way through a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    node_id: EntityId,
    options: SplitOptions,
}

fn locs(graph: &Graph, ids: &[EntityId]) -> Result<Vec<Coord<f64>>, GraphError> {
    ids.iter().map(|id| graph.node(id).map(|n| n.loc)).collect()
}

fn path_length(graph: &Graph, ids: &[EntityId]) -> Result<f64, GraphError> {
    Ok(locs(graph, ids)?
        .windows(2)
        .map(|pair| spherical_distance(pair[0], pair[1]))
        .sum())
}

/// Index of the node to pair with `from` when cutting a ring: the one whose
/// shortest distance round the ring is largest compared with the direct
/// distance.
#[expect(
    clippy::integer_division,
    clippy::integer_division_remainder_used,
    reason = "ring positions wrap modulo the ring length"
)]
fn antipode(ring: &[Coord<f64>], from: usize) -> usize {
    let n = ring.len();
    let mut around = vec![f64::INFINITY; n];

    let mut length = 0.0;
    let mut i = (from + 1) % n;
    while i != from {
        length += spherical_distance(ring[i], ring[(i + n - 1) % n]);
        around[i] = length;
        i = (i + 1) % n;
    }
    length = 0.0;
    i = (from + n - 1) % n;
    while i != from {
        length += spherical_distance(ring[i], ring[(i + 1) % n]);
        around[i] = around[i].min(length);
        i = (i + n - 1) % n;
    }

    let mut best = 0.0;
    let mut best_index = (from + n / 2) % n;
    for (i, (&distance, &loc)) in around.iter().zip(ring).enumerate() {
        if i == from {
            continue;
        }
        let cost = distance / spherical_distance(ring[from], loc);
        if cost > best {
            best = cost;
            best_index = i;
        }
    }
    best_index
}

/// The multipolygon a way is the tagged outer ring of, in the old style
/// where the tags sit on the way instead of the relation.
fn old_multipolygon_outer(graph: &Graph, way: &Way) -> Option<Rc<Relation>> {
    if !has_interesting_tags(&way.tags) {
        return None;
    }
    let parents = graph.parent_relations(&way.id);
    let [parent] = parents.as_slice() else {
        return None;
    };
    let interesting = parent.tags.keys().filter(|k| is_interesting_key(k)).count();
    if !parent.is_multipolygon() || interesting > 1 {
        return None;
    }
    let is_outer_role = |role: &str| role.is_empty() || role == "outer";
    parent
        .members
        .iter()
        .all(|m| (m.id == way.id) == is_outer_role(&m.role))
        .then(|| Rc::clone(parent))
}

impl Split {
    /// Split at `node_id` with default options.
    #[must_use]
    pub fn new(node_id: impl Into<EntityId>) -> Self {
        Self::with_options(node_id, SplitOptions::default())
    }

    /// Split with explicit options.
    #[must_use]
    pub fn with_options(node_id: impl Into<EntityId>, options: SplitOptions) -> Self {
        Self {
            node_id: node_id.into(),
            options,
        }
    }

    fn splits(&self, way: &Way) -> bool {
        if self
            .options
            .limit_ways
            .as_ref()
            .is_some_and(|ids| !ids.contains(&way.id))
        {
            return false;
        }
        if way.is_closed() {
            return true;
        }
        let interior = way.nodes.len().saturating_sub(1);
        way.nodes
            .iter()
            .take(interior)
            .skip(1)
            .any(|id| *id == self.node_id)
    }

    /// Ways that will be split. Without a limit, lines are preferred over
    /// areas sharing the node.
    #[must_use]
    pub fn ways(&self, graph: &Graph) -> Vec<Rc<Way>> {
        let candidates: Vec<Rc<Way>> = graph
            .parent_ways(&self.node_id)
            .into_iter()
            .filter(|way| self.splits(way))
            .collect();
        if self.options.limit_ways.is_none()
            && candidates.iter().any(|w| w.geometry(graph) == Geometry::Line)
        {
            return candidates
                .into_iter()
                .filter(|w| w.geometry(graph) == Geometry::Line)
                .collect();
        }
        candidates
    }

    /// Node lists for the two halves of `way`, before any swap.
    fn halves(&self, graph: &Graph, way: &Way) -> Result<Option<(Vec<EntityId>, Vec<EntityId>)>, GraphError> {
        if way.is_closed() {
            let ring = &way.nodes[..way.nodes.len() - 1];
            let Some(a) = ring.iter().position(|id| *id == self.node_id) else {
                return Ok(None);
            };
            let b = antipode(&locs(graph, ring)?, a);
            let halves = if b < a {
                (
                    ring[a..].iter().chain(&ring[..=b]).cloned().collect(),
                    ring[b..=a].to_vec(),
                )
            } else {
                (
                    ring[a..=b].to_vec(),
                    ring[b..].iter().chain(&ring[..=a]).cloned().collect(),
                )
            };
            return Ok(Some(halves));
        }
        let last = way.nodes.len().saturating_sub(1);
        let Some(index) = (1..last).find(|&i| way.nodes[i] == self.node_id) else {
            return Ok(None);
        };
        Ok(Some((way.nodes[..=index].to_vec(), way.nodes[index..].to_vec())))
    }

    fn split_way(&self, graph: Graph, original: &Way, new_id: EntityId) -> Result<Graph, ActionError> {
        let Some((mut nodes_a, mut nodes_b)) = self.halves(&graph, original)? else {
            return Ok(graph);
        };
        if self.options.keep_history_on == KeepHistoryOn::Longest
            && path_length(&graph, &nodes_b)? > path_length(&graph, &nodes_a)?
        {
            std::mem::swap(&mut nodes_a, &mut nodes_b);
        }

        let is_area = original.is_area();
        let is_outer = old_multipolygon_outer(&graph, original);
        let way_a = Way::clone(original).with_nodes(nodes_a);
        let way_b = Way::new(new_id, nodes_b).with_tags(original.tags.clone());
        let mut graph = graph.replace(way_a.clone()).replace(way_b.clone());

        for parent in graph.parent_relations(&original.id) {
            let relation = graph.relation(&parent.id)?;
            if relation.has_from_via_to() {
                graph = Self::update_turn_relation(graph, &relation, &way_a, &way_b)?;
                continue;
            }
            if is_outer.as_ref().is_some_and(|outer| outer.id == relation.id) {
                let tags = merge_tags(&relation.tags, &way_a.tags).unwrap_or_else(|| relation.tags.clone());
                graph = graph
                    .replace(Relation::clone(&relation).with_tags(tags))
                    .replace(way_a.clone().with_tags(Tags::new()))
                    .replace(way_b.clone().with_tags(Tags::new()));
            }
            let role = relation
                .member_by_id(&way_a.id)
                .map(|m| m.role.clone())
                .unwrap_or_default();
            graph = AddMember::new(relation.id.clone(), Member::way(way_b.id.clone(), role))
                .with_insert_pair(InsertPair {
                    original_id: way_a.id.clone(),
                    inserted_id: way_b.id.clone(),
                    nodes: original.nodes.clone(),
                })
                .apply(&graph)?;
        }

        if is_outer.is_none() && is_area {
            let mut tags = way_a.tags.clone();
            tags.insert("type".to_owned(), "multipolygon".to_owned());
            let multipolygon = Relation::create(vec![
                Member::way(way_a.id.clone(), "outer"),
                Member::way(way_b.id.clone(), "outer"),
            ])
            .with_tags(tags);
            graph = graph
                .replace(multipolygon)
                .replace(way_a.with_tags(Tags::new()))
                .replace(way_b.with_tags(Tags::new()));
        }
        Ok(graph)
    }

    /// Point `from`/`to` at whichever half still touches the via, or add the
    /// new half as an extra via way.
    fn update_turn_relation(
        graph: Graph,
        relation: &Relation,
        way_a: &Way,
        way_b: &Way,
    ) -> Result<Graph, ActionError> {
        let vias = relation.members_by_role("via");
        let is_split = |role: &str| relation.member_by_role(role).is_some_and(|m| m.id == way_a.id);

        if is_split("from") || is_split("to") {
            let keep_b = match vias.as_slice() {
                [(_, via)] if via.kind == EntityKind::Node => way_b.contains(&via.id),
                _ => vias.iter().any(|(_, via)| {
                    via.kind == EntityKind::Way
                        && graph
                            .has_entity(&via.id)
                            .and_then(|e| e.as_way().cloned())
                            .is_some_and(|w| w.nodes.iter().any(|n| way_b.contains(n)))
                }),
            };
            if !keep_b {
                return Ok(graph);
            }
            return Ok(
                match relation.replace_member(&way_a.id, &way_b.id, EntityKind::Way, false) {
                    Some(updated) => graph.replace(updated),
                    None => graph,
                },
            );
        }

        let split_via = vias
            .iter()
            .find(|(_, via)| via.kind == EntityKind::Way && via.id == way_a.id);
        match split_via {
            Some((index, _)) => AddMember::new(relation.id.clone(), Member::way(way_b.id.clone(), "via"))
                .at(index + 1)
                .apply(&graph),
            None => Ok(graph),
        }
    }

    /// Apply the split and report the ids of the new ways.
    ///
    /// # Errors
    /// [`ActionError`] when a node or way on the split path is missing.
    pub fn split(&self, graph: &Graph) -> Result<(Graph, Vec<EntityId>), ActionError> {
        let mut graph = graph.clone();
        let mut created = Vec::new();
        for (i, way) in self.ways(&graph).iter().enumerate() {
            let new_id = self
                .options
                .new_way_ids
                .get(i)
                .cloned()
                .unwrap_or_else(|| EntityId::next(EntityKind::Way));
            // Earlier splits may have rewritten this way's relations.
            let current = graph.way(&way.id)?;
            graph = self.split_way(graph, &current, new_id.clone())?;
            created.push(new_id);
        }
        Ok((graph, created))
    }
}

impl Action for Split {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        self.split(graph).map(|(graph, _)| graph)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let ways = self.ways(graph);
        let mismatch = self
            .options
            .limit_ways
            .as_ref()
            .is_some_and(|ids| ids.len() != ways.len());
        (ways.is_empty() || mismatch).then_some(DisabledReason::NotEligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Node};
    use crate::tags::tags_from;
    use rstest::rstest;

    fn node(id: &str, x: f64, y: f64) -> Entity {
        Node::new(id, Coord { x, y }).into()
    }

    fn ids(values: &[&str]) -> Vec<EntityId> {
        values.iter().map(|v| EntityId::new(v)).collect()
    }

    fn way(id: &str, nodes: &[&str]) -> Entity {
        Way::new(id, ids(nodes)).into()
    }

    fn relation(id: &str, tags: &[(&str, &str)], members: Vec<Member>) -> Entity {
        Relation::new(id, members).with_tags(tags_from(tags.iter().copied())).into()
    }

    fn split_with(at: &str, new_ids: &[&str], limit: Option<&[&str]>) -> Split {
        Split::with_options(
            at,
            SplitOptions {
                limit_ways: limit.map(ids),
                new_way_ids: ids(new_ids),
                ..SplitOptions::default()
            },
        )
    }

    fn nodes_of(graph: &Graph, id: &str) -> Vec<EntityId> {
        graph.way(&id.into()).unwrap().nodes.clone()
    }

    fn member_ids(graph: &Graph) -> Vec<String> {
        graph
            .relation(&"r".into())
            .unwrap()
            .members
            .iter()
            .map(|m| m.id.to_string())
            .collect()
    }

    fn line_nodes(names: &str) -> Vec<Entity> {
        names
            .chars()
            .zip(0_u32..)
            .map(|(c, x)| node(&c.to_string(), f64::from(x), 0.0))
            .collect()
    }

    fn crossing() -> Graph {
        Graph::new([
            node("a", -1.0, 0.0),
            node("b", 1.0, 0.0),
            node("c", 0.0, 1.0),
            node("d", 0.0, -1.0),
            node("*", 0.0, 0.0),
            way("-", &["a", "*", "b"]),
            way("|", &["c", "*", "d"]),
        ])
    }

    fn square(tags: &[(&str, &str)]) -> Graph {
        Graph::new([
            node("a", 0.0, 1.0),
            node("b", 1.0, 1.0),
            node("c", 1.0, 0.0),
            node("d", 0.0, 0.0),
            Way::new("-", ids(&["a", "b", "c", "d", "a"]))
                .with_tags(tags_from(tags.iter().copied()))
                .into(),
        ])
    }

    #[rstest]
    #[case::end_of_one_way("b", None, Some(DisabledReason::NotEligible))]
    #[case::intersection("*", None, None)]
    #[case::intersection_limited("*", Some(&["-"][..]), None)]
    #[case::first_node("a", None, Some(DisabledReason::NotEligible))]
    #[case::last_node("b", Some(&["-", "|"][..]), Some(DisabledReason::NotEligible))]
    #[case::unknown_way("*", Some(&["-", "="][..]), Some(DisabledReason::NotEligible))]
    fn disabled_at_crossing(
        #[case] at: &str,
        #[case] limit: Option<&[&str]>,
        #[case] expected: Option<DisabledReason>,
    ) {
        assert_eq!(split_with(at, &[], limit).disabled(&crossing()), expected);
    }

    #[rstest]
    #[case::first("a")]
    #[case::last("b")]
    fn endpoints_of_a_lone_way_are_not_eligible(#[case] at: &str) {
        let mut entities = line_nodes("ab");
        entities.push(way("-", &["a", "b"]));
        assert_eq!(
            Split::new(at).disabled(&Graph::new(entities)),
            Some(DisabledReason::NotEligible)
        );
    }

    #[rstest]
    fn interior_node_of_a_lone_way_is_eligible() {
        let mut entities = line_nodes("abc");
        entities.push(way("-", &["a", "b", "c"]));
        assert_eq!(Split::new("b").disabled(&Graph::new(entities)), None);
    }

    #[rstest]
    fn self_intersection_splits_at_the_repeat() {
        let graph = Graph::new([
            node("a", 0.0, 0.0),
            node("b", 0.0, 2.0),
            node("c", -1.0, 0.0),
            node("d", 1.0, 0.0),
            way("-", &["a", "b", "c", "a", "d"]),
        ]);
        let action = split_with("a", &["="], None);
        assert_eq!(action.disabled(&graph), None);
        let result = action.apply(&graph).unwrap();
        assert_eq!(nodes_of(&result, "-"), ids(&["a", "b", "c", "a"]));
        assert_eq!(nodes_of(&result, "="), ids(&["a", "d"]));
    }

    #[rstest]
    fn new_way_takes_the_tail_and_the_tags() {
        let tags = tags_from([("highway", "residential")]);
        let mut entities = line_nodes("abc");
        entities.push(Way::new("-", ids(&["a", "b", "c"])).with_tags(tags.clone()).into());
        let (result, created) = split_with("b", &["="], None).split(&Graph::new(entities)).unwrap();
        assert_eq!(created, ids(&["="]));
        assert_eq!(nodes_of(&result, "-"), ids(&["a", "b"]));
        assert_eq!(nodes_of(&result, "="), ids(&["b", "c"]));
        assert_eq!(result.way(&"=".into()).unwrap().tags, tags);
        assert_eq!(result.way(&"-".into()).unwrap().tags, tags);
    }

    #[rstest]
    fn t_junction_leaves_the_stem_alone() {
        let graph = Graph::new([
            node("a", -1.0, 0.0),
            node("b", 0.0, 0.0),
            node("c", 1.0, 0.0),
            node("d", 0.0, -1.0),
            way("-", &["a", "b", "c"]),
            way("|", &["d", "b"]),
        ]);
        let result = split_with("b", &["="], None).apply(&graph).unwrap();
        assert_eq!(nodes_of(&result, "-"), ids(&["a", "b"]));
        assert_eq!(nodes_of(&result, "="), ids(&["b", "c"]));
        assert_eq!(nodes_of(&result, "|"), ids(&["d", "b"]));
    }

    #[rstest]
    #[case::both(&["=", "¦"], None, &[("-", &["a", "*"][..]), ("=", &["*", "b"]), ("|", &["c", "*"]), ("¦", &["*", "d"])])]
    #[case::limited_to_line(&["="], Some(&["-"][..]), &[("-", &["a", "*"][..]), ("=", &["*", "b"]), ("|", &["c", "*", "d"])])]
    #[case::limited_to_stem(&["¦"], Some(&["|"][..]), &[("-", &["a", "*", "b"][..]), ("|", &["c", "*"]), ("¦", &["*", "d"])])]
    #[case::limited_to_both(&["=", "¦"], Some(&["-", "|"][..]), &[("-", &["a", "*"][..]), ("=", &["*", "b"]), ("|", &["c", "*"]), ("¦", &["*", "d"])])]
    fn splits_ways_at_an_intersection(
        #[case] new_ids: &[&str],
        #[case] limit: Option<&[&str]>,
        #[case] expected: &[(&str, &[&str])],
    ) {
        let result = split_with("*", new_ids, limit).apply(&crossing()).unwrap();
        for (id, nodes) in expected {
            assert_eq!(nodes_of(&result, id), ids(nodes), "way {id}");
        }
    }

    #[rstest]
    #[case::at_a("a", &["c", "d", "a"], &["a", "b", "c"])]
    #[case::at_b("b", &["b", "c", "d"], &["d", "a", "b"])]
    #[case::at_c("c", &["c", "d", "a"], &["a", "b", "c"])]
    #[case::at_d("d", &["b", "c", "d"], &["d", "a", "b"])]
    fn closed_way_splits_at_the_antipode(
        #[case] at: &str,
        #[case] kept: &[&str],
        #[case] created: &[&str],
    ) {
        let result = split_with(at, &["="], None).apply(&square(&[])).unwrap();
        assert_eq!(nodes_of(&result, "-"), ids(kept));
        assert_eq!(nodes_of(&result, "="), ids(created));
    }

    #[rstest]
    fn keeping_history_on_the_first_half_skips_the_swap() {
        let action = Split::with_options(
            "a",
            SplitOptions {
                keep_history_on: KeepHistoryOn::First,
                new_way_ids: ids(&["="]),
                ..SplitOptions::default()
            },
        );
        let result = action.apply(&square(&[])).unwrap();
        assert_eq!(nodes_of(&result, "-"), ids(&["a", "b", "c"]));
        assert_eq!(nodes_of(&result, "="), ids(&["c", "d", "a"]));
    }

    fn route(ways: &[(&str, &[&str])], members: &[&str], at: &str, new_id: &str) -> Vec<String> {
        let mut entities = line_nodes("abcd");
        entities.extend(ways.iter().map(|(id, nodes)| way(id, nodes)));
        entities.push(relation(
            "r",
            &[],
            members.iter().map(|id| Member::way(*id, "")).collect(),
        ));
        let result = split_with(at, &[new_id], None).apply(&Graph::new(entities)).unwrap();
        member_ids(&result)
    }

    #[rstest]
    #[case::incomplete(&[("-", &["a", "b", "c"][..])], &["~", "-"], &["~", "-", "="])]
    #[case::forward(
        &[("-", &["a", "b", "c"][..]), ("~", &["c", "d"])],
        &["-", "~"],
        &["-", "=", "~"]
    )]
    #[case::reverse(
        &[("-", &["a", "b", "c"][..]), ("~", &["c", "d"])],
        &["~", "-"],
        &["~", "=", "-"]
    )]
    #[case::out_and_back_1(
        &[("-", &["a", "b", "c"][..]), ("~", &["c", "d"])],
        &["-", "~", "~", "-"],
        &["-", "=", "~", "~", "=", "-"]
    )]
    #[case::out_and_back_2(
        &[("-", &["c", "b", "a"][..]), ("~", &["c", "d"])],
        &["-", "~", "~", "-"],
        &["=", "-", "~", "~", "-", "="]
    )]
    #[case::out_and_back_3(
        &[("-", &["a", "b", "c"][..]), ("~", &["d", "c"])],
        &["-", "~", "~", "-"],
        &["-", "=", "~", "~", "=", "-"]
    )]
    #[case::out_and_back_4(
        &[("-", &["c", "b", "a"][..]), ("~", &["d", "c"])],
        &["-", "~", "~", "-"],
        &["=", "-", "~", "~", "-", "="]
    )]
    fn new_way_joins_the_route_beside_the_original(
        #[case] ways: &[(&str, &[&str])],
        #[case] members: &[&str],
        #[case] expected: &[&str],
    ) {
        assert_eq!(route(ways, members, "b", "="), expected);
    }

    #[rstest]
    fn roles_are_copied_to_the_new_member() {
        let mut entities = line_nodes("abc");
        entities.push(way("-", &["a", "b", "c"]));
        entities.push(relation("r", &[], vec![Member::way("-", "forward")]));
        let result = split_with("b", &["="], None).apply(&Graph::new(entities)).unwrap();
        assert_eq!(
            result.relation(&"r".into()).unwrap().members,
            vec![Member::way("-", "forward"), Member::way("=", "forward")]
        );
    }

    #[rstest]
    fn members_are_grouped_as_nodes_ways_relations() {
        let mut entities = line_nodes("abc");
        entities.push(way("-", &["a", "b", "c"]));
        entities.push(relation(
            "r",
            &[],
            vec![
                Member::node("n1", "forward"),
                Member::way("-", "forward"),
                Member::new("r1", EntityKind::Relation, "forward"),
                Member::node("n2", "forward"),
            ],
        ));
        let result = split_with("b", &["="], None).apply(&Graph::new(entities)).unwrap();
        assert_eq!(member_ids(&result), ["n1", "n2", "-", "=", "r1"]);
    }

    fn hat(hash: &[&str], tilde: &[&str], dash: &[&str], equals: &[&str], members: &[&str]) -> Vec<String> {
        let entities = vec![
            node("a", 0.0, 0.0),
            node("b", 1.0, 0.0),
            node("c", 2.0, 1.0),
            node("d", 3.0, 0.0),
            node("e", 4.0, 0.0),
            way("-", dash),
            way("#", hash),
            way("~", tilde),
            way("=", equals),
            relation("r", &[], members.iter().map(|id| Member::way(*id, "")).collect()),
        ];
        let result = split_with("c", &["*"], None).apply(&Graph::new(entities)).unwrap();
        member_ids(&result)
    }

    #[rstest]
    #[case::hat_1a(&["b", "c", "d"], &["b", "d"], &["a", "b"], &["d", "e"], &["-", "#", "~", "#", "="], &["-", "#", "*", "~", "#", "*", "="])]
    #[case::hat_1b(&["b", "c", "d"], &["b", "d"], &["a", "b"], &["d", "e"], &["-", "~", "#", "~", "="], &["-", "~", "*", "#", "~", "="])]
    #[case::hat_2(&["d", "c", "b"], &["b", "d"], &["a", "b"], &["d", "e"], &["-", "#", "~", "#", "="], &["-", "*", "#", "~", "*", "#", "="])]
    #[case::hat_3(&["d", "c", "b"], &["d", "b"], &["a", "b"], &["d", "e"], &["-", "#", "~", "#", "="], &["-", "*", "#", "~", "*", "#", "="])]
    #[case::hat_4(&["b", "c", "d"], &["d", "b"], &["a", "b"], &["d", "e"], &["-", "#", "~", "#", "="], &["-", "#", "*", "~", "#", "*", "="])]
    #[case::hat_5(&["b", "c", "d"], &["d", "b"], &["b", "a"], &["e", "d"], &["-", "#", "~", "#", "="], &["-", "#", "*", "~", "#", "*", "="])]
    fn hat_routes_keep_both_passes(
        #[case] hash: &[&str],
        #[case] tilde: &[&str],
        #[case] dash: &[&str],
        #[case] equals: &[&str],
        #[case] members: &[&str],
        #[case] expected: &[&str],
    ) {
        assert_eq!(hat(hash, tilde, dash, equals, members), expected);
    }

    fn spoon(dash: &[&str], tilde: &[&str], at: &str) -> Graph {
        let entities = vec![
            node("a", 0.0, 0.0),
            node("b", 0.0, 1.0),
            node("c", 1.0, 1.0),
            node("d", 1.0, 0.0),
            node("e", 2.0, 0.0),
            node("f", 3.0, 0.0),
            way("-", dash),
            way("~", tilde),
            relation(
                "r",
                &[],
                vec![Member::way("~", ""), Member::way("-", ""), Member::way("~", "")],
            ),
        ];
        split_with(at, &["="], None).apply(&Graph::new(entities)).unwrap()
    }

    const LOOP_CW: &[&str] = &["d", "a", "b", "c", "d"];
    const LOOP_CCW: &[&str] = &["d", "c", "b", "a", "d"];
    const HANDLE_OUT: &[&str] = &["d", "e", "f"];
    const HANDLE_IN: &[&str] = &["f", "e", "d"];

    #[rstest]
    #[case::spoon_1(LOOP_CW, HANDLE_OUT, &["d", "a", "b"], &["b", "c", "d"])]
    #[case::spoon_2(LOOP_CCW, HANDLE_OUT, &["b", "a", "d"], &["d", "c", "b"])]
    #[case::spoon_3(LOOP_CW, HANDLE_IN, &["d", "a", "b"], &["b", "c", "d"])]
    #[case::spoon_4(LOOP_CCW, HANDLE_IN, &["b", "a", "d"], &["d", "c", "b"])]
    fn spoon_split_on_the_loop(
        #[case] dash: &[&str],
        #[case] tilde: &[&str],
        #[case] kept: &[&str],
        #[case] created: &[&str],
    ) {
        let result = spoon(dash, tilde, "d");
        assert_eq!(nodes_of(&result, "-"), ids(kept));
        assert_eq!(nodes_of(&result, "="), ids(created));
        assert_eq!(member_ids(&result), ["~", "-", "=", "~"]);
    }

    #[rstest]
    #[case::spoon_1(LOOP_CW, HANDLE_OUT, &["d", "e"], &["e", "f"], &["=", "~", "-", "~", "="])]
    #[case::spoon_2(LOOP_CCW, HANDLE_OUT, &["d", "e"], &["e", "f"], &["=", "~", "-", "~", "="])]
    #[case::spoon_3(LOOP_CW, HANDLE_IN, &["f", "e"], &["e", "d"], &["~", "=", "-", "=", "~"])]
    #[case::spoon_4(LOOP_CCW, HANDLE_IN, &["f", "e"], &["e", "d"], &["~", "=", "-", "=", "~"])]
    fn spoon_split_on_the_handle(
        #[case] dash: &[&str],
        #[case] tilde: &[&str],
        #[case] kept: &[&str],
        #[case] created: &[&str],
        #[case] members: &[&str],
    ) {
        let result = spoon(dash, tilde, "e");
        assert_eq!(nodes_of(&result, "~"), ids(kept));
        assert_eq!(nodes_of(&result, "="), ids(created));
        assert_eq!(member_ids(&result), members);
    }

    #[rstest]
    fn split_area_becomes_a_multipolygon() {
        let result = split_with("a", &["="], None)
            .apply(&square(&[("area", "yes")]))
            .unwrap();
        assert!(result.way(&"-".into()).unwrap().tags.is_empty());
        assert!(result.way(&"=".into()).unwrap().tags.is_empty());
        let parents = result.parent_relations(&"-".into());
        let [multipolygon] = parents.as_slice() else {
            panic!("expected one parent relation, got {}", parents.len());
        };
        assert_eq!(
            multipolygon.tags,
            tags_from([("type", "multipolygon"), ("area", "yes")])
        );
        assert_eq!(
            multipolygon.members,
            vec![Member::way("-", "outer"), Member::way("=", "outer")]
        );
    }

    #[rstest]
    fn line_sharing_a_node_with_an_area_splits_alone() {
        let graph = Graph::new([
            node("a", 0.0, 1.0),
            node("b", 1.0, 1.0),
            node("c", 1.0, 0.0),
            way("-", &["a", "b", "c"]),
            Way::new("=", ids(&["a", "b", "c", "a"]))
                .with_tags(tags_from([("area", "yes")]))
                .into(),
        ]);
        let result = split_with("b", &["~"], None).apply(&graph).unwrap();
        assert_eq!(nodes_of(&result, "="), ids(&["a", "b", "c", "a"]));
        assert!(result.parent_relations(&"=".into()).is_empty());
        let mut halves = vec![nodes_of(&result, "-"), nodes_of(&result, "~")];
        halves.sort();
        assert_eq!(halves, vec![ids(&["a", "b"]), ids(&["b", "c"])]);
    }

    #[rstest]
    fn old_style_multipolygon_moves_tags_to_the_relation() {
        let mut entities = line_nodes("abc");
        entities.push(
            Way::new("-", ids(&["a", "b", "c"]))
                .with_tags(tags_from([("area", "yes")]))
                .into(),
        );
        entities.push(relation(
            "r",
            &[("type", "multipolygon")],
            vec![Member::way("-", "outer")],
        ));
        let result = split_with("b", &["="], None).apply(&Graph::new(entities)).unwrap();
        assert!(result.way(&"-".into()).unwrap().tags.is_empty());
        assert_eq!(
            result.relation(&"r".into()).unwrap().tags,
            tags_from([("type", "multipolygon"), ("area", "yes")])
        );
        assert_eq!(member_ids(&result), ["-", "="]);
    }

    fn turn(kind: &str, ways: &[(&str, &[&str])], members: Vec<Member>) -> Vec<Member> {
        let mut entities = line_nodes("abcde");
        entities.extend(ways.iter().map(|(id, nodes)| way(id, nodes)));
        entities.push(relation("r", &[("type", kind)], members));
        let result = split_with("b", &["="], None).apply(&Graph::new(entities)).unwrap();
        result.relation(&"r".into()).unwrap().members.clone()
    }

    #[rstest]
    fn from_moves_to_the_half_at_the_via_node(
        #[values("restriction", "restriction:bus", "manoeuvre")] kind: &str,
    ) {
        let members = turn(
            kind,
            &[("-", &["a", "b", "c"]), ("~", &["c", "d"])],
            vec![Member::way("-", "from"), Member::way("~", "to"), Member::node("c", "via")],
        );
        assert_eq!(
            members,
            vec![Member::way("=", "from"), Member::way("~", "to"), Member::node("c", "via")]
        );
    }

    #[rstest]
    fn to_moves_to_the_half_at_the_via_node(
        #[values("restriction", "restriction:bus", "manoeuvre")] kind: &str,
    ) {
        let members = turn(
            kind,
            &[("-", &["a", "b", "c"]), ("~", &["c", "d"])],
            vec![Member::way("~", "from"), Member::way("-", "to"), Member::node("c", "via")],
        );
        assert_eq!(
            members,
            vec![Member::way("~", "from"), Member::way("=", "to"), Member::node("c", "via")]
        );
    }

    #[rstest]
    fn u_turn_moves_both_roles(#[values("restriction", "restriction:bus", "manoeuvre")] kind: &str) {
        let members = turn(
            kind,
            &[("-", &["a", "b", "c"]), ("~", &["c", "d"])],
            vec![Member::way("-", "from"), Member::way("-", "to"), Member::node("c", "via")],
        );
        assert_eq!(
            members,
            vec![Member::way("=", "from"), Member::way("=", "to"), Member::node("c", "via")]
        );
    }

    #[rstest]
    #[case::from(vec![Member::way("-", "from"), Member::way("~", "to"), Member::way("|", "via")], vec![Member::way("=", "from"), Member::way("~", "to"), Member::way("|", "via")])]
    #[case::to(vec![Member::way("~", "from"), Member::way("-", "to"), Member::way("|", "via")], vec![Member::way("~", "from"), Member::way("=", "to"), Member::way("|", "via")])]
    fn roles_follow_the_half_touching_the_via_way(
        #[case] members: Vec<Member>,
        #[case] expected: Vec<Member>,
    ) {
        let result = turn(
            "restriction",
            &[("-", &["a", "b", "c"]), ("|", &["c", "d"]), ("~", &["d", "e"])],
            members,
        );
        assert_eq!(result, expected);
    }

    #[rstest]
    fn split_via_way_gains_a_second_via(
        #[values("restriction", "restriction:bus", "manoeuvre")] kind: &str,
    ) {
        let members = turn(
            kind,
            &[("-", &["a", "b", "c"]), ("|", &["d", "a"]), ("‖", &["e", "c"])],
            vec![Member::way("|", "from"), Member::way("-", "via"), Member::way("‖", "to")],
        );
        assert_eq!(
            members,
            vec![
                Member::way("|", "from"),
                Member::way("-", "via"),
                Member::way("=", "via"),
                Member::way("‖", "to"),
            ]
        );
    }

    #[rstest]
    fn restriction_away_from_the_split_is_unchanged() {
        let before = vec![Member::way("-", "from"), Member::way("~", "to"), Member::node("c", "via")];
        let members = turn(
            "restriction",
            &[("-", &["c", "b", "a"]), ("~", &["c", "d"])],
            before.clone(),
        );
        assert_eq!(members, before);
    }
}
