//! Add a member to a relation.

use std::collections::HashMap;

use crate::entity::{Member, Relation, Way};
use crate::error::ActionError;
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};
use crate::join_ways::join_ways;

use super::Action;

/// Placeholder way standing in for a split pair while members are ordered.
const PAIR_PLACEHOLDER: &str = "w~pair";

/// A way that must sit next to an existing member wherever that member
/// appears, such as the two halves of a split way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPair {
    /// The member already in the relation.
    pub original_id: EntityId,
    /// The way being added beside it.
    pub inserted_id: EntityId,
    /// Nodes of the original way before it was split.
    pub nodes: Vec<EntityId>,
}

/// Add a member to a relation.
///
/// With an explicit index the member is inserted there. Otherwise way
/// members are placed next to the ways they connect with, and PTv2 stops
/// and platforms go first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddMember {
    relation_id: EntityId,
    member: Member,
    index: Option<usize>,
    insert_pair: Option<InsertPair>,
}

fn is_stop_or_platform(role: &str) -> bool {
    role.contains("stop") || role.contains("platform")
}

#[derive(Debug, Clone)]
struct Slot {
    /// Position among the way members, `None` once moved away.
    index: Option<usize>,
    member: Member,
}

/// Move the live slot for `index` to position `to`, leaving a dead slot.
fn move_slot(slots: &mut Vec<Slot>, index: usize, to: usize) {
    let Some(from) = slots.iter().position(|s| s.index == Some(index)) else {
        return;
    };
    let moved = Slot {
        index: Some(index),
        member: slots[from].member.clone(),
    };
    slots[from].index = None;
    slots.insert(to.min(slots.len()), moved);
}

impl AddMember {
    /// Add `member` to `relation_id`.
    #[must_use]
    pub fn new(relation_id: impl Into<EntityId>, member: Member) -> Self {
        Self {
            relation_id: relation_id.into(),
            member,
            index: None,
            insert_pair: None,
        }
    }

    /// Insert at a fixed position instead of ordering by connectivity.
    #[must_use]
    pub const fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Keep the new member paired with an existing one.
    #[must_use]
    pub fn with_insert_pair(mut self, pair: InsertPair) -> Self {
        self.insert_pair = Some(pair);
        self
    }

    fn add_way_member(&self, relation: &Relation, graph: &Graph) -> Graph {
        let (stops, others): (Vec<Member>, Vec<Member>) = relation
            .members
            .iter()
            .cloned()
            .partition(|m| is_stop_or_platform(&m.role));
        let placeholder = EntityId::new(PAIR_PLACEHOLDER);

        let (scratch, candidates) = self.insert_pair.as_ref().map_or_else(
            || {
                let mut members = others.clone();
                members.push(self.member.clone());
                (graph.clone(), members)
            },
            |pair| {
                let scratch = graph.replace(Way::new(placeholder.clone(), pair.nodes.clone()));
                let members = Relation::clone(relation)
                    .with_members(others.clone())
                    .replace_member(&pair.original_id, &placeholder, EntityKind::Way, true)
                    .map_or_else(|| others.clone(), |r| r.members);
                (scratch, members)
            },
        );

        let of_kind = |kind: EntityKind| -> Vec<Member> {
            candidates.iter().filter(|m| m.kind == kind).cloned().collect()
        };
        let way_members = of_kind(EntityKind::Way);
        let mut slots: Vec<Slot> = way_members
            .iter()
            .enumerate()
            .map(|(index, member)| Slot {
                index: Some(index),
                member: member.clone(),
            })
            .collect();

        let mut pairs: HashMap<usize, [Member; 2]> = HashMap::new();
        for chain in join_ways(&way_members, &scratch).chains {
            let Some(start) = chain.items.first().map(|item| item.index) else {
                continue;
            };
            let j = slots
                .iter()
                .position(|s| s.index == Some(start))
                .unwrap_or(slots.len());
            let mut offset = 0;
            for (k, item) in chain.items.iter().enumerate() {
                if let Some(pair) = self.insert_pair.as_ref().filter(|_| item.member.id == placeholder) {
                    let role = item.member.role.clone();
                    let original = Member::way(pair.original_id.clone(), role.clone());
                    let inserted = Member::way(pair.inserted_id.clone(), role);
                    let forward = chain.nodes.get(offset) == pair.nodes.first();
                    pairs.insert(
                        item.index,
                        if forward { [original, inserted] } else { [inserted, original] },
                    );
                }
                if k > 0 && slots.get(j + k).is_none_or(|s| s.index != Some(item.index)) {
                    move_slot(&mut slots, item.index, j + k);
                }
                offset += item.way.nodes.len().saturating_sub(1);
            }
        }

        let mut members = stops;
        members.extend(of_kind(EntityKind::Node));
        for slot in slots {
            let Some(index) = slot.index else { continue };
            match pairs.remove(&index) {
                Some(pair) => members.extend(pair),
                None => members.push(slot.member),
            }
        }
        members.extend(of_kind(EntityKind::Relation));
        graph.replace(Relation::clone(relation).with_members(members))
    }
}

impl Action for AddMember {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let relation = graph.relation(&self.relation_id)?;
        let ptv2 = is_stop_or_platform(&self.member.role);
        if (self.index.is_none() || self.insert_pair.is_some())
            && self.member.kind == EntityKind::Way
            && !ptv2
        {
            return Ok(self.add_way_member(&relation, graph));
        }
        let index = if ptv2 { self.index.or(Some(0)) } else { self.index };
        Ok(graph.replace(relation.add_member(self.member.clone(), index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Node};
    use geo::Coord;
    use rstest::rstest;

    fn nodes(names: &str) -> Vec<Entity> {
        names
            .chars()
            .map(|c| Node::new(c.to_string().as_str(), Coord { x: 0.0, y: 0.0 }).into())
            .collect()
    }

    fn way(id: &str, nodes: &str) -> Entity {
        Way::new(id, nodes.chars().map(|c| EntityId::new(&c.to_string())).collect()).into()
    }

    fn relation(members: &[&str]) -> Entity {
        Relation::new("r", members.iter().map(|id| Member::way(*id, "")).collect()).into()
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

    fn graph(node_names: &str, rest: Vec<Entity>) -> Graph {
        Graph::new(nodes(node_names).into_iter().chain(rest))
    }

    #[rstest]
    fn inserts_at_explicit_index() {
        let graph = Graph::new([Relation::new(
            "r",
            vec![Member::node("1", ""), Member::node("3", "")],
        )
        .into()]);
        let result = AddMember::new("r", Member::node("2", "")).at(1).apply(&graph).unwrap();
        assert_eq!(member_ids(&result), ["1", "2", "3"]);
    }

    #[rstest]
    #[case::incomplete(vec![way("-", "abc"), way("=", "cd")], &["~", "-"], "=", &["~", "-", "="])]
    #[case::empty(vec![way("-", "ab")], &[], "-", &["-"])]
    #[case::disconnected(vec![way("-", "ab"), way("=", "cd")], &["-"], "=", &["-", "="])]
    #[case::at_end(vec![way("-", "ab"), way("=", "bc")], &["-"], "=", &["-", "="])]
    #[case::at_start(
        vec![way("=", "ab"), way("-", "bc"), way("~", "cd")],
        &["-", "~"],
        "=",
        &["=", "-", "~"]
    )]
    #[case::in_middle(
        vec![way("-", "ab"), way("=", "bc"), way("~", "cd")],
        &["-", "~"],
        "=",
        &["-", "=", "~"]
    )]
    fn places_way_next_to_its_neighbours(
        #[case] ways: Vec<Entity>,
        #[case] before: &[&str],
        #[case] added: &str,
        #[case] after: &[&str],
    ) {
        let mut entities = ways;
        entities.push(relation(before));
        let graph = graph("abcd", entities);
        let result = AddMember::new("r", Member::way(added, "")).apply(&graph).unwrap();
        assert_eq!(member_ids(&result), after);
    }

    #[rstest]
    fn pair_follows_every_occurrence_in_the_middle() {
        let graph = graph(
            "abcd",
            vec![
                way("-", "ab"),
                way("=", "bc"),
                way("~", "cd"),
                relation(&["-", "~", "~", "-"]),
            ],
        );
        let pair = InsertPair {
            original_id: "-".into(),
            inserted_id: "=".into(),
            nodes: vec!["a".into(), "b".into(), "c".into()],
        };
        let result = AddMember::new("r", Member::way("=", ""))
            .with_insert_pair(pair)
            .apply(&graph)
            .unwrap();
        assert_eq!(member_ids(&result), ["-", "=", "~", "~", "=", "-"]);
    }

    #[rstest]
    fn pair_follows_every_occurrence_at_the_ends() {
        let graph = graph(
            "abcd",
            vec![
                way("-", "ba"),
                way("=", "cb"),
                way("~", "cd"),
                relation(&["=", "~", "~", "="]),
            ],
        );
        let pair = InsertPair {
            original_id: "=".into(),
            inserted_id: "-".into(),
            nodes: vec!["c".into(), "b".into(), "a".into()],
        };
        let result = AddMember::new("r", Member::way("-", ""))
            .with_insert_pair(pair)
            .apply(&graph)
            .unwrap();
        assert_eq!(member_ids(&result), ["-", "=", "~", "~", "=", "-"]);
    }

    #[rstest]
    fn stops_and_platforms_lead_then_nodes_ways_relations() {
        let members = vec![
            Member::node("n1", "stop"),
            Member::way("w1", "platform"),
            Member::node("n2", "stop_entry_only"),
            Member::way("w2", "platform_entry_only"),
            Member::node("n3", "stop_exit_only"),
            Member::way("w3", "platform_exit_only"),
            Member::node("n10", "forward"),
            Member::node("n11", "forward"),
            Member::way("-", "forward"),
            Member::new("r1", EntityKind::Relation, "forward"),
            Member::node("n12", "forward"),
        ];
        let graph = graph(
            "abc",
            vec![way("-", "ab"), way("=", "bc"), Relation::new("r", members).into()],
        );
        let result = AddMember::new("r", Member::way("=", "forward")).apply(&graph).unwrap();
        assert_eq!(
            member_ids(&result),
            ["n1", "w1", "n2", "w2", "n3", "w3", "n10", "n11", "n12", "-", "=", "r1"]
        );
    }
}
