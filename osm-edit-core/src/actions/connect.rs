//! Connect several nodes into one.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::entity::{Node, Relation, Way};
use crate::error::{ActionError, DisabledReason};
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};

use super::Action;
use super::delete::{delete_node, delete_way};

/// Merge nodes into a single survivor.
///
/// The survivor is the first node that has been uploaded, else the last
/// node listed. Every other node is replaced by the survivor in parent ways
/// and relations, its tags are merged into the survivor, and it is deleted.
/// Ways that collapse as a result are deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    node_ids: Vec<EntityId>,
}

/// Restriction member nodes grouped by role.
#[derive(Debug, Default)]
struct RestrictionNodes {
    from: Vec<EntityId>,
    via: Vec<EntityId>,
    to: Vec<EntityId>,
    key_from: Vec<EntityId>,
    key_to: Vec<EntityId>,
}

impl RestrictionNodes {
    fn collect(relation: &Relation, graph: &Graph) -> Self {
        let mut nodes = Self::default();
        for member in &relation.members {
            let Some(entity) = graph.has_entity(&member.id) else {
                continue;
            };
            let role = member.role.as_str();
            let bucket = match role {
                "from" => &mut nodes.from,
                "via" => &mut nodes.via,
                "to" => &mut nodes.to,
                _ => continue,
            };
            if let Some(way) = entity.as_way() {
                bucket.extend(way.nodes.iter().cloned());
                let ends = way.first().into_iter().chain(way.last()).cloned();
                let ends: Vec<EntityId> = ends.collect();
                if role == "from" || role == "via" {
                    nodes.key_from.extend(ends.iter().cloned());
                }
                if role == "to" || role == "via" {
                    nodes.key_to.extend(ends);
                }
            } else if member.kind == EntityKind::Node {
                bucket.push(member.id.clone());
                if role == "via" {
                    nodes.key_from.push(member.id.clone());
                    nodes.key_to.push(member.id.clone());
                }
            }
        }

        // A key node listed twice joins the from or to way onto the via.
        nodes.key_from = repeated(&nodes.key_from);
        nodes.key_to = repeated(&nodes.key_to);
        let is_key = |id: &EntityId| nodes.key_from.contains(id) || nodes.key_to.contains(id);
        let from = nodes.from.iter().filter(|id| !is_key(*id)).cloned().collect();
        let via = nodes.via.iter().filter(|id| !is_key(*id)).cloned().collect();
        let to = nodes.to.iter().filter(|id| !is_key(*id)).cloned().collect();
        nodes.from = from;
        nodes.via = via;
        nodes.to = to;
        nodes
    }
}

fn repeated(ids: &[EntityId]) -> Vec<EntityId> {
    let mut counts: HashMap<&EntityId, usize> = HashMap::new();
    for id in ids {
        *counts.entry(id).or_default() += 1;
    }
    let unique: IndexSet<&EntityId> = ids.iter().filter(|id| counts[id] > 1).collect();
    unique.into_iter().cloned().collect()
}

impl Connect {
    /// Connect `node_ids`.
    #[must_use]
    pub const fn new(node_ids: Vec<EntityId>) -> Self {
        Self { node_ids }
    }

    fn survivor(&self, graph: &Graph) -> Result<Rc<Node>, ActionError> {
        let mut survivor = None;
        for id in &self.node_ids {
            let node = graph.node(id)?;
            let uploaded = node.version.is_some();
            survivor = Some(node);
            if uploaded {
                break;
            }
        }
        survivor.ok_or(ActionError::Disabled(DisabledReason::NotEligible))
    }

    fn conflicting_roles(&self, graph: &Graph, restrictions: &mut IndexSet<EntityId>) -> bool {
        let mut seen: HashMap<EntityId, String> = HashMap::new();
        for id in &self.node_ids {
            for relation in graph.parent_relations(id) {
                let role = relation
                    .member_by_id(id)
                    .map(|m| m.role.clone())
                    .unwrap_or_default();
                if relation.has_from_via_to() {
                    restrictions.insert(relation.id.clone());
                }
                match seen.get(&relation.id) {
                    Some(previous) if *previous != role => return true,
                    _ => {
                        seen.insert(relation.id.clone(), role);
                    }
                }
            }
        }
        false
    }

    fn damages_restriction(&self, relation: &Relation, survivor: &EntityId, graph: &Graph) -> bool {
        let member_ways: IndexSet<EntityId> = relation
            .members
            .iter()
            .filter(|m| m.kind == EntityKind::Way)
            .map(|m| m.id.clone())
            .collect();
        let member_ways: Vec<Rc<Way>> =
            member_ways.iter().filter_map(|id| graph.way(id).ok()).collect();
        let is_uturn = match (relation.member_by_role("from"), relation.member_by_role("to")) {
            (Some(from), Some(to)) => from.id == to.id,
            _ => false,
        };

        let nodes = RestrictionNodes::collect(relation, graph);
        let touches = |set: &[EntityId]| self.node_ids.iter().any(|id| set.contains(id));
        let (from, via, to) = (touches(&nodes.from), touches(&nodes.via), touches(&nodes.to));
        if (from && to && !is_uturn) || (from && via) || (to && via) {
            return true;
        }

        if touches(&nodes.key_from) || touches(&nodes.key_to) {
            let [n0, n1] = self.node_ids.as_slice() else {
                return true;
            };
            let on_member = |id: &EntityId| member_ways.iter().any(|w| w.contains(id));
            if on_member(n0) && on_member(n1) && !member_ways.iter().any(|w| w.are_adjacent(n0, n1))
            {
                return true;
            }
        }

        member_ways.iter().any(|way| {
            let mut way = Way::clone(way);
            for id in self.node_ids.iter().filter(|id| *id != survivor) {
                way = if way.are_adjacent(id, survivor) {
                    way.remove_node(id)
                } else {
                    way.replace_node(id, survivor)
                };
            }
            way.is_degenerate()
        })
    }
}

impl Action for Connect {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let mut survivor = Node::clone(&*self.survivor(graph)?);
        let mut graph = graph.clone();
        for id in &self.node_ids {
            if *id == survivor.id {
                continue;
            }
            let node = graph.node(id)?;
            for parent in graph.parent_ways(id) {
                graph = graph.replace(parent.replace_node(id, &survivor.id));
            }
            for parent in graph.parent_relations(id) {
                if let Some(updated) = parent.replace_member(id, &survivor.id, EntityKind::Node, false)
                {
                    graph = graph.replace(updated);
                }
            }
            if let Some(tags) = crate::tags::merge_tags(&survivor.tags, &node.tags) {
                survivor = survivor.with_tags(tags);
            }
            graph = delete_node(graph, id)?;
        }

        let survivor_id = survivor.id.clone();
        graph = graph.replace(survivor);
        for parent in graph.parent_ways(&survivor_id) {
            if parent.is_degenerate() {
                graph = delete_way(graph, &parent.id)?;
            }
        }
        Ok(graph)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let Ok(survivor) = self.survivor(graph) else {
            return Some(DisabledReason::NotEligible);
        };
        let mut restrictions = IndexSet::new();
        if self.conflicting_roles(graph, &mut restrictions) {
            return Some(DisabledReason::Relation);
        }
        for id in &self.node_ids {
            for parent in graph.parent_ways(id) {
                for relation in graph.parent_relations(&parent.id) {
                    if relation.has_from_via_to() {
                        restrictions.insert(relation.id.clone());
                    }
                }
            }
        }
        restrictions
            .iter()
            .filter_map(|id| graph.relation(id).ok())
            .filter(|relation| relation.is_complete(graph))
            .any(|relation| self.damages_restriction(&relation, &survivor.id, graph))
            .then_some(DisabledReason::Restriction)
    }
}
