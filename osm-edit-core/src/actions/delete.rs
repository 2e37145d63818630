//! Deletion actions.
//!
//! Deleting an entity detaches it from every parent first. Parents left
//! degenerate are deleted in turn, and orphaned children without
//! interesting tags go with them.

use indexmap::IndexSet;

use crate::entity::{OsmEntity, Relation, Way};
use crate::error::{ActionError, DisabledReason};
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};

use super::Action;

fn is_orphan(graph: &Graph, id: &EntityId) -> bool {
    graph.parent_ways(id).is_empty() && graph.parent_relations(id).is_empty()
}

/// Drop `id` from its parent relations, deleting any left empty.
pub(crate) fn detach_from_relations(graph: Graph, id: &EntityId) -> Result<Graph, ActionError> {
    let mut graph = graph;
    for parent in graph.parent_relations(id) {
        let parent = parent.remove_members_with_id(id);
        let degenerate = parent.is_degenerate();
        let parent_id = parent.id.clone();
        graph = graph.replace(parent);
        if degenerate {
            graph = delete_relation(graph, &parent_id, false)?;
        }
    }
    Ok(graph)
}

/// Drop `id` from its parent ways, deleting any left degenerate.
pub(crate) fn detach_from_ways(graph: Graph, id: &EntityId) -> Result<Graph, ActionError> {
    let mut graph = graph;
    for parent in graph.parent_ways(id) {
        let parent = parent.remove_node(id);
        let degenerate = parent.is_degenerate();
        let parent_id = parent.id.clone();
        graph = graph.replace(parent);
        if degenerate {
            graph = delete_way(graph, &parent_id)?;
        }
    }
    Ok(graph)
}

pub(crate) fn delete_node(graph: Graph, id: &EntityId) -> Result<Graph, ActionError> {
    graph.node(id)?;
    let graph = detach_from_ways(graph, id)?;
    let graph = detach_from_relations(graph, id)?;
    Ok(graph.remove(id))
}

pub(crate) fn delete_way(graph: Graph, id: &EntityId) -> Result<Graph, ActionError> {
    let way = graph.way(id)?;
    let mut graph = detach_from_relations(graph, id)?;
    let mut remaining = Way::clone(&way);
    let unique: IndexSet<EntityId> = way.nodes.iter().cloned().collect();
    for node_id in unique {
        remaining = remaining.remove_node(&node_id);
        graph = graph.replace(remaining.clone());
        let Some(node) = graph.has_entity(&node_id) else {
            continue;
        };
        if is_orphan(&graph, &node_id) && !node.has_interesting_tags() {
            graph = graph.remove(&node_id);
        }
    }
    Ok(graph.remove(id))
}

pub(crate) fn delete_relation(
    graph: Graph,
    id: &EntityId,
    allow_untagged_members: bool,
) -> Result<Graph, ActionError> {
    let relation = graph.relation(id)?;
    let mut graph = detach_from_relations(graph, id)?;
    let mut remaining = Relation::clone(&relation);
    let member_ids: IndexSet<EntityId> = relation.members.iter().map(|m| m.id.clone()).collect();
    for member_id in member_ids {
        remaining = remaining.remove_members_with_id(&member_id);
        graph = graph.replace(remaining.clone());
        let Some(member) = graph.has_entity(&member_id) else {
            continue;
        };
        if is_orphan(&graph, &member_id) && !member.has_interesting_tags() && !allow_untagged_members
        {
            graph = delete_multiple(graph, std::slice::from_ref(&member_id))?;
        }
    }
    Ok(graph.remove(id))
}

pub(crate) fn delete_multiple(graph: Graph, ids: &[EntityId]) -> Result<Graph, ActionError> {
    let mut graph = graph;
    for id in ids {
        let Some(entity) = graph.has_entity(id) else {
            continue;
        };
        graph = match entity.kind() {
            EntityKind::Node => delete_node(graph, id)?,
            EntityKind::Way => delete_way(graph, id)?,
            EntityKind::Relation => delete_relation(graph, id, false)?,
        };
    }
    Ok(graph)
}

/// Delete a node, removing it from parent ways and relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteNode {
    node_id: EntityId,
}

impl DeleteNode {
    /// Delete `node_id`.
    #[must_use]
    pub fn new(node_id: impl Into<EntityId>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

impl Action for DeleteNode {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        delete_node(graph.clone(), &self.node_id)
    }
}

/// Delete a way together with child nodes nothing else needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteWay {
    way_id: EntityId,
}

impl DeleteWay {
    /// Delete `way_id`.
    #[must_use]
    pub fn new(way_id: impl Into<EntityId>) -> Self {
        Self {
            way_id: way_id.into(),
        }
    }
}

impl Action for DeleteWay {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        delete_way(graph.clone(), &self.way_id)
    }
}

/// Delete a relation together with members nothing else needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRelation {
    relation_id: EntityId,
    allow_untagged_members: bool,
}

impl DeleteRelation {
    /// Delete `relation_id`.
    #[must_use]
    pub fn new(relation_id: impl Into<EntityId>) -> Self {
        Self {
            relation_id: relation_id.into(),
            allow_untagged_members: false,
        }
    }

    /// Keep members even when they end up orphaned and untagged.
    #[must_use]
    pub const fn keep_untagged_members(mut self) -> Self {
        self.allow_untagged_members = true;
        self
    }
}

impl Action for DeleteRelation {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        delete_relation(graph.clone(), &self.relation_id, self.allow_untagged_members)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let relation = graph.relation(&self.relation_id).ok()?;
        (!relation.is_complete(graph)).then_some(DisabledReason::IncompleteRelation)
    }
}

/// Delete several entities of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMultiple {
    ids: Vec<EntityId>,
}

impl DeleteMultiple {
    /// Delete every id in `ids`; ids already gone are skipped.
    #[must_use]
    pub const fn new(ids: Vec<EntityId>) -> Self {
        Self { ids }
    }
}

impl Action for DeleteMultiple {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        delete_multiple(graph.clone(), &self.ids)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        self.ids.iter().find_map(|id| {
            graph
                .has_entity(id)
                .filter(|e| e.kind() == EntityKind::Relation)
                .and_then(|_| DeleteRelation::new(id.clone()).disabled(graph))
        })
    }
}

/// Remove the member at `index` from a relation, deleting the relation if
/// it is left empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMember {
    relation_id: EntityId,
    index: usize,
}

impl DeleteMember {
    /// Remove member `index` of `relation_id`.
    #[must_use]
    pub fn new(relation_id: impl Into<EntityId>, index: usize) -> Self {
        Self {
            relation_id: relation_id.into(),
            index,
        }
    }
}

impl Action for DeleteMember {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let relation = graph.relation(&self.relation_id)?.remove_member(self.index);
        let degenerate = relation.is_degenerate();
        let graph = graph.replace(relation);
        if degenerate {
            return delete_relation(graph, &self.relation_id, false);
        }
        Ok(graph)
    }
}
