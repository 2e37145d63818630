//! Revert one entity to its base version.

use crate::entity::OsmEntity;
use crate::error::ActionError;
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};

use super::Action;
use super::delete::{detach_from_relations, detach_from_ways};

/// Undo every local edit to one entity.
///
/// An entity created locally is removed, taking it out of any parent way
/// or relation first. Children created alongside it are left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revert {
    entity_id: EntityId,
}

impl Revert {
    /// Revert `entity_id`.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: entity_id.into(),
        }
    }
}

impl Action for Revert {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let id = &self.entity_id;
        let mut graph = graph.clone();
        if let Some(entity) = graph.has_entity(id) {
            if graph.base_entity(id).is_none() {
                if entity.kind() == EntityKind::Node {
                    graph = detach_from_ways(graph, id)?;
                }
                graph = detach_from_relations(graph, id)?;
            }
        }
        Ok(graph.revert(id))
    }
}
