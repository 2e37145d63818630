//! Add an entity to the graph.

use crate::entity::Entity;
use crate::error::ActionError;
use crate::graph::Graph;

use super::Action;

/// Add `entity`, replacing any entity with the same id.
#[derive(Debug, Clone)]
pub struct AddEntity {
    entity: Entity,
}

impl AddEntity {
    /// Add `entity`.
    #[must_use]
    pub fn new(entity: impl Into<Entity>) -> Self {
        Self {
            entity: entity.into(),
        }
    }
}

impl Action for AddEntity {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        Ok(graph.replace(self.entity.clone()))
    }
}
