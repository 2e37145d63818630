//! Remove a turn restriction.

use crate::error::{ActionError, DisabledReason};
use crate::graph::Graph;
use crate::id::EntityId;

use super::Action;
use super::delete::delete_relation;

/// Delete a `type=restriction` relation outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrestrictTurn {
    restriction_id: EntityId,
}

impl UnrestrictTurn {
    /// Remove `restriction_id`.
    #[must_use]
    pub fn new(restriction_id: impl Into<EntityId>) -> Self {
        Self {
            restriction_id: restriction_id.into(),
        }
    }
}

impl Action for UnrestrictTurn {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        delete_relation(graph.clone(), &self.restriction_id, true)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let relation = graph.relation(&self.restriction_id).ok()?;
        (!relation.is_restriction()).then_some(DisabledReason::NotEligible)
    }
}
