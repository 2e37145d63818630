//! Move a node.

use geo::Coord;

use crate::error::ActionError;
use crate::geom::interp;
use crate::graph::Graph;
use crate::id::EntityId;

use super::{Action, clamp_t};

/// Move a node to a new location, interpolating along the straight path.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveNode {
    node_id: EntityId,
    to: Coord<f64>,
}

impl MoveNode {
    /// Move `node_id` to `to`.
    #[must_use]
    pub fn new(node_id: impl Into<EntityId>, to: Coord<f64>) -> Self {
        Self {
            node_id: node_id.into(),
            to,
        }
    }
}

impl Action for MoveNode {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        self.apply_at(graph, 1.0)
    }

    fn transitionable(&self) -> bool {
        true
    }

    fn apply_at(&self, graph: &Graph, t: f64) -> Result<Graph, ActionError> {
        let node = graph.node(&self.node_id)?;
        let t = clamp_t(t);
        let loc = if t >= 1.0 { self.to } else { interp(node.loc, self.to, t) };
        Ok(graph.replace(node.move_to(loc)))
    }
}
