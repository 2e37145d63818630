//! Merge nodes into one at a shared location.

use geo::Coord;

use crate::error::{ActionError, DisabledReason};
use crate::graph::Graph;
use crate::id::EntityId;
use crate::tags::has_interesting_tags;

use super::{Action, Connect, MoveNode};

/// Move nodes to one location and connect them.
///
/// Without an explicit location the nodes meet at the single interesting
/// node's location, or at the average of all locations when none or several
/// carry interesting tags.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeNodes {
    node_ids: Vec<EntityId>,
    loc: Option<Coord<f64>>,
}

impl MergeNodes {
    /// Merge the listed nodes.
    #[must_use]
    pub const fn new(node_ids: Vec<EntityId>) -> Self {
        Self { node_ids, loc: None }
    }

    /// Merge at a fixed location.
    #[must_use]
    pub const fn at(mut self, loc: Coord<f64>) -> Self {
        self.loc = Some(loc);
        self
    }

    fn choose_loc(&self, graph: &Graph) -> Result<Coord<f64>, ActionError> {
        let mut sum = Coord { x: 0.0, y: 0.0 };
        let mut interesting = Vec::new();
        for id in &self.node_ids {
            let node = graph.node(id)?;
            if has_interesting_tags(&node.tags) {
                interesting.push(node.loc);
            }
            sum = sum + node.loc;
        }
        if let [only] = interesting.as_slice() {
            return Ok(*only);
        }
        #[expect(clippy::cast_precision_loss, reason = "node counts are small")]
        let count = self.node_ids.len() as f64;
        Ok(sum / count)
    }
}

impl Action for MergeNodes {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        if self.node_ids.len() < 2 {
            return Ok(graph.clone());
        }
        let to = match self.loc {
            Some(loc) => loc,
            None => self.choose_loc(graph)?,
        };
        let mut graph = graph.clone();
        for id in &self.node_ids {
            if graph.node(id)?.loc != to {
                graph = MoveNode::new(id.clone(), to).apply(&graph)?;
            }
        }
        Connect::new(self.node_ids.clone()).apply(&graph)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        if self.node_ids.len() < 2 || self.node_ids.iter().any(|id| graph.node(id).is_err()) {
            return Some(DisabledReason::NotEligible);
        }
        Connect::new(self.node_ids.clone()).disabled(graph)
    }
}
