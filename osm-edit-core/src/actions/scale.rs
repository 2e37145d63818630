//! Scale entities about a pivot.

use geo::Coord;
use indexmap::IndexSet;

use crate::entity::Entity;
use crate::error::ActionError;
use crate::graph::Graph;
use crate::id::EntityId;
use crate::projection::Projection;

use super::Action;

/// Ids of every node reachable from `ids`, each once, in discovery order.
pub(crate) fn all_nodes(ids: &[EntityId], graph: &Graph) -> IndexSet<EntityId> {
    let mut nodes = IndexSet::new();
    let mut seen: IndexSet<EntityId> = IndexSet::new();
    let mut stack: Vec<EntityId> = ids.iter().rev().cloned().collect();
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        match graph.has_entity(&id) {
            Some(Entity::Node(_)) => {
                nodes.insert(id);
            }
            Some(entity) => stack.extend(entity.child_ids().into_iter().rev()),
            None => {}
        }
    }
    nodes
}

/// Move every node of the selection radially from `pivot` by `factor`.
///
/// The pivot is in projected coordinates; scaling happens in projected
/// space and the result is inverted back to locations.
#[derive(Debug, Clone)]
pub struct Scale<P> {
    ids: Vec<EntityId>,
    pivot: Coord<f64>,
    factor: f64,
    projection: P,
}

impl<P: Projection> Scale<P> {
    /// Scale `ids` about the projected point `pivot`.
    #[must_use]
    pub const fn new(ids: Vec<EntityId>, pivot: Coord<f64>, factor: f64, projection: P) -> Self {
        Self {
            ids,
            pivot,
            factor,
            projection,
        }
    }
}

impl<P: Projection> Action for Scale<P> {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let nodes = all_nodes(&self.ids, graph);
        graph.try_update(|graph| {
            for id in &nodes {
                let node = graph.node(id)?;
                let radial = self.projection.project(node.loc) - self.pivot;
                let point = self.pivot + radial * self.factor;
                let moved = node.move_to(self.projection.invert(point));
                graph.replace(moved);
            }
            Ok(())
        })
    }
}
