//! Disconnect ways at a shared node.
//!
//! The inverse of [`Connect`](super::Connect): every affected way but one
//! gets its own copy of the node.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::entity::Node;
use crate::error::{ActionError, DisabledReason};
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};

use super::Action;

/// Options for [`Disconnect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectOptions {
    /// Disconnect only these ways, leaving the others on the original node.
    pub limit_ways: Option<Vec<EntityId>>,
    /// Id for the first copy of the node; later copies get fresh ids.
    pub new_node_id: Option<EntityId>,
}

/// One appearance of the node in a way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// The way.
    pub way_id: EntityId,
    /// Position of the node in the way.
    pub index: usize,
}

/// Split the ways meeting at a node so they no longer share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    node_id: EntityId,
    options: DisconnectOptions,
}

impl Disconnect {
    /// Disconnect every way at `node_id`.
    #[must_use]
    pub fn new(node_id: impl Into<EntityId>) -> Self {
        Self::with_options(node_id, DisconnectOptions::default())
    }

    /// Disconnect with explicit options.
    #[must_use]
    pub fn with_options(node_id: impl Into<EntityId>, options: DisconnectOptions) -> Self {
        Self {
            node_id: node_id.into(),
            options,
        }
    }

    fn is_limited_to(&self, way_id: &EntityId) -> Option<bool> {
        self.options
            .limit_ways
            .as_ref()
            .map(|ids| ids.contains(way_id))
    }

    /// Node appearances that will move to a copy of the node.
    #[must_use]
    pub fn connections(&self, graph: &Graph) -> Vec<Connection> {
        let parents = graph.parent_ways(&self.node_id);
        let mut candidates = Vec::new();
        let mut keeping = false;
        for way in &parents {
            let limited = self.is_limited_to(&way.id);
            if limited == Some(false) {
                keeping = true;
                continue;
            }
            if way.is_area() && way.first() == Some(&self.node_id) {
                candidates.push(Connection {
                    way_id: way.id.clone(),
                    index: 0,
                });
                continue;
            }
            let last = way.nodes.len().saturating_sub(1);
            for (index, id) in way.nodes.iter().enumerate() {
                if *id != self.node_id {
                    continue;
                }
                if way.is_closed() && parents.len() > 1 && limited == Some(true) && index == last {
                    continue;
                }
                candidates.push(Connection {
                    way_id: way.id.clone(),
                    index,
                });
            }
        }

        if keeping || candidates.is_empty() {
            return candidates;
        }
        // An uploaded node stays with an uploaded way where possible.
        if !self.node_id.is_new() && candidates.len() > 1 && candidates[0].way_id.is_new() {
            if let Some(pos) = candidates.iter().skip(1).position(|c| !c.way_id.is_new()) {
                candidates.remove(pos + 1);
                return candidates;
            }
        }
        candidates.remove(0);
        candidates
    }
}

impl Action for Disconnect {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let node = graph.node(&self.node_id)?;
        let mut copies: HashMap<EntityId, EntityId> = HashMap::new();
        let mut graph = graph.clone();
        for connection in self.connections(&graph) {
            let fresh = if copies.is_empty() {
                self.options.new_node_id.clone()
            } else {
                None
            };
            let copy_id = copies
                .entry(connection.way_id.clone())
                .or_insert_with(|| fresh.unwrap_or_else(|| EntityId::next(EntityKind::Node)))
                .clone();
            let copy = Node {
                id: copy_id.clone(),
                version: None,
                user: None,
                ..Node::clone(&node)
            };
            graph = graph.replace(copy);

            let way = graph.way(&connection.way_id)?;
            let last = way.nodes.len().saturating_sub(1);
            let updated = if connection.index == 0 && way.is_area() {
                way.replace_node(&way.nodes[0], &copy_id)
            } else if way.is_closed() && connection.index == last {
                way.unclose().add_node(copy_id, None)?
            } else {
                way.update_node(copy_id, connection.index)?
            };
            graph = graph.replace(updated);
        }
        Ok(graph)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        if self.connections(graph).is_empty() {
            return Some(DisabledReason::NotConnected);
        }
        let mut seen: IndexMap<EntityId, EntityId> = IndexMap::new();
        for way in graph.parent_ways(&self.node_id) {
            for relation in graph.parent_relations(&way.id) {
                match seen.get(&relation.id) {
                    Some(first_way) => {
                        let affected = self.is_limited_to(&way.id).unwrap_or(true)
                            || self.is_limited_to(first_way).unwrap_or(true);
                        if affected {
                            return Some(DisabledReason::Relation);
                        }
                    }
                    None => {
                        seen.insert(relation.id.clone(), way.id.clone());
                    }
                }
            }
        }
        None
    }
}
