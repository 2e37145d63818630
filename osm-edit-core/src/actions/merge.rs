//! Fold points into a line or area.

use std::rc::Rc;

use crate::config::AreaKeys;
use crate::entity::{Entity, Geometry, Node, OsmEntity};
use crate::error::{ActionError, DisabledReason};
use crate::graph::Graph;
use crate::id::EntityId;
use crate::tags::has_interesting_tags;

use super::Action;

/// Merge tagged points into the one line or area among the selection.
///
/// Each point's tags move to the target and its relation memberships are
/// pointed at it. When the target is a way, an uploaded point replaces a
/// spare child node of the way where one exists, so its history survives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge {
    ids: Vec<EntityId>,
}

#[derive(Default)]
struct Grouped {
    points: Vec<Rc<Node>>,
    targets: Vec<Entity>,
    relations: usize,
}

impl Merge {
    /// Merge the listed entities.
    #[must_use]
    pub const fn new(ids: Vec<EntityId>) -> Self {
        Self { ids }
    }

    fn group(&self, graph: &Graph) -> Result<Grouped, ActionError> {
        let mut grouped = Grouped::default();
        for id in &self.ids {
            let entity = graph.entity(id)?;
            match (entity.geometry(graph), entity) {
                (Geometry::Point, Entity::Node(node)) => grouped.points.push(node),
                (Geometry::Line | Geometry::Area, target) => grouped.targets.push(target),
                (Geometry::Relation, _) => grouped.relations += 1,
                _ => {}
            }
        }
        // Areas win over lines as the target.
        grouped.targets.sort_by_key(|target| target.geometry(graph) != Geometry::Area);
        Ok(grouped)
    }
}

/// A child node the point may take the place of: one used by no other way
/// and no relation.
fn replaceable(graph: &Graph, node: &Node) -> bool {
    graph.parent_ways(&node.id).len() <= 1 && graph.parent_relations(&node.id).is_empty()
}

/// Child node the point should take over, if any.
fn node_to_replace(graph: &Graph, point: &Node, children: &[Rc<Node>]) -> Option<Rc<Node>> {
    if point.id.is_new() {
        return None;
    }
    let pick = |accept: &dyn Fn(&Node) -> bool| {
        children
            .iter()
            .find(|node| replaceable(graph, node) && accept(node))
            .cloned()
    };
    pick(&|node| node.id.is_new()).or_else(|| {
        if !has_interesting_tags(&point.tags) {
            return None;
        }
        pick(&|node| !has_interesting_tags(&node.tags)).or_else(|| pick(&|_| true))
    })
}

impl Action for Merge {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let grouped = self.group(graph)?;
        let Some(mut target) = grouped.targets.first().cloned() else {
            return Ok(graph.clone());
        };
        let mut graph = graph.clone();

        for point in &grouped.points {
            target = target.merge_tags(&point.tags);
            graph = graph.replace(target.clone());
            for parent in graph.parent_relations(&point.id) {
                if let Some(updated) = parent.replace_member(&point.id, target.id(), target.kind(), false) {
                    graph = graph.replace(updated);
                }
            }

            let mut remove = point.id.clone();
            if let Entity::Way(way) = &target {
                let mut children: Vec<Rc<Node>> = Vec::new();
                for child in graph.child_nodes(way)? {
                    if !children.iter().any(|c| c.id == child.id) {
                        children.push(child);
                    }
                }
                if let Some(node) = node_to_replace(&graph, point, &children) {
                    let moved = Node {
                        tags: node.tags.clone(),
                        loc: node.loc,
                        ..Node::clone(point)
                    };
                    target = way.replace_node(&node.id, &point.id).into();
                    graph = graph.replace(moved).replace(target.clone());
                    remove = node.id.clone();
                }
            }
            graph = graph.remove(&remove);
        }

        if target.tags().get("area").is_some_and(|v| v == "yes") {
            let mut tags = target.tags().clone();
            tags.remove("area");
            // Drop `area=yes` once another tag implies the area anyway.
            if AreaKeys::builtin().tag_suggesting_area(&tags).is_some() {
                graph = graph.replace(target.with_tags(tags));
            }
        }
        Ok(graph)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let Ok(grouped) = self.group(graph) else {
            return Some(DisabledReason::NotEligible);
        };
        (grouped.points.is_empty() || grouped.targets.len() != 1 || grouped.relations != 0)
            .then_some(DisabledReason::NotEligible)
    }
}
