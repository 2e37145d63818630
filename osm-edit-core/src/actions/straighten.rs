//! Straighten ways and loose node runs.

use std::rc::Rc;

use geo::Coord;
use indexmap::IndexSet;
use serde::Deserialize;

use crate::entity::{Entity, Node, OsmEntity};
use crate::error::{ActionError, DisabledReason};
use crate::geom::{interp, smallest_surrounding_rectangle, vec_dot, vec_length};
use crate::graph::Graph;
use crate::id::EntityId;
use crate::projection::Projection;

use super::delete::delete_node;
use super::{Action, clamp_t};

/// Tolerances for straightening, in projected units.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StraightenOptions {
    /// A way is too bendy once a node strays further than this share of
    /// the start-to-end distance from the chord.
    pub too_bendy_ratio: f64,
    /// Nodes this close to the line count as already on it.
    pub straight_enough_epsilon: f64,
}

impl Default for StraightenOptions {
    fn default() -> Self {
        Self {
            too_bendy_ratio: 0.2,
            straight_enough_epsilon: 1e-4,
        }
    }
}

/// Parameter of the projection of `point` onto the line `start -> end`.
fn position_along(point: Coord<f64>, start: Coord<f64>, end: Coord<f64>) -> f64 {
    let length = vec_dot(end, end, start);
    if length <= 0.0 {
        return 0.0;
    }
    vec_dot(point, end, start) / length
}

fn foot(point: Coord<f64>, start: Coord<f64>, end: Coord<f64>) -> Coord<f64> {
    interp(start, end, position_along(point, start, end))
}

/// Nodes that must survive straightening.
fn should_keep(node: &Node, graph: &Graph) -> bool {
    graph.parent_ways(&node.id).len() > 1
        || !graph.parent_relations(&node.id).is_empty()
        || node.has_interesting_tags()
}

/// Straighten one or more ways joined end to end.
///
/// Interior nodes are moved onto the chord between the first and last node
/// of the run. At `t = 1` untagged interior nodes used by no other way or
/// relation are deleted instead. Selecting exactly two nodes of the run as
/// well limits the straightening to the stretch between them.
#[derive(Debug, Clone)]
pub struct StraightenWay<P> {
    ids: Vec<EntityId>,
    projection: P,
    options: StraightenOptions,
}

impl<P: Projection> StraightenWay<P> {
    /// Straighten the ways, and optional bounding nodes, in `ids`.
    #[must_use]
    pub fn new(ids: Vec<EntityId>, projection: P) -> Self {
        Self {
            ids,
            projection,
            options: StraightenOptions::default(),
        }
    }

    /// Replace the default tolerances.
    #[must_use]
    pub const fn with_options(mut self, options: StraightenOptions) -> Self {
        self.options = options;
        self
    }

    /// The selected ways as one continuous run of nodes.
    fn ordered_nodes(&self, graph: &Graph) -> Result<Vec<Rc<Node>>, ActionError> {
        let mut ways: Vec<Vec<EntityId>> = Vec::new();
        let mut bounds: Vec<&EntityId> = Vec::new();
        for id in &self.ids {
            match graph.entity(id)? {
                Entity::Way(way) => ways.push(way.nodes.clone()),
                Entity::Node(_) => bounds.push(id),
                Entity::Relation(_) => {}
            }
        }

        // An id listed as the start (or end) of two ways is interior.
        let once = |ids: Vec<&EntityId>| -> Vec<EntityId> {
            ids.iter()
                .filter(|id| ids.iter().filter(|other| other == id).count() == 1)
                .map(|id| (*id).clone())
                .collect()
        };
        let starts = once(ways.iter().filter_map(|w| w.first()).collect());
        let ends = once(ways.iter().filter_map(|w| w.last()).collect());
        let mut current = starts
            .iter()
            .find(|id| !ends.contains(*id))
            .or_else(|| ends.iter().find(|id| !starts.contains(*id)))
            .or_else(|| ways.first().and_then(|w| w.first()))
            .cloned();

        let mut nodes: Vec<EntityId> = Vec::new();
        while !ways.is_empty() {
            let at = ways
                .iter()
                .position(|w| w.first() == current.as_ref() || w.last() == current.as_ref())
                .unwrap_or(0);
            let mut next = ways.remove(at);
            if next.first() != current.as_ref() {
                next.reverse();
            }
            nodes.extend(next);
            current = nodes.last().cloned();
        }
        let mut nodes: Vec<EntityId> = nodes.into_iter().collect::<IndexSet<_>>().into_iter().collect();

        if let [from, to] = bounds.as_slice() {
            if let (Some(a), Some(b)) = (
                nodes.iter().position(|id| id == *from),
                nodes.iter().position(|id| id == *to),
            ) {
                nodes = nodes[a.min(b)..=a.max(b)].to_vec();
            }
        }

        Ok(nodes.iter().map(|id| graph.node(id)).collect::<Result<_, _>>()?)
    }
}

impl<P: Projection> Action for StraightenWay<P> {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        self.apply_at(graph, 1.0)
    }

    fn apply_at(&self, graph: &Graph, t: f64) -> Result<Graph, ActionError> {
        let t = clamp_t(t);
        let nodes = self.ordered_nodes(graph)?;
        let points: Vec<Coord<f64>> = nodes.iter().map(|n| self.projection.project(n.loc)).collect();
        let (Some(&start), Some(&end)) = (points.first(), points.last()) else {
            return Ok(graph.clone());
        };

        let mut graph = graph.clone();
        let mut doomed: IndexSet<EntityId> = IndexSet::new();
        let interior = nodes.len().saturating_sub(2);
        for (node, &point) in nodes.iter().zip(&points).skip(1).take(interior) {
            if t < 1.0 || should_keep(node, &graph) {
                let on_line = self.projection.invert(foot(point, start, end));
                graph = graph.replace(node.move_to(interp(node.loc, on_line, t)));
            } else {
                doomed.insert(node.id.clone());
            }
        }
        for id in doomed {
            graph = delete_node(graph, &id)?;
        }
        Ok(graph)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let Ok(nodes) = self.ordered_nodes(graph) else {
            return Some(DisabledReason::NotEligible);
        };
        let points: Vec<Coord<f64>> = nodes.iter().map(|n| self.projection.project(n.loc)).collect();
        let (Some(&start), Some(&end)) = (points.first(), points.last()) else {
            return Some(DisabledReason::NotEligible);
        };
        let threshold = self.options.too_bendy_ratio * vec_length(start, end);
        if threshold <= 0.0 {
            return Some(DisabledReason::TooBendy);
        }

        let interior = points.len().saturating_sub(2);
        let mut max_distance: f64 = 0.0;
        for &point in points.iter().skip(1).take(interior) {
            let distance = vec_length(foot(point, start, end), point);
            if distance.is_nan() || distance > threshold {
                return Some(DisabledReason::TooBendy);
            }
            max_distance = max_distance.max(distance);
        }

        // Already straight ways may still shed spare nodes.
        let keeps_all = nodes
            .iter()
            .skip(1)
            .take(interior)
            .all(|node| should_keep(node, graph));
        (max_distance < self.options.straight_enough_epsilon && keeps_all)
            .then_some(DisabledReason::StraightEnough)
    }

    fn transitionable(&self) -> bool {
        true
    }
}

/// Line up unconnected nodes along the long axis of their smallest
/// surrounding rectangle.
#[derive(Debug, Clone)]
pub struct StraightenNodes<P> {
    ids: Vec<EntityId>,
    projection: P,
    options: StraightenOptions,
}

impl<P: Projection> StraightenNodes<P> {
    /// Straighten the nodes in `ids`.
    #[must_use]
    pub fn new(ids: Vec<EntityId>, projection: P) -> Self {
        Self {
            ids,
            projection,
            options: StraightenOptions::default(),
        }
    }

    /// Replace the default tolerances.
    #[must_use]
    pub const fn with_options(mut self, options: StraightenOptions) -> Self {
        self.options = options;
        self
    }

    fn nodes(&self, graph: &Graph) -> Result<Vec<Rc<Node>>, ActionError> {
        Ok(self.ids.iter().map(|id| graph.node(id)).collect::<Result<_, _>>()?)
    }

    /// Ends of the long axis of symmetry of the points' bounding rectangle.
    fn axis(points: &[Coord<f64>]) -> Option<(Coord<f64>, Coord<f64>)> {
        let r = smallest_surrounding_rectangle(points)?;
        let mid = |a: Coord<f64>, b: Coord<f64>| (a + b) / 2.0;
        let (p1, q1) = (mid(r[0], r[1]), mid(r[2], r[3]));
        let (p2, q2) = (mid(r[3], r[4]), mid(r[1], r[2]));
        Some(if vec_length(p1, q1) > vec_length(p2, q2) {
            (p1, q1)
        } else {
            (p2, q2)
        })
    }
}

impl<P: Projection> Action for StraightenNodes<P> {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        self.apply_at(graph, 1.0)
    }

    fn apply_at(&self, graph: &Graph, t: f64) -> Result<Graph, ActionError> {
        let t = clamp_t(t);
        let nodes = self.nodes(graph)?;
        let points: Vec<Coord<f64>> = nodes.iter().map(|n| self.projection.project(n.loc)).collect();
        let Some((start, end)) = Self::axis(&points) else {
            return Ok(graph.clone());
        };
        let mut graph = graph.clone();
        for (node, &point) in nodes.iter().zip(&points) {
            let on_line = self.projection.invert(foot(point, start, end));
            graph = graph.replace(node.move_to(interp(node.loc, on_line, t)));
        }
        Ok(graph)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let Ok(nodes) = self.nodes(graph) else {
            return Some(DisabledReason::NotEligible);
        };
        let points: Vec<Coord<f64>> = nodes.iter().map(|n| self.projection.project(n.loc)).collect();
        let Some((start, end)) = Self::axis(&points) else {
            return Some(DisabledReason::NotEligible);
        };
        let max_distance = points
            .iter()
            .map(|&point| vec_length(foot(point, start, end), point))
            .filter(|d| !d.is_nan())
            .fold(0.0, f64::max);
        (max_distance < self.options.straight_enough_epsilon).then_some(DisabledReason::StraightEnough)
    }

    fn transitionable(&self) -> bool {
        true
    }
}
