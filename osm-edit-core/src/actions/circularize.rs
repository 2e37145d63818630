//! Turn a closed way into a circle.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::rc::Rc;

use geo::Coord;
use indexmap::IndexSet;
use serde::Deserialize;

use crate::entity::{Node, Way};
use crate::error::{ActionError, DisabledReason};
use crate::geom::{convex_hull, interp, polygon_centroid, signed_area, vec_length};
use crate::graph::Graph;
use crate::id::EntityId;
use crate::projection::Projection;

use super::{Action, clamp_t};

/// Tuning for [`Circularize`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CircularizeOptions {
    /// Largest central angle between neighbouring nodes of the result.
    /// Extra nodes are added until every step is within it.
    pub max_angle_degrees: f64,
}

impl Default for CircularizeOptions {
    fn default() -> Self {
        Self {
            max_angle_degrees: 20.0,
        }
    }
}

/// Arrange the nodes of a closed way evenly around a circle.
///
/// Nodes shared with other ways ("key" nodes) are only pushed radially onto
/// the circle; the nodes between them are spread at even angles. New nodes
/// are inserted where the gap between two nodes exceeds the maximum angle,
/// and are also threaded into any other way that joins the same two key
/// nodes directly. Concave ways are first flattened onto their convex hull.
#[derive(Debug, Clone)]
pub struct Circularize<P> {
    way_id: EntityId,
    projection: P,
    options: CircularizeOptions,
}

/// Ids of the way's nodes without the closing repeat.
fn ring_ids(way: &Way) -> Vec<EntityId> {
    way.nodes.iter().cloned().collect::<IndexSet<_>>().into_iter().collect()
}

#[expect(
    clippy::integer_division,
    clippy::integer_division_remainder_used,
    reason = "the middle of an even list is found by halving its length"
)]
fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    match values.len() {
        0 => 0.0,
        n if n % 2 == 1 => values[mid],
        _ => (values[mid - 1] + values[mid]) / 2.0,
    }
}

fn last_position(nodes: &[EntityId], id: &EntityId) -> Option<usize> {
    nodes.iter().rposition(|n| n == id)
}

/// Direction of travel from `start` to `end` in `nodes`, treating a jump
/// across the closing node as forwards.
fn direction(nodes: &[EntityId], start: &EntityId, end: &EntityId) -> isize {
    let at = |id| last_position(nodes, id).and_then(|i| isize::try_from(i).ok()).unwrap_or(0);
    let step = at(end) - at(start);
    if step < -1 { 1 } else { step }
}

impl<P: Projection> Circularize<P> {
    /// Circularize the closed way `way_id`.
    #[must_use]
    pub fn new(way_id: impl Into<EntityId>, projection: P) -> Self {
        Self {
            way_id: way_id.into(),
            projection,
            options: CircularizeOptions::default(),
        }
    }

    /// Replace the default options.
    #[must_use]
    pub const fn with_options(mut self, options: CircularizeOptions) -> Self {
        self.options = options;
        self
    }

    const fn max_angle(&self) -> f64 {
        self.options.max_angle_degrees.to_radians()
    }

    fn project_all(&self, graph: &Graph, ids: &[EntityId]) -> Result<Vec<Coord<f64>>, ActionError> {
        ids.iter()
            .map(|id| Ok(self.projection.project(graph.node(id)?.loc)))
            .collect()
    }

    /// Slide the nodes lying inside the convex hull out onto its edges.
    #[expect(
        clippy::integer_division_remainder_used,
        clippy::cast_precision_loss,
        reason = "ring positions wrap modulo the ring length and node counts are small"
    )]
    fn make_convex(&self, graph: Graph) -> Result<Graph, ActionError> {
        let way = graph.way(&self.way_id)?;
        let mut ids = ring_ids(&way);
        let mut points = self.project_all(&graph, &ids)?;
        // Hull vertices come counterclockwise; walk the ring the same way.
        if signed_area(&points) < 0.0 {
            ids.reverse();
            points.reverse();
        }
        let hull = convex_hull(&points);
        let n = ids.len();
        let mut graph = graph;
        for (i, &from) in hull.iter().enumerate() {
            let to = hull[(i + 1) % hull.len()];
            let (Some(start), Some(end)) = (
                points.iter().position(|p| *p == from),
                points.iter().position(|p| *p == to),
            ) else {
                continue;
            };
            let range = (end + n - start) % n;
            for j in 1..range {
                let id = &ids[(start + j) % n];
                let point = interp(from, to, j as f64 / range as f64);
                graph = graph.replace(graph.node(id)?.move_to(self.projection.invert(point)));
            }
        }
        Ok(graph)
    }

    /// Move `id` by `t` of the way from its original location to `target`.
    fn settle(
        &self,
        graph: Graph,
        layout: &Layout,
        id: &EntityId,
        target: Coord<f64>,
    ) -> Result<Graph, ActionError> {
        let node = graph.node(id)?;
        let from = layout.origin(id).unwrap_or(node.loc);
        let moved = node.move_to(interp(from, self.projection.invert(target), layout.t));
        Ok(graph.replace(moved))
    }

    /// Spread the nodes between two consecutive key nodes along the circle,
    /// adding nodes until no step exceeds the maximum angle.
    #[expect(
        clippy::integer_division_remainder_used,
        clippy::cast_precision_loss,
        reason = "ring positions wrap modulo the ring length and node counts are small"
    )]
    fn fill_arc(
        &self,
        mut graph: Graph,
        ring: &mut Vec<EntityId>,
        layout: &Layout,
        [(start_id, start), (end_id, end)]: [(&EntityId, Coord<f64>); 2],
    ) -> Result<Graph, ActionError> {
        let circle = &layout.circle;
        let n = ring.len();
        let start_index = ring.iter().position(|id| id == start_id).unwrap_or(0);
        let end_index = ring.iter().position(|id| id == end_id).unwrap_or(0);
        let range = (end_index + n - start_index) % n;

        let total = circle.sweep(start, end);
        let mut added = 0;
        let mut each = total / range as f64;
        while each.abs() > self.max_angle() {
            added += 1;
            each = total / (range + added) as f64;
        }
        let start_angle = circle.angle_of(start);

        let mut near: Vec<(EntityId, f64)> = Vec::new();
        for j in 1..range {
            let angle = start_angle + j as f64 * each;
            let id = ring[(start_index + j) % n].clone();
            graph = self.settle(graph, layout, &id, circle.at(angle))?;
            near.push((id, angle));
        }

        let fallback = layout
            .origin(start_id)
            .unwrap_or_else(|| self.projection.invert(start));
        let mut added_ids: Vec<EntityId> = Vec::with_capacity(added);
        for j in 0..added {
            let angle = start_angle + (range + j) as f64 * each;
            let from = near
                .iter()
                .min_by(|a, b| (a.1 - angle).abs().total_cmp(&(b.1 - angle).abs()))
                .and_then(|(id, _)| layout.origin(id))
                .unwrap_or(fallback);
            let target = self.projection.invert(circle.at(angle));
            let node = Node::create(interp(from, target, layout.t));
            ring.insert(end_index + j, node.id.clone());
            added_ids.push(node.id.clone());
            graph = graph.replace(node);
        }

        if range == 1 && !added_ids.is_empty() {
            graph = thread_shared(graph, &layout.way, [start_id, end_id], &added_ids)?;
        }
        Ok(graph)
    }
}

/// The circle being fitted, in projected space.
struct Circle {
    centroid: Coord<f64>,
    radius: f64,
    /// `1.0` when the ring runs counterclockwise, `-1.0` otherwise.
    winding: f64,
}

impl Circle {
    fn fit(points: &[Coord<f64>]) -> Option<Self> {
        let centroid = match points {
            [] | [_] => return None,
            [a, b] => interp(*a, *b, 0.5),
            _ => polygon_centroid(points)?,
        };
        Some(Self {
            centroid,
            radius: median(points.iter().map(|&p| vec_length(centroid, p)).collect()),
            winding: if signed_area(points) >= 0.0 { 1.0 } else { -1.0 },
        })
    }

    fn angle_of(&self, p: Coord<f64>) -> f64 {
        (p.y - self.centroid.y).atan2(p.x - self.centroid.x)
    }

    fn at(&self, angle: f64) -> Coord<f64> {
        Coord {
            x: self.centroid.x + angle.cos() * self.radius,
            y: self.centroid.y + angle.sin() * self.radius,
        }
    }

    /// Radial projection of `p` onto the circle.
    fn push_out(&self, p: Coord<f64>) -> Coord<f64> {
        let distance = vec_length(self.centroid, p);
        let distance = if distance > 0.0 { distance } else { 1e-4 };
        self.centroid + (p - self.centroid) / distance * self.radius
    }

    /// Signed angle swept from `from` to `to` in the ring's direction.
    fn sweep(&self, from: Coord<f64>, to: Coord<f64>) -> f64 {
        let total = self.angle_of(to) - self.angle_of(from);
        if total * self.winding < 0.0 {
            self.winding * (2.0 * PI - total.abs())
        } else {
            total
        }
    }
}

/// State shared by every arc of one application.
struct Layout {
    way: Rc<Way>,
    circle: Circle,
    origins: HashMap<EntityId, Coord<f64>>,
    t: f64,
}

impl Layout {
    fn origin(&self, id: &EntityId) -> Option<Coord<f64>> {
        self.origins.get(id).copied()
    }
}

/// Nodes shared with other ways, or failing that the first node and the one
/// opposite it.
#[expect(
    clippy::integer_division,
    clippy::integer_division_remainder_used,
    reason = "the opposite node sits half the ring away"
)]
fn key_nodes(
    graph: &Graph,
    ring: &[EntityId],
    points: &[Coord<f64>],
) -> (Vec<EntityId>, Vec<Coord<f64>>) {
    let (mut keys, mut key_points): (Vec<EntityId>, Vec<Coord<f64>>) = ring
        .iter()
        .zip(points)
        .filter(|(id, _)| graph.parent_ways(id).len() != 1)
        .map(|(id, point)| (id.clone(), *point))
        .unzip();
    if keys.is_empty() {
        keys.push(ring[0].clone());
        key_points.push(points[0]);
    }
    if keys.len() == 1 {
        let index = ring.iter().position(|id| *id == keys[0]).unwrap_or(0);
        let opposite = (index + ring.len() / 2) % ring.len();
        keys.push(ring[opposite].clone());
        key_points.push(points[opposite]);
    }
    (keys, key_points)
}

/// Insert `added` between `start` and `end` in every other way where the two
/// are neighbours, following that way's direction.
fn thread_shared(
    mut graph: Graph,
    way: &Way,
    [start, end]: [&EntityId; 2],
    added: &[EntityId],
) -> Result<Graph, ActionError> {
    let forwards = direction(&way.nodes, start, end);
    for shared in graph.parent_ways(start) {
        if shared.id == way.id || !shared.are_adjacent(start, end) {
            continue;
        }
        let mut inserted = added.to_vec();
        let mut insert_at = last_position(&shared.nodes, end).unwrap_or(0);
        if direction(&shared.nodes, start, end) != forwards {
            inserted.reverse();
            insert_at = last_position(&shared.nodes, start).unwrap_or(0);
        }
        let mut threaded = (*shared).clone();
        for (k, id) in inserted.into_iter().enumerate() {
            threaded = threaded.add_node(id, Some(insert_at + k))?;
        }
        graph = graph.replace(threaded);
    }
    Ok(graph)
}

impl<P: Projection> Action for Circularize<P> {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        self.apply_at(graph, 1.0)
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "ring positions wrap modulo the ring length"
    )]
    fn apply_at(&self, graph: &Graph, t: f64) -> Result<Graph, ActionError> {
        let way = graph.way(&self.way_id)?;
        let mut origins: HashMap<EntityId, Coord<f64>> = HashMap::new();
        for node in graph.child_nodes(&way)? {
            origins.entry(node.id.clone()).or_insert(node.loc);
        }

        let mut graph = if way.is_convex(graph) == Some(false) {
            self.make_convex(graph.clone())?
        } else {
            graph.clone()
        };

        let mut ring = ring_ids(&way);
        let points = self.project_all(&graph, &ring)?;
        let Some(circle) = Circle::fit(&points) else {
            return Ok(graph);
        };
        let (keys, mut key_points) = key_nodes(&graph, &ring, &points);
        let layout = Layout {
            way,
            circle,
            origins,
            t: clamp_t(t),
        };

        for i in 0..keys.len() {
            let next = (i + 1) % keys.len();
            key_points[i] = layout.circle.push_out(key_points[i]);
            graph = self.settle(graph, &layout, &keys[i], key_points[i])?;
            graph = self.fill_arc(
                graph,
                &mut ring,
                &layout,
                [(&keys[i], key_points[i]), (&keys[next], key_points[next])],
            )?;
        }

        if let Some(first) = ring.first().cloned() {
            ring.push(first);
        }
        let circled = graph.way(&self.way_id)?.as_ref().clone().with_nodes(ring);
        Ok(graph.replace(circled))
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "ring positions wrap modulo the ring length"
    )]
    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let Ok(way) = graph.way(&self.way_id) else {
            return Some(DisabledReason::NotEligible);
        };
        if !way.is_closed() {
            return Some(DisabledReason::NotClosed);
        }
        let Ok(points) = self.project_all(graph, &ring_ids(&way)) else {
            return Some(DisabledReason::NotEligible);
        };
        let hull = convex_hull(&points);
        if hull.len() != points.len() || hull.len() < 3 {
            return None;
        }
        let centroid = polygon_centroid(&points)?;
        let squared = |p: Coord<f64>| (p.x - centroid.x).powi(2) + (p.y - centroid.y).powi(2);
        let radius = squared(points[0]);
        if hull.iter().any(|&p| (squared(p) - radius).abs() > 0.05 * radius) {
            return None;
        }

        let limit = self.max_angle() + 1f64.to_radians();
        for (i, &p) in hull.iter().enumerate() {
            let q = hull[(i + 1) % hull.len()];
            let mut angle = ((q.y - centroid.y).atan2(q.x - centroid.x)
                - (p.y - centroid.y).atan2(p.x - centroid.x))
            .abs();
            if angle > PI {
                angle = 2.0 * PI - angle;
            }
            if angle > limit {
                return None;
            }
        }
        Some(DisabledReason::AlreadyCircular)
    }

    fn transitionable(&self) -> bool {
        true
    }
}
