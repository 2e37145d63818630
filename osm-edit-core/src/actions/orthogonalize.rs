//! Square the corners of a way.

use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use geo::Coord;
use serde::Deserialize;

use crate::entity::{Node, OsmEntity, Way};
use crate::error::{ActionError, DisabledReason};
use crate::geom::{interp, vec_dot, vec_length};
use crate::graph::Graph;
use crate::id::EntityId;
use crate::projection::Projection;

use super::delete::delete_node;
use super::{Action, clamp_t};

const ITERATIONS: usize = 1000;

/// Tolerances for squaring.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrthogonalizeOptions {
    /// Corners within this many degrees of a right angle or of a straight
    /// line are squared; other corners are left alone.
    pub threshold_degrees: f64,
    /// Scores below this count as square.
    pub epsilon: f64,
}

impl Default for OrthogonalizeOptions {
    fn default() -> Self {
        Self {
            threshold_degrees: 13.0,
            epsilon: 1e-4,
        }
    }
}

/// Cosine limits derived from [`OrthogonalizeOptions`].
#[derive(Debug, Clone, Copy)]
struct Bounds {
    /// Below this a corner is nearly square.
    lower: f64,
    /// Above this a corner is nearly straight.
    upper: f64,
    epsilon: f64,
}

/// Positions whose corners are scored: all of a ring, the interior of a path.
const fn scored_range(closed: bool, len: usize) -> Range<usize> {
    if closed { 0..len } else { 1..len.saturating_sub(1) }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "ring positions wrap modulo the ring length"
)]
fn neighbours<T: Clone>(items: &[T], i: usize) -> (T, T) {
    let len = items.len();
    (items[(i + len - 1) % len].clone(), items[(i + 1) % len].clone())
}

/// Unit vector along `v`; the zero vector stays zero.
fn normalize(v: Coord<f64>) -> Coord<f64> {
    let length = v.x.hypot(v.y);
    if length > 0.0 { v / length } else { v }
}

/// Cosine of the corner at `origin` between `a` and `b`; 1 when the corner
/// is degenerate.
fn normalized_dot(a: Coord<f64>, b: Coord<f64>, origin: Coord<f64>) -> f64 {
    if origin == a || origin == b {
        return 1.0;
    }
    let (p, q) = (normalize(a - origin), normalize(b - origin));
    p.x * q.x + p.y * q.y
}

/// Closest point to `point` on the polyline `path`.
fn nearest_on_path(point: Coord<f64>, path: &[Coord<f64>]) -> Option<Coord<f64>> {
    path.windows(2)
        .map(|pair| {
            let (start, end) = (pair[0], pair[1]);
            let length = vec_dot(end, end, start);
            let along = if length > 0.0 {
                vec_dot(point, end, start) / length
            } else {
                0.0
            };
            let target = interp(start, end, along.clamp(0.0, 1.0));
            (vec_length(target, point), target)
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, target)| target)
}

impl Bounds {
    fn new(options: &OrthogonalizeOptions) -> Self {
        Self {
            lower: (90.0 - options.threshold_degrees).to_radians().cos(),
            upper: options.threshold_degrees.to_radians().cos(),
            epsilon: options.epsilon,
        }
    }

    /// The corner cosine `d` as scored, or `None` for a corner that is
    /// neither nearly square nor nearly straight.
    const fn filter(self, d: f64, allow_straight: bool) -> Option<f64> {
        let magnitude = d.abs();
        if magnitude < self.epsilon || (allow_straight && (magnitude - 1.0).abs() < self.epsilon) {
            Some(0.0)
        } else if magnitude < self.lower || magnitude > self.upper {
            Some(d)
        } else {
            None
        }
    }

    /// Total distance of the scored corners from square or straight.
    fn score(self, coords: &[Coord<f64>], closed: bool) -> f64 {
        scored_range(closed, coords.len())
            .filter_map(|i| {
                let (a, b) = neighbours(coords, i);
                self.filter(normalized_dot(a, b, coords[i]), false)
            })
            .map(|d| 2.0 * (d - 1.0).abs().min(d.abs()).min((d + 1.0).abs()))
            .sum()
    }

    /// `Some(true)` when a corner needs squaring, `Some(false)` when every
    /// scored corner is already square, `None` when no corner qualifies.
    fn needs_squaring(self, coords: &[Coord<f64>], closed: bool, allow_straight: bool) -> Option<bool> {
        let mut verdict = None;
        for i in scored_range(closed, coords.len()) {
            let (a, b) = neighbours(coords, i);
            match self.filter(normalized_dot(a, b, coords[i]), allow_straight) {
                Some(d) if d.abs() > 0.0 => return Some(true),
                Some(_) => verdict = Some(false),
                None => {}
            }
        }
        verdict
    }

    /// Nudge for the corner at `i`, with the corner's absolute cosine when
    /// it is close enough to square to be moved.
    fn motion(self, i: usize, coords: &[Coord<f64>], pinned: &[bool], closed: bool) -> (Coord<f64>, Option<f64>) {
        let zero = Coord { x: 0.0, y: 0.0 };
        let end = !closed && (i == 0 || i + 1 == coords.len());
        if end || pinned[i] {
            return (zero, None);
        }
        let origin = coords[i];
        let (a, b) = neighbours(coords, i);
        let (p, q) = (a - origin, b - origin);
        let scale = 2.0 * p.x.hypot(p.y).min(q.x.hypot(q.y));
        let (p, q) = (normalize(p), normalize(q));
        let dotp = p.x * q.x + p.y * q.y;
        if dotp.abs() < self.lower {
            (normalize(p + q) * (0.1 * dotp * scale), Some(dotp.abs()))
        } else {
            (zero, None)
        }
    }
}

/// A way's corners ready for squaring.
struct Ring {
    /// Graph holding the cleaned way.
    graph: Graph,
    closed: bool,
    nodes: Vec<Rc<Node>>,
    coords: Vec<Coord<f64>>,
    /// Nodes visited more than once, which never move.
    pinned: Vec<bool>,
}

/// Square the corners of a way, or a single vertex of it.
///
/// Corners close to a right angle are nudged towards one until the way
/// scores as square. Corners close to a straight line are projected onto
/// the squared outline, or deleted at `t = 1` when nothing else needs them.
/// Corners in between are left where they are.
#[derive(Debug, Clone)]
pub struct Orthogonalize<P> {
    way_id: EntityId,
    vertex_id: Option<EntityId>,
    projection: P,
    options: OrthogonalizeOptions,
}

impl<P: Projection> Orthogonalize<P> {
    /// Square every corner of `way_id`.
    #[must_use]
    pub fn new(way_id: impl Into<EntityId>, projection: P) -> Self {
        Self {
            way_id: way_id.into(),
            vertex_id: None,
            projection,
            options: OrthogonalizeOptions::default(),
        }
    }

    /// Square only the corner at `vertex_id`.
    #[must_use]
    pub fn with_vertex(mut self, vertex_id: impl Into<EntityId>) -> Self {
        self.vertex_id = Some(vertex_id.into());
        self
    }

    /// Replace the default tolerances.
    #[must_use]
    pub const fn with_options(mut self, options: OrthogonalizeOptions) -> Self {
        self.options = options;
        self
    }

    fn bounds(&self) -> Bounds {
        Bounds::new(&self.options)
    }

    /// The way without repeated neighbours or a `nonsquare` marker. In
    /// vertex mode only the vertex and its two neighbours remain, or nothing
    /// when the vertex is an end or not on the way.
    fn ring(&self, graph: &Graph) -> Result<Ring, ActionError> {
        let way = graph.way(&self.way_id)?;
        let mut ids = way.nodes.clone();
        ids.dedup();
        let mut tags = way.tags.clone();
        tags.remove("nonsquare");
        let cleaned = Way::clone(&way).with_nodes(ids).with_tags(tags);
        let closed = cleaned.is_closed();

        let mut nodes = graph.child_nodes(&cleaned)?;
        if closed {
            nodes.pop();
        }
        if let Some(vertex) = &self.vertex_id {
            nodes = scored_range(closed, nodes.len())
                .find(|&i| nodes[i].id == *vertex)
                .map(|i| {
                    let (prev, next) = neighbours(&nodes, i);
                    vec![prev, Rc::clone(&nodes[i]), next]
                })
                .unwrap_or_default();
        }

        let pinned = {
            let mut counts: HashMap<&EntityId, usize> = HashMap::new();
            for node in &nodes {
                *counts.entry(&node.id).or_default() += 1;
            }
            nodes
                .iter()
                .map(|n| counts.get(&n.id).is_some_and(|&c| c > 1))
                .collect()
        };
        let coords = nodes.iter().map(|n| self.projection.project(n.loc)).collect();
        Ok(Ring {
            graph: graph.replace(cleaned),
            closed,
            nodes,
            coords,
            pinned,
        })
    }

    /// Move the single most nearly square corner of a three node ring.
    fn square_corner(&self, ring: Ring, t: f64) -> Graph {
        let bounds = self.bounds();
        let Ring {
            graph,
            closed,
            nodes,
            mut coords,
            pinned,
        } = ring;
        let mut corner = (0, 1.0);
        for _ in 0..ITERATIONS {
            let motions: Vec<Coord<f64>> = (0..coords.len())
                .map(|i| {
                    let (motion, dotp) = bounds.motion(i, &coords, &pinned, closed);
                    if let Some(dotp) = dotp {
                        corner = (i, dotp);
                    }
                    motion
                })
                .collect();
            coords[corner.0] = coords[corner.0] + motions[corner.0];
            if corner.1 < bounds.epsilon {
                break;
            }
        }
        let node = &nodes[corner.0];
        let target = self.projection.invert(coords[corner.0]);
        graph.replace(node.move_to(interp(node.loc, target, t)))
    }

    fn square_ring(&self, ring: Ring, t: f64) -> Result<Graph, ActionError> {
        let bounds = self.bounds();
        let Ring {
            mut graph,
            closed,
            nodes,
            coords,
            pinned,
        } = ring;

        let (straights, corners): (Vec<usize>, Vec<usize>) = (0..coords.len()).partition(|&i| {
            let interior = closed || (i > 0 && i + 1 < coords.len());
            interior && {
                let (a, b) = neighbours(&coords, i);
                normalized_dot(a, b, coords[i]).abs() > bounds.upper
            }
        });

        let original: Vec<Coord<f64>> = corners.iter().map(|&i| coords[i]).collect();
        let corner_pinned: Vec<bool> = corners.iter().map(|&i| pinned[i]).collect();
        let mut moving = original.clone();
        let mut best = original.clone();
        let mut best_score = f64::INFINITY;
        for _ in 0..ITERATIONS {
            let motions: Vec<Coord<f64>> = (0..moving.len())
                .map(|i| bounds.motion(i, &moving, &corner_pinned, closed).0)
                .collect();
            for (point, motion) in moving.iter_mut().zip(motions) {
                *point = *point + motion;
            }
            let score = bounds.score(&moving, closed);
            if score < best_score {
                best.clone_from(&moving);
                best_score = score;
            }
            if best_score < bounds.epsilon {
                break;
            }
        }
        if best_score >= bounds.epsilon {
            log::debug!("way {} not fully squared, score {best_score}", self.way_id);
        }

        for ((&i, &before), &after) in corners.iter().zip(&original).zip(&best) {
            if before != after {
                let node = &nodes[i];
                let target = self.projection.invert(after);
                graph = graph.replace(node.move_to(interp(node.loc, target, t)));
            }
        }

        let mut outline = best;
        if closed {
            if let Some(&first) = outline.first() {
                outline.push(first);
            }
        }
        for &i in &straights {
            if pinned[i] {
                continue;
            }
            let node = graph.node(&nodes[i].id)?;
            let spare = graph.parent_ways(&node.id).len() == 1
                && graph.parent_relations(&node.id).is_empty()
                && !node.has_interesting_tags();
            if t >= 1.0 && spare {
                graph = delete_node(graph, &node.id)?;
            } else if let Some(target) = nearest_on_path(coords[i], &outline) {
                let target = self.projection.invert(target);
                graph = graph.replace(node.move_to(interp(node.loc, target, t)));
            }
        }
        Ok(graph)
    }
}

impl<P: Projection> Action for Orthogonalize<P> {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        self.apply_at(graph, 1.0)
    }

    fn apply_at(&self, graph: &Graph, t: f64) -> Result<Graph, ActionError> {
        let t = clamp_t(t);
        let ring = self.ring(graph)?;
        if self.vertex_id.is_some() && ring.nodes.len() != 3 {
            return Ok(ring.graph);
        }
        if ring.coords.len() == 3 {
            return Ok(self.square_corner(ring, t));
        }
        self.square_ring(ring, t)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let Ok(ring) = self.ring(graph) else {
            return Some(DisabledReason::NotEligible);
        };
        let vertex_mode = self.vertex_id.is_some();
        if vertex_mode && ring.nodes.len() != 3 {
            return Some(DisabledReason::EndVertex);
        }
        match self.bounds().needs_squaring(&ring.coords, ring.closed, vertex_mode) {
            None => Some(DisabledReason::NotSquarish),
            Some(false) => Some(DisabledReason::SquareEnough),
            Some(true) => None,
        }
    }

    fn transitionable(&self) -> bool {
        true
    }
}
