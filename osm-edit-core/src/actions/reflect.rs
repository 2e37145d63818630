//! Mirror a selection across an axis of its bounding rectangle.

use geo::Coord;

use crate::entity::Entity;
use crate::error::{ActionError, DisabledReason};
use crate::geom::{interp, smallest_surrounding_rectangle, vec_length};
use crate::graph::Graph;
use crate::id::EntityId;
use crate::projection::Projection;

use super::scale::all_nodes;
use super::{Action, clamp_t};

/// Reflect every node of the selection across the long (or short) axis of
/// symmetry of its smallest surrounding rectangle.
#[derive(Debug, Clone)]
pub struct Reflect<P> {
    ids: Vec<EntityId>,
    projection: P,
    use_long_axis: bool,
}

impl<P: Projection> Reflect<P> {
    /// Reflect `ids` across the long axis.
    #[must_use]
    pub const fn new(ids: Vec<EntityId>, projection: P) -> Self {
        Self {
            ids,
            projection,
            use_long_axis: true,
        }
    }

    /// Reflect across the short axis instead.
    #[must_use]
    pub const fn short_axis(mut self) -> Self {
        self.use_long_axis = false;
        self
    }

    fn axis(&self, points: &[Coord<f64>]) -> Option<(Coord<f64>, Coord<f64>)> {
        let r = smallest_surrounding_rectangle(points)?;
        let mid = |a: Coord<f64>, b: Coord<f64>| (a + b) / 2.0;
        let (p1, q1) = (mid(r[0], r[1]), mid(r[2], r[3]));
        let (p2, q2) = (mid(r[3], r[4]), mid(r[1], r[2]));
        let is_long = vec_length(p1, q1) > vec_length(p2, q2);
        Some(if self.use_long_axis == is_long {
            (p1, q1)
        } else {
            (p2, q2)
        })
    }
}

/// Mirror image of `c` across the line through `p` and `q`.
fn mirror(c: Coord<f64>, p: Coord<f64>, q: Coord<f64>) -> Coord<f64> {
    let d = q - p;
    let length = d.x * d.x + d.y * d.y;
    if length <= 0.0 {
        return c;
    }
    let a = (d.x * d.x - d.y * d.y) / length;
    let b = 2.0 * d.x * d.y / length;
    let v = c - p;
    Coord {
        x: a * v.x + b * v.y + p.x,
        y: b * v.x - a * v.y + p.y,
    }
}

impl<P: Projection> Action for Reflect<P> {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        self.apply_at(graph, 1.0)
    }

    fn apply_at(&self, graph: &Graph, t: f64) -> Result<Graph, ActionError> {
        let t = clamp_t(t);
        let nodes = all_nodes(&self.ids, graph)
            .iter()
            .map(|id| graph.node(id))
            .collect::<Result<Vec<_>, _>>()?;
        let points: Vec<Coord<f64>> = nodes.iter().map(|n| self.projection.project(n.loc)).collect();
        let Some((p, q)) = self.axis(&points) else {
            return Ok(graph.clone());
        };
        graph.try_update(|graph| {
            for (node, &point) in nodes.iter().zip(&points) {
                let target = self.projection.invert(mirror(point, p, q));
                graph.replace(node.move_to(interp(node.loc, target, t)));
            }
            Ok(())
        })
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let incomplete = self.ids.iter().any(|id| match graph.has_entity(id) {
            Some(Entity::Relation(relation)) => !relation.is_complete(graph),
            _ => false,
        });
        if incomplete {
            return Some(DisabledReason::IncompleteRelation);
        }
        all_nodes(&self.ids, graph)
            .is_empty()
            .then_some(DisabledReason::NotEligible)
    }

    fn transitionable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Member, Relation};
    use crate::test_support::{IdentityProjection, ids, node, way};
    use rstest::{fixture, rstest};

    /// A trapezoid whose long axis runs along `y = 1`.
    #[fixture]
    fn trapezoid() -> Graph {
        Graph::new([
            node("a", 0.0, 0.0),
            node("b", 4.0, 0.0),
            node("c", 4.0, 2.0),
            node("d", 1.0, 2.0),
            way("-", &["a", "b", "c", "d", "a"]),
        ])
    }

    fn near(graph: &Graph, id: &str, x: f64, y: f64) -> bool {
        let loc = graph.node(&id.into()).unwrap().loc;
        (loc.x - x).abs() < 1e-6 && (loc.y - y).abs() < 1e-6
    }

    #[rstest]
    fn reflects_across_the_long_axis(trapezoid: Graph) {
        let result = Reflect::new(ids(&["-"]), IdentityProjection)
            .apply(&trapezoid)
            .unwrap();
        assert!(near(&result, "a", 0.0, 2.0));
        assert!(near(&result, "b", 4.0, 2.0));
        assert!(near(&result, "c", 4.0, 0.0));
        assert!(near(&result, "d", 1.0, 0.0));
        assert_eq!(result.way(&"-".into()).unwrap().nodes.len(), 5);
    }

    #[rstest]
    fn reflects_across_the_short_axis(trapezoid: Graph) {
        let result = Reflect::new(ids(&["-"]), IdentityProjection)
            .short_axis()
            .apply(&trapezoid)
            .unwrap();
        assert!(near(&result, "a", 4.0, 0.0));
        assert!(near(&result, "b", 0.0, 0.0));
        assert!(near(&result, "c", 0.0, 2.0));
        assert!(near(&result, "d", 3.0, 2.0));
        assert_eq!(result.way(&"-".into()).unwrap().nodes.len(), 5);
    }

    #[rstest]
    fn transitions_towards_the_mirror_image(trapezoid: Graph) {
        let action = Reflect::new(ids(&["-"]), IdentityProjection);
        let start = action.apply_at(&trapezoid, 0.0).unwrap();
        assert!(near(&start, "a", 0.0, 0.0));
        assert!(near(&start, "d", 1.0, 2.0));

        let halfway = action.apply_at(&trapezoid, 0.5).unwrap();
        assert!(near(&halfway, "a", 0.0, 1.0));
        assert!(near(&halfway, "b", 4.0, 1.0));
        assert!(near(&halfway, "c", 4.0, 1.0));
        assert!(near(&halfway, "d", 1.0, 1.0));
    }

    #[rstest]
    fn incomplete_relations_are_disabled(trapezoid: Graph) {
        let graph = trapezoid.replace(Relation::new(
            "r",
            vec![Member::way("-", "outer"), Member::way("w9", "inner")],
        ));
        assert_eq!(
            Reflect::new(ids(&["r"]), IdentityProjection).disabled(&graph),
            Some(DisabledReason::IncompleteRelation)
        );
    }

    #[rstest]
    #[case::closed_way(&["-"], None)]
    #[case::missing(&["w9"], Some(DisabledReason::NotEligible))]
    fn eligibility(trapezoid: Graph, #[case] selected: &[&str], #[case] expected: Option<DisabledReason>) {
        assert_eq!(
            Reflect::new(ids(selected), IdentityProjection).disabled(&trapezoid),
            expected
        );
    }
}
