//! Build or extend a multipolygon from closed ways and multipolygons.

use std::rc::Rc;

use geo::Coord;

use crate::entity::{Entity, Member, Relation, Way};
use crate::error::{ActionError, DisabledReason, GraphError};
use crate::geom::polygon_contains_polygon;
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind, oldest_id};
use crate::join_ways::join_ways;
use crate::tags::{Tags, merge_tags};

use super::Action;

/// Merge closed ways and multipolygon relations into one multipolygon.
///
/// Rings are classified by nesting depth: rings inside no other ring are
/// `outer`, rings inside those are `inner`, the next level `outer` again.
/// The oldest selected multipolygon survives; otherwise a new relation is
/// made. Tags of closed outer ways move to the relation, never `area`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolygon {
    ids: Vec<EntityId>,
    relation_id: Option<EntityId>,
}

#[derive(Default)]
struct Selection {
    closed_ways: Vec<Rc<Way>>,
    multipolygons: Vec<Rc<Relation>>,
    others: usize,
}

/// One ring and the ways it is made of.
struct Ring {
    way_ids: Vec<EntityId>,
    locs: Vec<Coord<f64>>,
}

fn ring_locs(graph: &Graph, nodes: &[EntityId]) -> Result<Vec<Coord<f64>>, GraphError> {
    nodes.iter().map(|id| graph.node(id).map(|n| n.loc)).collect()
}

/// Assign alternating outer/inner roles by containment depth.
fn classify(rings: &[Ring]) -> Vec<Member> {
    let inside: Vec<Vec<bool>> = rings
        .iter()
        .enumerate()
        .map(|(i, ring)| {
            rings
                .iter()
                .enumerate()
                .map(|(k, other)| i != k && polygon_contains_polygon(&other.locs, &ring.locs))
                .collect()
        })
        .collect();

    let mut members = Vec::new();
    let mut remaining: Vec<usize> = (0..rings.len()).collect();
    let mut outer = true;
    while !remaining.is_empty() {
        let (nested, free): (Vec<usize>, Vec<usize>) = remaining
            .iter()
            .partition(|&&i| remaining.iter().any(|&k| inside[i][k]));
        // Rings that all contain one another have no free level left.
        let (level, rest) = if free.is_empty() { (nested, Vec::new()) } else { (free, nested) };
        let role = if outer { "outer" } else { "inner" };
        for i in level {
            members.extend(rings[i].way_ids.iter().map(|id| Member::way(id.clone(), role)));
        }
        remaining = rest;
        outer = !outer;
    }
    members
}

impl MergePolygon {
    /// Merge the listed entities.
    #[must_use]
    pub const fn new(ids: Vec<EntityId>) -> Self {
        Self {
            ids,
            relation_id: None,
        }
    }

    /// Id for the relation when none of the selection is a multipolygon.
    #[must_use]
    pub fn with_relation_id(mut self, id: impl Into<EntityId>) -> Self {
        self.relation_id = Some(id.into());
        self
    }

    fn select(&self, graph: &Graph) -> Result<Selection, GraphError> {
        let mut selection = Selection::default();
        for id in &self.ids {
            match graph.entity(id)? {
                Entity::Way(way) if way.is_closed() => selection.closed_ways.push(way),
                Entity::Relation(relation) if relation.is_multipolygon() => {
                    selection.multipolygons.push(relation);
                }
                _ => selection.others += 1,
            }
        }
        Ok(selection)
    }

    fn rings(selection: &Selection, graph: &Graph) -> Result<Vec<Ring>, GraphError> {
        let mut rings = Vec::new();
        for multipolygon in &selection.multipolygons {
            for chain in join_ways(&multipolygon.members, graph).chains {
                rings.push(Ring {
                    way_ids: chain.items.iter().map(|item| item.member.id.clone()).collect(),
                    locs: ring_locs(graph, &chain.nodes)?,
                });
            }
        }
        for way in &selection.closed_ways {
            rings.push(Ring {
                way_ids: vec![way.id.clone()],
                locs: ring_locs(graph, &way.nodes)?,
            });
        }
        Ok(rings)
    }
}

impl Action for MergePolygon {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let selection = self.select(graph)?;
        let members = classify(&Self::rings(&selection, graph)?);

        let mp_ids: Vec<EntityId> = selection.multipolygons.iter().map(|r| r.id.clone()).collect();
        let mut relation = oldest_id(&mp_ids).and_then(|id| graph.relation(id).ok()).map_or_else(
            || {
                let id = self
                    .relation_id
                    .clone()
                    .unwrap_or_else(|| EntityId::next(EntityKind::Relation));
                Relation::new(id, Vec::new()).with_tags(Tags::from([(
                    "type".to_owned(),
                    "multipolygon".to_owned(),
                )]))
            },
            |existing| Relation::clone(&existing),
        );

        let mut graph = graph.clone();
        for multipolygon in &selection.multipolygons {
            if multipolygon.id == relation.id {
                continue;
            }
            if let Some(tags) = merge_tags(&relation.tags, &multipolygon.tags) {
                relation = relation.with_tags(tags);
            }
            graph = graph.remove(&multipolygon.id);
        }

        for way in &selection.closed_ways {
            let is_outer = members.iter().any(|m| m.id == way.id && m.role == "outer");
            if !is_outer {
                continue;
            }
            let mut tags = way.tags.clone();
            tags.remove("area");
            if let Some(merged) = merge_tags(&relation.tags, &tags) {
                relation = relation.with_tags(merged);
            }
            graph = graph.replace(Way::clone(way).with_tags(Tags::new()));
        }

        let mut tags = relation.tags.clone();
        tags.remove("area");
        Ok(graph.replace(relation.with_tags(tags).with_members(members)))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let Ok(selection) = self.select(graph) else {
            return Some(DisabledReason::NotEligible);
        };
        if selection.others > 0 || selection.closed_ways.len() + selection.multipolygons.len() < 2 {
            return Some(DisabledReason::NotEligible);
        }
        if !selection.multipolygons.iter().all(|r| r.is_complete(graph)) {
            return Some(DisabledReason::IncompleteRelation);
        }

        if selection.multipolygons.is_empty() {
            let mut shared: Option<Vec<EntityId>> = None;
            for way in &selection.closed_ways {
                let parents: Vec<EntityId> = graph
                    .parent_multipolygons(&way.id)
                    .iter()
                    .filter(|r| r.members.len() == selection.closed_ways.len())
                    .map(|r| r.id.clone())
                    .collect();
                shared = Some(match shared {
                    None => parents,
                    Some(so_far) => so_far.into_iter().filter(|id| parents.contains(id)).collect(),
                });
            }
            // An identical multipolygon already exists.
            return shared
                .is_some_and(|ids| !ids.is_empty())
                .then_some(DisabledReason::NotEligible);
        }

        let already_member = selection.closed_ways.iter().any(|way| {
            graph
                .parent_multipolygons(&way.id)
                .iter()
                .any(|parent| selection.multipolygons.iter().any(|r| r.id == parent.id))
        });
        already_member.then_some(DisabledReason::NotEligible)
    }
}
