//! Extract a point feature from a vertex, way or relation.

use geo::Coord;

use crate::entity::{Entity, Geometry, Node, OsmEntity};
use crate::error::{ActionError, DisabledReason};
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};
use crate::projection::Projection;
use crate::tags::Tags;

use super::Action;
use super::scale::all_nodes;

/// Tags an area keeps for itself.
const RETAINED_KEYS: &[&str] = &["area"];
/// Tags both the area and the extracted point carry.
const SHARED_KEYS: &[&str] = &["source", "wheelchair"];
/// Tags a building keeps for itself.
const BUILDING_KEYS: &[&str] = &["architect", "building", "height", "layer"];
const BUILDING_PREFIXES: &[&str] = &["building:", "roof:"];
const INDOOR_AREAS: &[&str] = &["area", "corridor", "elevator", "level", "room"];

fn is_building(tags: &Tags) -> bool {
    ["building", "building:part"]
        .iter()
        .any(|key| tags.get(*key).is_some_and(|v| v != "no"))
}

/// Tags moved off `entity`: what the entity keeps and what the point gets.
fn split_tags(entity: &Entity, geometry: Geometry) -> (Tags, Tags) {
    let tags = entity.tags();
    let building = is_building(tags);
    let indoor_area = geometry == Geometry::Area
        && tags
            .get("indoor")
            .is_some_and(|v| INDOOR_AREAS.contains(&v.as_str()));

    let mut kept = Tags::new();
    let mut point = Tags::new();
    for (key, value) in tags {
        let stays = (entity.kind() == EntityKind::Relation && key == "type")
            || RETAINED_KEYS.contains(&key.as_str())
            || (building
                && (BUILDING_KEYS.contains(&key.as_str())
                    || BUILDING_PREFIXES.iter().any(|p| key.starts_with(p))))
            || (indoor_area && key == "indoor");
        if stays {
            kept.insert(key.clone(), value.clone());
            continue;
        }
        point.insert(key.clone(), value.clone());
        let shared = SHARED_KEYS.contains(&key.as_str())
            || (indoor_area && key == "level")
            || key.strip_prefix("addr:").is_some_and(|rest| !rest.is_empty());
        if shared {
            kept.insert(key.clone(), value.clone());
        }
    }
    if !building && !indoor_area && geometry == Geometry::Area {
        kept.insert("area".to_owned(), "yes".to_owned());
    }
    (kept, point)
}

/// Split a point feature off an entity.
///
/// A vertex is detached from its parents: a fresh untagged node takes its
/// place in every way and relation, and the original node, tags and
/// history included, stays behind as a standalone point. A way or
/// relation keeps its geometry and gives up its feature tags to a new
/// node placed at the mean of its node locations.
#[derive(Debug, Clone)]
pub struct Extract<P> {
    entity_id: EntityId,
    projection: P,
    new_node_id: EntityId,
}

impl<P: Projection> Extract<P> {
    /// Extract from `entity_id`.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>, projection: P) -> Self {
        Self {
            entity_id: entity_id.into(),
            projection,
            new_node_id: EntityId::next(EntityKind::Node),
        }
    }

    /// Use `id` for the node this action creates.
    #[must_use]
    pub fn with_new_node_id(mut self, id: impl Into<EntityId>) -> Self {
        self.new_node_id = id.into();
        self
    }

    /// Id of the standalone point once the action is applied to `graph`.
    #[must_use]
    pub fn extracted_node_id(&self, graph: &Graph) -> &EntityId {
        match graph.has_entity(&self.entity_id) {
            Some(Entity::Node(_)) => &self.entity_id,
            _ => &self.new_node_id,
        }
    }

    fn extract_from_node(&self, node: &Node, graph: &Graph) -> Graph {
        let mut graph = graph.replace(Node::new(self.new_node_id.clone(), node.loc));
        for way in graph.parent_ways(&node.id) {
            graph = graph.replace(way.replace_node(&node.id, &self.new_node_id));
        }
        for relation in graph.parent_relations(&node.id) {
            if let Some(replaced) =
                relation.replace_member(&node.id, &self.new_node_id, EntityKind::Node, false)
            {
                graph = graph.replace(replaced);
            }
        }
        graph
    }

    /// Mean projected location of the entity's distinct nodes.
    fn anchor(&self, entity: &Entity, graph: &Graph) -> Result<Option<Coord<f64>>, ActionError> {
        let nodes = all_nodes(std::slice::from_ref(&self.entity_id), graph);
        if nodes.is_empty() {
            return Ok(None);
        }
        let sum = nodes.iter().try_fold(Coord { x: 0.0, y: 0.0 }, |sum, id| {
            Ok::<_, ActionError>(sum + self.projection.project(graph.node(id)?.loc))
        })?;
        #[expect(clippy::cast_precision_loss, reason = "node counts are small")]
        let count = nodes.len() as f64;
        let loc = self.projection.invert(sum / count);
        Ok(Some(if loc.x.is_finite() && loc.y.is_finite() {
            loc
        } else {
            entity.extent(graph).center()
        }))
    }

    fn extract_from_feature(&self, entity: &Entity, graph: &Graph) -> Result<Graph, ActionError> {
        let Some(loc) = self.anchor(entity, graph)? else {
            return Ok(graph.clone());
        };
        let (kept, point) = split_tags(entity, entity.geometry(graph));
        let extracted = Node::new(self.new_node_id.clone(), loc).with_tags(point);
        Ok(graph.replace(extracted).replace(entity.with_tags(kept)))
    }
}

impl<P: Projection> Action for Extract<P> {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        match graph.entity(&self.entity_id)? {
            Entity::Node(node) => Ok(self.extract_from_node(&node, graph)),
            entity => self.extract_from_feature(&entity, graph),
        }
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let eligible = match graph.has_entity(&self.entity_id) {
            Some(Entity::Node(node)) => !graph.parent_ways(&node.id).is_empty(),
            Some(entity) => entity.has_interesting_tags(),
            None => false,
        };
        (!eligible).then_some(DisabledReason::NotEligible)
    }
}
