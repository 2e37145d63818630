//! Replace an entity's tags.

use crate::error::ActionError;
use crate::graph::Graph;
use crate::id::EntityId;
use crate::tags::Tags;

use super::Action;

/// Set the complete tag map of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTags {
    entity_id: EntityId,
    tags: Tags,
}

impl ChangeTags {
    /// Give `entity_id` exactly `tags`.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>, tags: Tags) -> Self {
        Self {
            entity_id: entity_id.into(),
            tags,
        }
    }
}

impl Action for ChangeTags {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let entity = graph.entity(&self.entity_id)?;
        Ok(graph.replace(entity.with_tags(self.tags.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Node, OsmEntity};
    use crate::tags::tags_from;
    use geo::Coord;

    #[test]
    fn replaces_all_tags() {
        let node = Node::new("n1", Coord { x: 0.0, y: 0.0 })
            .with_tags(tags_from([("amenity", "cafe"), ("name", "Blue")]));
        let graph = Graph::new([node.into()]);
        let tags = tags_from([("shop", "bakery")]);
        let result = ChangeTags::new("n1", tags.clone()).apply(&graph).unwrap();
        assert_eq!(result.entity(&"n1".into()).unwrap().tags(), &tags);
    }
}
