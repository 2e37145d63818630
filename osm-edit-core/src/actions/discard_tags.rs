//! Strip obsolete tags from edited entities.

use crate::config::DiscardTags as DiscardKeys;
use crate::difference::Difference;
use crate::entity::OsmEntity;
use crate::error::ActionError;
use crate::graph::Graph;
use crate::tags::Tags;

use super::Action;

/// Remove discardable keys, and tags with empty values, from every entity
/// created or modified in `difference`.
///
/// Entities with nothing to remove are left untouched, so they keep their
/// identity in the resulting graph.
#[derive(Debug, Clone)]
pub struct DiscardTags {
    difference: Difference,
    keys: DiscardKeys,
}

impl DiscardTags {
    /// Clean up the head entities of `difference` using `keys`.
    #[must_use]
    pub const fn new(difference: Difference, keys: DiscardKeys) -> Self {
        Self { difference, keys }
    }
}

impl Action for DiscardTags {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let mut graph = graph.clone();
        let touched = self.difference.modified().into_iter().chain(self.difference.created());
        for entity in touched {
            let kept: Tags = entity
                .tags()
                .iter()
                .filter(|(key, value)| !value.is_empty() && !self.keys.contains(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if kept.len() != entity.tags().len() {
                log::debug!("discarding tags from {}", entity.id());
                graph = graph.replace(entity.with_tags(kept));
            }
        }
        Ok(graph)
    }
}
