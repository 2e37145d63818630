//! Differences between two graphs of one lineage.

use indexmap::{IndexMap, IndexSet};

use crate::entity::{Changes, Entity, Geometry, OsmEntity};
use crate::extent::Extent;
use crate::graph::Graph;
use crate::id::EntityId;

/// Before and after values for one id.
#[derive(Debug, Clone)]
pub struct Change {
    /// The entity in the base graph, if present.
    pub base: Option<Entity>,
    /// The entity in the head graph, if present.
    pub head: Option<Entity>,
}

/// Which aspects of the data changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DidChange {
    /// Something was created.
    pub addition: bool,
    /// Something was deleted.
    pub deletion: bool,
    /// A location, node list or member list changed.
    pub geometry: bool,
    /// Tags or member lists changed.
    pub properties: bool,
}

/// How a summary entry changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Only in the head graph.
    Created,
    /// In both graphs, with differences.
    Modified,
    /// Only in the base graph.
    Deleted,
}

/// One line of a change summary.
#[derive(Debug, Clone)]
pub struct SummaryEntry {
    /// The entity as it should be displayed.
    pub entity: Entity,
    /// The graph `entity` should be resolved against.
    pub graph: Graph,
    /// What happened to it.
    pub change_type: ChangeType,
}

/// The set of entities changed between a base and a head graph.
///
/// Only ids edited in either graph's local layer are compared, so both
/// graphs are expected to share a base. Entities that were replaced with an
/// equal copy do not count as changed.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osm_edit_core::{Graph, Node};
/// use osm_edit_core::difference::Difference;
///
/// let base = Graph::new([Node::new("n1", Coord { x: 0.0, y: 0.0 }).into()]);
/// let head = base.replace(Node::new("n1", Coord { x: 1.0, y: 0.0 }));
/// let diff = Difference::new(&base, &head);
/// assert_eq!(diff.modified().len(), 1);
/// assert!(diff.did_change().geometry);
/// ```
#[derive(Debug, Clone)]
pub struct Difference {
    base: Graph,
    head: Graph,
    changes: IndexMap<EntityId, Change>,
    did_change: DidChange,
}

/// Field-level comparison. Returns `(geometry, properties)` changes.
fn compare(base: &Entity, head: &Entity) -> (bool, bool) {
    match (base, head) {
        (Entity::Relation(b), Entity::Relation(h)) if b.members != h.members => (true, true),
        (Entity::Node(b), Entity::Node(h)) => (b.loc != h.loc, b.tags != h.tags),
        (Entity::Way(b), Entity::Way(h)) => (b.nodes != h.nodes, b.tags != h.tags),
        _ => (false, base.tags() != head.tags()),
    }
}

impl Difference {
    /// Compare `base` with `head`.
    #[must_use]
    pub fn new(base: &Graph, head: &Graph) -> Self {
        let mut diff = Self {
            base: base.clone(),
            head: head.clone(),
            changes: IndexMap::new(),
            did_change: DidChange::default(),
        };
        if base.ptr_eq(head) {
            return diff;
        }
        let ids: IndexSet<EntityId> = head
            .local_entities()
            .chain(base.local_entities())
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            diff.compare_id(id);
        }
        diff
    }

    fn compare_id(&mut self, id: EntityId) {
        let head = self.head.has_entity(&id);
        let base = self.base.has_entity(&id);
        let changed = match (&base, &head) {
            (None, None) => false,
            (Some(b), Some(h)) if b.ptr_eq(h) => false,
            (Some(_), None) => {
                self.did_change.deletion = true;
                true
            }
            (None, Some(_)) => {
                self.did_change.addition = true;
                true
            }
            (Some(b), Some(h)) => {
                let (geometry, properties) = compare(b, h);
                self.did_change.geometry |= geometry;
                self.did_change.properties |= properties;
                geometry || properties
            }
        };
        if changed {
            self.changes.insert(id, Change { base, head });
        }
    }

    /// Changed ids with their before and after values, in discovery order.
    #[must_use]
    pub const fn changes(&self) -> &IndexMap<EntityId, Change> {
        &self.changes
    }

    /// Kinds of change seen.
    #[must_use]
    pub const fn did_change(&self) -> DidChange {
        self.did_change
    }

    /// Head versions of entities present in both graphs.
    #[must_use]
    pub fn modified(&self) -> Vec<Entity> {
        self.changes
            .values()
            .filter(|c| c.base.is_some())
            .filter_map(|c| c.head.clone())
            .collect()
    }

    /// Entities only in the head graph.
    #[must_use]
    pub fn created(&self) -> Vec<Entity> {
        self.changes
            .values()
            .filter(|c| c.base.is_none())
            .filter_map(|c| c.head.clone())
            .collect()
    }

    /// Base versions of entities missing from the head graph.
    #[must_use]
    pub fn deleted(&self) -> Vec<Entity> {
        self.changes
            .values()
            .filter(|c| c.head.is_none())
            .filter_map(|c| c.base.clone())
            .collect()
    }

    /// Ids present in the head graph.
    #[must_use]
    pub fn extant_ids(&self) -> IndexSet<EntityId> {
        self.changes
            .iter()
            .filter(|(_, c)| c.head.is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Union of the before and after extents of every change.
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.changes.values().fold(Extent::empty(), |acc, change| {
            let acc = change
                .head
                .as_ref()
                .map_or(acc, |h| acc.extend(&h.extent(&self.head)));
            change
                .base
                .as_ref()
                .map_or(acc, |b| acc.extend(&b.extent(&self.base)))
        })
    }

    /// User-facing summary of the changes.
    ///
    /// Untagged vertices are folded into their parent ways: moving one
    /// reports the ways as modified instead. Vertices appear on their own
    /// only when their tags change, or when they carry interesting tags
    /// and moved, were created or were deleted.
    #[must_use]
    pub fn summary(&self) -> IndexMap<EntityId, SummaryEntry> {
        let mut result: IndexMap<EntityId, SummaryEntry> = IndexMap::new();
        for change in self.changes.values() {
            let (base, head) = (change.base.as_ref(), change.head.as_ref());
            if let Some(h) = head.filter(|h| h.geometry(&self.head) != Geometry::Vertex) {
                let kind = if base.is_some() {
                    ChangeType::Modified
                } else {
                    ChangeType::Created
                };
                add_entry(&mut result, h, &self.head, kind);
            } else if let Some(b) = base.filter(|b| b.geometry(&self.base) != Geometry::Vertex) {
                add_entry(&mut result, b, &self.base, ChangeType::Deleted);
            } else if let (Some(b), Some(h)) = (base, head) {
                self.summarize_vertex(b, h, &mut result);
            } else if let Some(h) = head.filter(|h| h.has_interesting_tags()) {
                add_entry(&mut result, h, &self.head, ChangeType::Created);
            } else if let Some(b) = base.filter(|b| b.has_interesting_tags()) {
                add_entry(&mut result, b, &self.base, ChangeType::Deleted);
            }
        }
        result
    }

    fn summarize_vertex(
        &self,
        base: &Entity,
        head: &Entity,
        result: &mut IndexMap<EntityId, SummaryEntry>,
    ) {
        let moved = match (base.as_node(), head.as_node()) {
            (Some(b), Some(h)) => b.loc != h.loc,
            _ => false,
        };
        let retagged = base.tags() != head.tags();
        if moved {
            for parent in self.head.parent_ways(head.id()) {
                if !result.contains_key(&parent.id) {
                    add_entry(result, &Entity::Way(parent), &self.head, ChangeType::Modified);
                }
            }
        }
        if retagged || (moved && head.has_interesting_tags()) {
            add_entry(result, head, &self.head, ChangeType::Modified);
        }
    }

    /// Every entity needing a redraw: the changes themselves, the nodes of
    /// changed ways, the members of changed multipolygons and all parent
    /// ways and relations, recursively. Values are the head versions;
    /// `None` marks deletions.
    #[must_use]
    pub fn complete(&self) -> IndexMap<EntityId, Option<Entity>> {
        let mut result: IndexMap<EntityId, Option<Entity>> = IndexMap::new();
        for (id, change) in &self.changes {
            result.insert(id.clone(), change.head.clone());
            let Some(entity) = change.head.as_ref().or(change.base.as_ref()) else {
                continue;
            };
            match entity {
                Entity::Way(_) => {
                    for node in union_children(change) {
                        let resolved = self.head.has_entity(&node);
                        result.insert(node, resolved);
                    }
                }
                Entity::Relation(relation) if relation.is_multipolygon() => {
                    for member in union_children(change) {
                        if let Some(resolved) = self.head.has_entity(&member) {
                            result.insert(member, Some(resolved));
                        }
                    }
                }
                _ => {}
            }
            let parents: Vec<Entity> = self
                .head
                .parent_ways(id)
                .into_iter()
                .map(Entity::Way)
                .chain(self.head.parent_relations(id).into_iter().map(Entity::Relation))
                .collect();
            self.add_parents(parents, &mut result);
        }
        result
    }

    fn add_parents(&self, parents: Vec<Entity>, result: &mut IndexMap<EntityId, Option<Entity>>) {
        let mut stack = parents;
        while let Some(parent) = stack.pop() {
            if result.contains_key(parent.id()) {
                continue;
            }
            stack.extend(
                self.head
                    .parent_relations(parent.id())
                    .into_iter()
                    .map(Entity::Relation),
            );
            result.insert(parent.id().clone(), Some(parent));
        }
    }
}

fn add_entry(
    result: &mut IndexMap<EntityId, SummaryEntry>,
    entity: &Entity,
    graph: &Graph,
    change_type: ChangeType,
) {
    result.insert(
        entity.id().clone(),
        SummaryEntry {
            entity: entity.clone(),
            graph: graph.clone(),
            change_type,
        },
    );
}

/// Children of the head version followed by any extra children of the base
/// version.
fn union_children(change: &Change) -> IndexSet<EntityId> {
    let mut ids: IndexSet<EntityId> = change
        .head
        .as_ref()
        .map(Entity::child_ids)
        .unwrap_or_default()
        .into_iter()
        .collect();
    if let Some(base) = &change.base {
        ids.extend(base.child_ids());
    }
    ids
}

/// Group the difference for upload.
impl From<&Difference> for Changes {
    fn from(diff: &Difference) -> Self {
        Self {
            created: diff.created(),
            modified: diff.modified(),
            deleted: diff.deleted(),
        }
    }
}
