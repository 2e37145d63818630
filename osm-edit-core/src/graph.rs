//! Layered entity snapshots.
//!
//! A [`Graph`] resolves ids through a per-snapshot `local` layer and then a
//! `base` layer shared by every graph forked from the same root. Forking is
//! cheap: the local maps are reference counted and copied on first write.
//! Only [`Graph::rebase`] writes to the shared base.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Deref;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::entity::{Entity, Node, OsmEntity, Relation, Way};
use crate::error::GraphError;
use crate::id::{EntityId, EntityKind};

type ParentIndex = IndexMap<EntityId, IndexSet<EntityId>>;

#[derive(Debug, Default)]
struct BaseLayer {
    entities: HashMap<EntityId, Entity>,
    parent_ways: HashMap<EntityId, IndexSet<EntityId>>,
    parent_rels: HashMap<EntityId, IndexSet<EntityId>>,
    generation: u64,
}

#[derive(Debug, Clone, Default)]
struct LocalLayer {
    /// `None` marks a deletion.
    entities: Rc<IndexMap<EntityId, Option<Entity>>>,
    parent_ways: Rc<ParentIndex>,
    parent_rels: Rc<ParentIndex>,
}

#[derive(Debug, Clone, Copy)]
enum Parents {
    Ways,
    Relations,
}

/// Child ids whose parent link changes when `previous` becomes `current`.
fn child_changes(
    previous: Option<&Entity>,
    current: Option<&Entity>,
) -> Option<(Parents, Vec<EntityId>, Vec<EntityId>)> {
    let entity = current.or(previous)?;
    let parents = match entity {
        Entity::Node(_) => return None,
        Entity::Way(_) => Parents::Ways,
        Entity::Relation(_) => Parents::Relations,
    };
    let before = previous.map(Entity::child_ids).unwrap_or_default();
    let after = current.map(Entity::child_ids).unwrap_or_default();
    let removed = before.iter().filter(|id| !after.contains(id)).cloned().collect();
    let added = after.iter().filter(|id| !before.contains(id)).cloned().collect();
    Some((parents, removed, added))
}

impl BaseLayer {
    fn index_mut(&mut self, parents: Parents) -> &mut HashMap<EntityId, IndexSet<EntityId>> {
        match parents {
            Parents::Ways => &mut self.parent_ways,
            Parents::Relations => &mut self.parent_rels,
        }
    }

    const fn index(&self, parents: Parents) -> &HashMap<EntityId, IndexSet<EntityId>> {
        match parents {
            Parents::Ways => &self.parent_ways,
            Parents::Relations => &self.parent_rels,
        }
    }

    fn update_parents(&mut self, previous: Option<&Entity>, current: &Entity) {
        let Some((parents, removed, added)) = child_changes(previous, Some(current)) else {
            return;
        };
        let index = self.index_mut(parents);
        for child in removed {
            if let Some(set) = index.get_mut(&child) {
                set.shift_remove(current.id());
            }
        }
        for child in added {
            index.entry(child).or_default().insert(current.id().clone());
        }
    }
}

impl LocalLayer {
    fn index(&self, parents: Parents) -> &ParentIndex {
        match parents {
            Parents::Ways => &self.parent_ways,
            Parents::Relations => &self.parent_rels,
        }
    }

    fn is_deleted(&self, id: &EntityId) -> bool {
        matches!(self.entities.get(id), Some(None))
    }
}

#[derive(Debug)]
struct Transient {
    /// Held so the allocation, and with it the identity key, stays live.
    entity: Entity,
    generation: u64,
    value: Rc<dyn Any>,
}

type TransientCache = HashMap<(EntityId, &'static str), Transient>;

/// An immutable snapshot of the entity set and its parent indexes.
///
/// Every edit returns a new graph; the receiver is never changed. Cloning
/// shares both layers and starts with an empty memoization cache.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osm_edit_core::{Graph, Node, Way};
///
/// let graph = Graph::new([
///     Node::new("n1", Coord { x: 0.0, y: 0.0 }).into(),
///     Node::new("n2", Coord { x: 1.0, y: 0.0 }).into(),
/// ]);
/// let edited = graph.replace(Way::new("w1", vec!["n1".into(), "n2".into()]));
/// assert_eq!(edited.parent_ways(&"n1".into()).len(), 1);
/// assert!(graph.parent_ways(&"n1".into()).is_empty());
/// ```
#[derive(Debug)]
pub struct Graph {
    base: Rc<RefCell<BaseLayer>>,
    local: LocalLayer,
    transients: RefCell<TransientCache>,
}

impl Clone for Graph {
    fn clone(&self) -> Self {
        Self {
            base: Rc::clone(&self.base),
            local: self.local.clone(),
            transients: RefCell::default(),
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self {
            base: Rc::default(),
            local: LocalLayer::default(),
            transients: RefCell::default(),
        }
    }
}

impl Graph {
    /// A fresh lineage whose base holds `entities`.
    #[must_use]
    pub fn new(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut graph = Self::default();
        let entities: Vec<Entity> = entities.into_iter().collect();
        graph.rebase(&entities, &mut [], false);
        graph
    }

    /// True if both graphs share their base and local layers.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.base, &other.base)
            && Rc::ptr_eq(&self.local.entities, &other.local.entities)
    }

    /// True if both graphs belong to the same lineage.
    #[must_use]
    pub fn shares_base(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.base, &other.base)
    }

    /// The entity for `id`, or `None` when absent or deleted.
    #[must_use]
    pub fn has_entity(&self, id: &EntityId) -> Option<Entity> {
        self.local.entities.get(id).map_or_else(
            || self.base.borrow().entities.get(id).cloned(),
            Clone::clone,
        )
    }

    /// The entity for `id`.
    ///
    /// # Errors
    /// [`GraphError::EntityNotFound`] when absent or deleted.
    pub fn entity(&self, id: &EntityId) -> Result<Entity, GraphError> {
        self.has_entity(id)
            .ok_or_else(|| GraphError::EntityNotFound { id: id.clone() })
    }

    /// The node for `id`.
    ///
    /// # Errors
    /// [`GraphError::EntityNotFound`] when absent, [`GraphError::WrongKind`]
    /// when `id` names another kind of entity.
    pub fn node(&self, id: &EntityId) -> Result<Rc<Node>, GraphError> {
        self.entity(id)?.as_node().cloned().ok_or_else(|| GraphError::WrongKind {
            id: id.clone(),
            expected: EntityKind::Node,
        })
    }

    /// The way for `id`.
    ///
    /// # Errors
    /// [`GraphError::EntityNotFound`] when absent, [`GraphError::WrongKind`]
    /// when `id` names another kind of entity.
    pub fn way(&self, id: &EntityId) -> Result<Rc<Way>, GraphError> {
        self.entity(id)?.as_way().cloned().ok_or_else(|| GraphError::WrongKind {
            id: id.clone(),
            expected: EntityKind::Way,
        })
    }

    /// The relation for `id`.
    ///
    /// # Errors
    /// [`GraphError::EntityNotFound`] when absent, [`GraphError::WrongKind`]
    /// when `id` names another kind of entity.
    pub fn relation(&self, id: &EntityId) -> Result<Rc<Relation>, GraphError> {
        self.entity(id)?
            .as_relation()
            .cloned()
            .ok_or_else(|| GraphError::WrongKind {
                id: id.clone(),
                expected: EntityKind::Relation,
            })
    }

    /// The base-layer version of `id`, ignoring local edits.
    #[must_use]
    pub fn base_entity(&self, id: &EntityId) -> Option<Entity> {
        self.base.borrow().entities.get(id).cloned()
    }

    /// Candidate parent ids: the local answer, else the base answer, plus
    /// anything the base learned since.
    fn parent_ids(&self, id: &EntityId, parents: Parents) -> IndexSet<EntityId> {
        let base = self.base.borrow();
        let base_set = base.index(parents).get(id);
        let mut ids = self
            .local
            .index(parents)
            .get(id)
            .or(base_set)
            .cloned()
            .unwrap_or_default();
        if let Some(base_set) = base_set {
            ids.extend(base_set.iter().cloned());
        }
        ids
    }

    /// Ways whose current version contains `id`.
    #[must_use]
    pub fn parent_ways(&self, id: &EntityId) -> Vec<Rc<Way>> {
        self.parent_ids(id, Parents::Ways)
            .iter()
            .filter_map(|parent| self.has_entity(parent))
            .filter_map(|entity| entity.as_way().cloned())
            .filter(|way| way.contains(id))
            .collect()
    }

    /// Relations whose current version lists `id` as a member.
    #[must_use]
    pub fn parent_relations(&self, id: &EntityId) -> Vec<Rc<Relation>> {
        self.parent_ids(id, Parents::Relations)
            .iter()
            .filter_map(|parent| self.has_entity(parent))
            .filter_map(|entity| entity.as_relation().cloned())
            .filter(|relation| relation.member_by_id(id).is_some())
            .collect()
    }

    /// Parent relations tagged `type=multipolygon`.
    #[must_use]
    pub fn parent_multipolygons(&self, id: &EntityId) -> Vec<Rc<Relation>> {
        self.parent_relations(id)
            .into_iter()
            .filter(|relation| relation.is_multipolygon())
            .collect()
    }

    /// Resolved nodes of `way`, in order.
    ///
    /// # Errors
    /// [`GraphError`] if any node is missing.
    pub fn child_nodes(&self, way: &Way) -> Result<Vec<Rc<Node>>, GraphError> {
        way.nodes.iter().map(|id| self.node(id)).collect()
    }

    /// True if `id` is a node that belongs to no way.
    #[must_use]
    pub fn is_poi(&self, id: &EntityId) -> bool {
        self.has_entity(id).is_some_and(|e| e.kind() == EntityKind::Node)
            && self.parent_ways(id).is_empty()
    }

    /// True if `id` is a node joining several ways, or one way twice.
    #[must_use]
    pub fn is_shared(&self, id: &EntityId) -> bool {
        let parents = self.parent_ways(id);
        match parents.as_slice() {
            [] => false,
            [way] => {
                let end = if way.is_closed() {
                    way.nodes.len() - 1
                } else {
                    way.nodes.len()
                };
                way.nodes.iter().take(end).filter(|n| *n == id).count() > 1
            }
            _ => true,
        }
    }

    /// Memoize `compute` for `entity` under `key`.
    ///
    /// The value is cached only while `entity` is the version this graph
    /// resolves, and is discarded when the shared base is rebased.
    #[must_use]
    pub fn transient<T: Clone + 'static>(
        &self,
        entity: &Entity,
        key: &'static str,
        compute: impl FnOnce() -> T,
    ) -> T {
        self.cached(entity.inner(), key, compute)
    }

    pub(crate) fn cached<T: Clone + 'static>(
        &self,
        target: &dyn OsmEntity,
        key: &'static str,
        compute: impl FnOnce() -> T,
    ) -> T {
        let ptr = std::ptr::from_ref(target).cast::<()>();
        let generation = self.base.borrow().generation;
        let cache_key = (target.id().clone(), key);
        if let Some(hit) = self.transients.borrow().get(&cache_key) {
            if hit.entity.data_ptr() == ptr && hit.generation == generation {
                if let Some(value) = hit.value.downcast_ref::<T>() {
                    return value.clone();
                }
            }
        }

        let value = compute();
        if let Some(entity) = self.has_entity(target.id()) {
            if entity.data_ptr() == ptr {
                self.transients.borrow_mut().insert(
                    cache_key,
                    Transient {
                        entity,
                        generation,
                        value: Rc::new(value.clone()),
                    },
                );
            }
        }
        value
    }

    /// A graph with `entity` in its local layer, or a clone of `self` when
    /// that exact allocation is already resolved.
    #[must_use]
    pub fn replace(&self, entity: impl Into<Entity>) -> Self {
        let entity = entity.into();
        if self
            .has_entity(entity.id())
            .is_some_and(|current| current.ptr_eq(&entity))
        {
            return self.clone();
        }
        self.update(|graph| graph.replace(entity))
    }

    /// A graph without `id`. Returns a clone when `id` is absent.
    #[must_use]
    pub fn remove(&self, id: &EntityId) -> Self {
        if self.has_entity(id).is_none() {
            return self.clone();
        }
        self.update(|graph| graph.remove(id))
    }

    /// A graph where `id` resolves to its base version again, or is absent
    /// when it has none.
    #[must_use]
    pub fn revert(&self, id: &EntityId) -> Self {
        let same = match (self.has_entity(id), self.base_entity(id)) {
            (Some(current), Some(original)) => current.ptr_eq(&original),
            (None, None) => true,
            _ => false,
        };
        if same {
            return self.clone();
        }
        self.update(|graph| graph.revert(id))
    }

    /// A graph whose local layer holds exactly `entities`; `None` values
    /// record deletions.
    #[must_use]
    pub fn load(&self, entities: impl IntoIterator<Item = (EntityId, Option<Entity>)>) -> Self {
        let mut next = self.clone();
        next.local = LocalLayer::default();
        let mut graph = MutableGraph { graph: next };
        for (id, entity) in entities {
            let original = graph.base_entity(&id);
            graph.update_calculated(original.as_ref(), entity.as_ref());
            Rc::make_mut(&mut graph.graph.local.entities).insert(id, entity);
        }
        graph.graph
    }

    /// Apply `edit` to a mutable fork and return the result.
    #[must_use]
    pub fn update(&self, edit: impl FnOnce(&mut MutableGraph)) -> Self {
        let mut graph = MutableGraph {
            graph: self.clone(),
        };
        edit(&mut graph);
        graph.graph
    }

    /// Apply a fallible `edit` to a mutable fork.
    ///
    /// # Errors
    /// Whatever `edit` returns; the receiver is unchanged either way.
    pub fn try_update<E>(
        &self,
        edit: impl FnOnce(&mut MutableGraph) -> Result<(), E>,
    ) -> Result<Self, E> {
        let mut graph = MutableGraph {
            graph: self.clone(),
        };
        edit(&mut graph)?;
        Ok(graph.graph)
    }

    /// Merge authoritative `entities` into the shared base.
    ///
    /// `self` is the newest graph of the lineage and `history` the older
    /// ones. Invisible entities are skipped, as are ids the base already
    /// holds unless `force` is set. Nodes deleted locally that turn out to
    /// belong to a newly loaded way are restored in every graph.
    pub fn rebase(&mut self, entities: &[Entity], history: &mut [Self], force: bool) {
        let mut restore: IndexSet<EntityId> = IndexSet::new();
        {
            let mut base = self.base.borrow_mut();
            for entity in entities {
                if !entity.is_visible() {
                    continue;
                }
                let previous = base.entities.get(entity.id()).cloned();
                if previous.is_some() && !force {
                    log::debug!("rebase keeps existing base entity {}", entity.id());
                    continue;
                }
                base.entities.insert(entity.id().clone(), entity.clone());
                base.update_parents(previous.as_ref(), entity);
                if let Entity::Way(way) = entity {
                    restore.extend(
                        way.nodes
                            .iter()
                            .filter(|id| self.local.is_deleted(id))
                            .cloned(),
                    );
                }
            }
            base.generation += 1;
        }
        self.restore_deleted(&restore);
        for graph in history.iter_mut() {
            graph.restore_deleted(&restore);
        }
    }

    fn restore_deleted(&mut self, ids: &IndexSet<EntityId>) {
        for id in ids {
            if self.local.is_deleted(id) {
                log::debug!("rebase restores deleted node {id}");
                Rc::make_mut(&mut self.local.entities).shift_remove(id);
            }
        }
        self.transients.get_mut().clear();
    }

    /// Ids edited in this snapshot, with their local value.
    pub(crate) fn local_entities(&self) -> impl Iterator<Item = (&EntityId, Option<&Entity>)> {
        self.local.entities.iter().map(|(id, e)| (id, e.as_ref()))
    }

    /// True when `id` is modified or deleted in this snapshot.
    pub(crate) fn is_locally_edited(&self, id: &EntityId) -> bool {
        self.local.entities.contains_key(id)
    }
}

/// A graph open for in-place edits, handed out by [`Graph::update`].
#[derive(Debug)]
pub struct MutableGraph {
    graph: Graph,
}

impl Deref for MutableGraph {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        &self.graph
    }
}

impl MutableGraph {
    fn update_calculated(&mut self, previous: Option<&Entity>, current: Option<&Entity>) {
        let Some((parents, removed, added)) = child_changes(previous, current) else {
            return;
        };
        let Some(parent) = current.or(previous).map(|e| e.id().clone()) else {
            return;
        };
        let starting = |graph: &Graph, child: &EntityId| -> IndexSet<EntityId> {
            graph
                .local
                .index(parents)
                .get(child)
                .cloned()
                .or_else(|| graph.base.borrow().index(parents).get(child).cloned())
                .unwrap_or_default()
        };
        let mut changes: Vec<(EntityId, IndexSet<EntityId>)> = Vec::new();
        for child in removed {
            let mut set = starting(&self.graph, &child);
            set.shift_remove(&parent);
            changes.push((child, set));
        }
        for child in added {
            let mut set = starting(&self.graph, &child);
            set.insert(parent.clone());
            changes.push((child, set));
        }
        let index = match parents {
            Parents::Ways => &mut self.graph.local.parent_ways,
            Parents::Relations => &mut self.graph.local.parent_rels,
        };
        let index = Rc::make_mut(index);
        for (child, set) in changes {
            index.insert(child, set);
        }
    }

    /// Put `entity` in the local layer.
    pub fn replace(&mut self, entity: impl Into<Entity>) {
        let entity = entity.into();
        let current = self.graph.has_entity(entity.id());
        if current.as_ref().is_some_and(|c| c.ptr_eq(&entity)) {
            return;
        }
        self.update_calculated(current.as_ref(), Some(&entity));
        Rc::make_mut(&mut self.graph.local.entities).insert(entity.id().clone(), Some(entity));
        self.graph.transients.get_mut().clear();
    }

    /// Mark `id` deleted.
    pub fn remove(&mut self, id: &EntityId) {
        let Some(current) = self.graph.has_entity(id) else {
            return;
        };
        self.update_calculated(Some(&current), None);
        Rc::make_mut(&mut self.graph.local.entities).insert(id.clone(), None);
        self.graph.transients.get_mut().clear();
    }

    /// Drop any local edit of `id`.
    pub fn revert(&mut self, id: &EntityId) {
        let current = self.graph.has_entity(id);
        let original = self.graph.base_entity(id);
        self.update_calculated(current.as_ref(), original.as_ref());
        Rc::make_mut(&mut self.graph.local.entities).shift_remove(id);
        self.graph.transients.get_mut().clear();
    }

    /// Finish editing.
    #[must_use]
    pub fn into_graph(self) -> Graph {
        self.graph
    }
}
