//! Reconcile local edits with a newer server version of one entity.
//!
//! The graph's shared base is the common ancestor. `local` holds the user's
//! edits as saved and `remote` the server's current state of the entity and
//! whatever it references:
//!
//! ```text
//!        --- local ---- graph
//!       /
//!   base --- remote
//! ```
//!
//! The graph handed to [`Action::apply`] descends from `local` and may
//! already carry earlier conflict resolutions.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;

use geo::Coord;
use indexmap::IndexSet;
use serde::Deserialize;

use crate::config::DiscardTags as DiscardKeys;
use crate::entity::{Entity, Node, OsmEntity, Relation, Way};
use crate::error::ActionError;
use crate::graph::Graph;
use crate::id::EntityId;
use crate::tags::Tags;

use super::Action;
use super::delete::delete_multiple;

/// Locations closer than this in both axes are the same.
const LOCATION_EPSILON: f64 = 1e-6;

/// How to settle disagreements between local and remote versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Merge what merges cleanly and report every conflict.
    #[default]
    Safe,
    /// Keep the local version of every field.
    ForceLocal,
    /// Take the remote version of every field.
    ForceRemote,
}

/// Options for [`MergeRemoteChanges`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct MergeRemoteOptions {
    /// Conflict policy.
    pub strategy: MergeStrategy,
    /// Keys ignored when merging tags.
    pub discard_tags: DiscardKeys,
}

/// A disagreement that stops a safe merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// Both sides moved the node to different places.
    Location {
        /// Author of the remote version.
        user: Option<String>,
    },
    /// Both sides edited the same stretch of the node list.
    NodeList {
        /// Author of the remote version.
        user: Option<String>,
    },
    /// The member lists differ.
    MemberList {
        /// Author of the remote version.
        user: Option<String>,
    },
    /// Both sides changed one tag differently.
    Tag {
        /// The contested key.
        key: String,
        /// Local value, `None` when deleted locally.
        local: Option<String>,
        /// Remote value, `None` when deleted remotely.
        remote: Option<String>,
        /// Author of the remote version.
        user: Option<String>,
    },
    /// The entity was deleted remotely.
    Deleted {
        /// Author of the remote version.
        user: Option<String>,
    },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = |user: &Option<String>| user.clone().unwrap_or_else(|| "another user".to_owned());
        match self {
            Self::Location { user } => {
                write!(f, "This object was moved by both you and {}.", who(user))
            }
            Self::NodeList { user } => {
                write!(f, "Nodes were changed by both you and {}.", who(user))
            }
            Self::MemberList { user } => {
                write!(f, "Relation members were changed by both you and {}.", who(user))
            }
            Self::Tag {
                key,
                local,
                remote,
                user,
            } => write!(
                f,
                "You changed the {key} tag to \"{}\" and {} changed it to \"{}\".",
                local.as_deref().unwrap_or_default(),
                who(user),
                remote.as_deref().unwrap_or_default(),
            ),
            Self::Deleted { user } => {
                write!(f, "This object has been deleted by {}.", who(user))
            }
        }
    }
}

/// Three-way merge of one entity against its remote version.
///
/// A safe merge that meets a conflict leaves the graph untouched and
/// records the conflicts; they are available from [`Self::conflicts`]
/// after [`Action::apply`].
#[derive(Debug)]
pub struct MergeRemoteChanges {
    id: EntityId,
    local: Graph,
    remote: Graph,
    options: MergeRemoteOptions,
    conflicts: RefCell<Vec<Conflict>>,
}

#[derive(Default)]
struct Updates {
    replacements: Vec<Entity>,
    remove_ids: Vec<EntityId>,
}

/// State for one merge run.
struct Run<'a> {
    action: &'a MergeRemoteChanges,
    user: Option<String>,
    conflicts: Vec<Conflict>,
}

fn user_of(entity: &Entity) -> Option<String> {
    match entity {
        Entity::Node(node) => node.user.clone(),
        Entity::Way(way) => way.user.clone(),
        Entity::Relation(relation) => relation.user.clone(),
    }
}

fn same_location(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).abs() <= LOCATION_EPSILON && (a.y - b.y).abs() <= LOCATION_EPSILON
}

fn version_of(entity: &Entity) -> Option<String> {
    entity.version().map(str::to_owned)
}

/// Nodes still needed once dropped from the merged way.
fn is_used(graph: &Graph, node: &Node, way: &Way) -> bool {
    node.has_interesting_tags()
        || graph.parent_ways(&node.id).iter().any(|parent| parent.id != way.id)
        || !graph.parent_relations(&node.id).is_empty()
}

fn update_children(updates: Updates, graph: Graph) -> Result<Graph, ActionError> {
    let mut graph = graph;
    for entity in updates.replacements {
        graph = graph.replace(entity);
    }
    if updates.remove_ids.is_empty() {
        return Ok(graph);
    }
    delete_multiple(graph, &updates.remove_ids)
}

impl Run<'_> {
    const fn strategy(&self) -> MergeStrategy {
        self.action.options.strategy
    }

    fn conflict(&mut self, conflict: Conflict) {
        log::warn!("merge of {} conflicts: {conflict}", self.action.id);
        self.conflicts.push(conflict);
    }

    fn merge_location(&mut self, remote: &Node, target: Node) -> Node {
        if self.strategy() == MergeStrategy::ForceLocal || same_location(target.loc, remote.loc) {
            return target;
        }
        if self.strategy() == MergeStrategy::ForceRemote {
            return target.move_to(remote.loc);
        }
        self.conflict(Conflict::Location {
            user: self.user.clone(),
        });
        target
    }

    fn merge_nodes(&mut self, base: Option<&Way>, remote: &Way, target: Way) -> Way {
        if self.strategy() == MergeStrategy::ForceLocal || target.nodes == remote.nodes {
            return target;
        }
        if self.strategy() == MergeStrategy::ForceRemote {
            return target.with_nodes(remote.nodes.clone());
        }

        let ancestor = base.map(|way| way.nodes.as_slice()).unwrap_or_default();
        let mut nodes = Vec::new();
        for hunk in diff3_merge(&target.nodes, ancestor, &remote.nodes) {
            match hunk {
                Hunk::Ok(ok) => nodes.extend(ok),
                Hunk::Conflict { a, o, b } => {
                    if o == a {
                        nodes.extend(b);
                    } else if o == b {
                        nodes.extend(a);
                    } else {
                        self.conflict(Conflict::NodeList {
                            user: self.user.clone(),
                        });
                        return target;
                    }
                }
            }
        }
        target.with_nodes(nodes)
    }

    /// Queue child node replacements and removals for the merged way.
    fn merge_children(&mut self, way: &Way, children: &[EntityId], updates: &mut Updates, graph: &Graph) {
        let start = self.conflicts.len();
        for id in children {
            if !way.contains(id) {
                let unused = graph
                    .has_entity(id)
                    .as_ref()
                    .and_then(Entity::as_node)
                    .is_some_and(|node| !is_used(graph, node, way));
                if unused {
                    updates.remove_ids.push(id.clone());
                }
                continue;
            }

            let local = self.action.local.has_entity(id);
            let remote = self.action.remote.has_entity(id);
            match (self.strategy(), local, remote) {
                (MergeStrategy::ForceRemote, _, Some(remote)) if remote.is_visible() => {
                    updates.replacements.push(remote);
                }
                (MergeStrategy::ForceLocal, Some(local), remote) => {
                    let target = match remote {
                        Some(remote) => local.with_version(version_of(&remote)),
                        None => local,
                    };
                    updates.replacements.push(target);
                }
                (MergeStrategy::Safe, Some(local), Some(remote))
                    if local.version() != remote.version() =>
                {
                    let mut target = local.with_version(version_of(&remote));
                    if remote.is_visible() {
                        if let (Some(node), Some(remote_node)) = (target.as_node(), remote.as_node()) {
                            target = self.merge_location(remote_node, Node::clone(node)).into();
                        }
                    } else {
                        self.conflict(Conflict::Deleted {
                            user: user_of(&remote),
                        });
                    }
                    if self.conflicts.len() != start {
                        break;
                    }
                    updates.replacements.push(target);
                }
                _ => {}
            }
        }
    }

    fn merge_members(&mut self, remote: &Relation, target: Relation) -> Relation {
        if self.strategy() == MergeStrategy::ForceLocal || target.members == remote.members {
            return target;
        }
        if self.strategy() == MergeStrategy::ForceRemote {
            return target.with_members(remote.members.clone());
        }
        self.conflict(Conflict::MemberList {
            user: self.user.clone(),
        });
        target
    }

    fn merge_tags(&mut self, base: Option<&Tags>, remote: &Entity, target: Entity) -> Entity {
        if self.strategy() == MergeStrategy::ForceLocal || target.tags() == remote.tags() {
            return target;
        }
        if self.strategy() == MergeStrategy::ForceRemote {
            return target.with_tags(remote.tags().clone());
        }

        let start = self.conflicts.len();
        let empty = Tags::new();
        let o = base.unwrap_or(&empty);
        let a = target.tags();
        let b = remote.tags();
        let keys: BTreeSet<&String> = o
            .keys()
            .chain(a.keys())
            .chain(b.keys())
            .filter(|key| !self.action.options.discard_tags.contains(key))
            .collect();

        let mut tags = a.clone();
        let mut changed = false;
        for key in keys {
            let (ours, theirs, ancestor) = (a.get(key), b.get(key), o.get(key));
            if ancestor == theirs || ours == theirs {
                continue;
            }
            if ancestor == ours {
                match theirs {
                    Some(value) => tags.insert(key.clone(), value.clone()),
                    None => tags.remove(key),
                };
                changed = true;
            } else {
                self.conflict(Conflict::Tag {
                    key: key.clone(),
                    local: ours.cloned(),
                    remote: theirs.cloned(),
                    user: self.user.clone(),
                });
            }
        }

        if changed && self.conflicts.len() == start {
            target.with_tags(tags)
        } else {
            target
        }
    }

    fn merge(&mut self, graph: &Graph) -> Result<Graph, ActionError> {
        let action = self.action;
        let id = &action.id;
        let base = graph.base_entity(id);
        let local = action.local.entity(id)?;
        let remote = action.remote.entity(id)?;
        self.user = user_of(&remote);
        let mut target = local.with_version(version_of(&remote));
        let mut updates = Updates::default();

        if !remote.is_visible() {
            return match self.strategy() {
                MergeStrategy::ForceRemote => delete_multiple(graph.clone(), std::slice::from_ref(id)),
                MergeStrategy::ForceLocal => {
                    if let Entity::Way(way) = &target {
                        let children: IndexSet<EntityId> = way.nodes.iter().cloned().collect();
                        let children: Vec<EntityId> = children.into_iter().collect();
                        self.merge_children(way, &children, &mut updates, graph);
                    }
                    Ok(update_children(updates, graph.clone())?.replace(target))
                }
                MergeStrategy::Safe => {
                    self.conflict(Conflict::Deleted {
                        user: self.user.clone(),
                    });
                    Ok(graph.clone())
                }
            };
        }

        let mut graph = graph.clone();
        target = match (&target, &remote) {
            (Entity::Node(node), Entity::Node(remote_node)) => {
                self.merge_location(remote_node, Node::clone(node)).into()
            }
            (Entity::Way(way), Entity::Way(remote_way)) => {
                // Remote child nodes may be unknown locally.
                let pulled: Vec<Entity> = remote_way
                    .nodes
                    .iter()
                    .filter_map(|child| action.remote.has_entity(child))
                    .collect();
                graph.rebase(&pulled, &mut [], false);

                let base_way: Option<&Way> = base.as_ref().and_then(Entity::as_way).map(AsRef::as_ref);
                let merged = self.merge_nodes(base_way, remote_way, Way::clone(way));
                let local_nodes = local.as_way().map(|w| w.nodes.clone()).unwrap_or_default();
                let children: IndexSet<EntityId> =
                    local_nodes.into_iter().chain(remote_way.nodes.iter().cloned()).collect();
                let children: Vec<EntityId> = children.into_iter().collect();
                self.merge_children(&merged, &children, &mut updates, &graph);
                merged.into()
            }
            (Entity::Relation(relation), Entity::Relation(remote_relation)) => self
                .merge_members(remote_relation, Relation::clone(relation))
                .into(),
            _ => target.clone(),
        };
        target = self.merge_tags(base.as_ref().map(OsmEntity::tags), &remote, target);

        if self.conflicts.is_empty() {
            graph = update_children(updates, graph)?.replace(target);
        }
        Ok(graph)
    }
}

impl MergeRemoteChanges {
    /// Merge entity `id` using the saved `local` graph and the server's
    /// `remote` graph. Both must share the base of the graph being edited.
    #[must_use]
    pub fn new(id: impl Into<EntityId>, local: Graph, remote: Graph) -> Self {
        Self {
            id: id.into(),
            local,
            remote,
            options: MergeRemoteOptions::default(),
            conflicts: RefCell::default(),
        }
    }

    /// Replace the default options.
    #[must_use]
    pub fn with_options(mut self, options: MergeRemoteOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the merge, returning the graph and any conflicts found.
    ///
    /// Way merges load the remote way's child nodes into the shared base.
    ///
    /// # Errors
    /// [`ActionError::Graph`] when the entity is missing from either side.
    pub fn merge(&self, graph: &Graph) -> Result<(Graph, Vec<Conflict>), ActionError> {
        let mut run = Run {
            action: self,
            user: None,
            conflicts: Vec::new(),
        };
        let merged = run.merge(graph)?;
        Ok((merged, run.conflicts))
    }

    /// Conflicts recorded by the last [`Action::apply`].
    #[must_use]
    pub fn conflicts(&self) -> Vec<Conflict> {
        self.conflicts.borrow().clone()
    }
}

impl Action for MergeRemoteChanges {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let (merged, conflicts) = self.merge(graph)?;
        *self.conflicts.borrow_mut() = conflicts;
        Ok(merged)
    }
}

/// One stretch of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Hunk<T> {
    /// Agreed content.
    Ok(Vec<T>),
    /// Both sides changed the ancestor's `o` differently.
    Conflict { a: Vec<T>, o: Vec<T>, b: Vec<T> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

/// A stretch of the ancestor replaced by a stretch of one side.
#[derive(Debug, Clone, Copy)]
struct Change {
    side: Side,
    o_start: usize,
    o_len: usize,
    start: usize,
    len: usize,
}

impl Change {
    const fn o_end(&self) -> usize {
        self.o_start + self.o_len
    }

    const fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Stretches where `x` departs from `o`, found through their longest
/// common subsequence.
fn changes<T: PartialEq>(o: &[T], x: &[T], side: Side) -> Vec<Change> {
    let (n, m) = (o.len(), x.len());
    let mut lcs = vec![vec![0_usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if o[i] == x[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    let (mut gap_i, mut gap_j) = (0, 0);
    let mut close_gap = |i: usize, j: usize, gap_i: usize, gap_j: usize| {
        if i > gap_i || j > gap_j {
            out.push(Change {
                side,
                o_start: gap_i,
                o_len: i - gap_i,
                start: gap_j,
                len: j - gap_j,
            });
        }
    };
    while i < n && j < m {
        if o[i] == x[j] {
            close_gap(i, j, gap_i, gap_j);
            i += 1;
            j += 1;
            gap_i = i;
            gap_j = j;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    close_gap(n, m, gap_i, gap_j);
    out
}

/// The part of one side covering the ancestor stretch `start..end`.
fn side_span<'a, T>(x: &'a [T], side: Side, region: &[Change], start: usize, end: usize) -> Option<&'a [T]> {
    let mine = || region.iter().filter(|c| c.side == side);
    let first_o = mine().map(|c| c.o_start).min()?;
    let first = mine().map(|c| c.start).min()?;
    let last_o = mine().map(Change::o_end).max()?;
    let last = mine().map(Change::end).max()?;
    let from = first.saturating_sub(first_o - start);
    let to = last + (end - last_o);
    x.get(from..to)
}

/// Merge `a` and `b`, both edited from ancestor `o`.
///
/// Stretches changed identically on both sides are not conflicts.
fn diff3_merge<T: PartialEq + Clone>(a: &[T], o: &[T], b: &[T]) -> Vec<Hunk<T>> {
    let mut all = changes(o, a, Side::A);
    all.extend(changes(o, b, Side::B));
    all.sort_by_key(|c| c.o_start);

    let mut hunks = Vec::new();
    let mut ok: Vec<T> = Vec::new();
    let mut offset = 0;
    let mut pending = all.into_iter().peekable();
    while let Some(first) = pending.next() {
        let start = first.o_start;
        let mut end = first.o_end();
        let mut region = vec![first];
        while let Some(next) = pending.next_if(|c| c.o_start <= end) {
            end = end.max(next.o_end());
            region.push(next);
        }
        ok.extend_from_slice(o.get(offset..start).unwrap_or_default());

        let ancestor = o.get(start..end).unwrap_or_default();
        if let [only] = region.as_slice() {
            let side = if only.side == Side::A { a } else { b };
            ok.extend_from_slice(side.get(only.start..only.end()).unwrap_or_default());
        } else {
            let ours = side_span(a, Side::A, &region, start, end).unwrap_or(ancestor);
            let theirs = side_span(b, Side::B, &region, start, end).unwrap_or(ancestor);
            if ours == theirs {
                ok.extend_from_slice(ours);
            } else {
                if !ok.is_empty() {
                    hunks.push(Hunk::Ok(std::mem::take(&mut ok)));
                }
                hunks.push(Hunk::Conflict {
                    a: ours.to_vec(),
                    o: ancestor.to_vec(),
                    b: theirs.to_vec(),
                });
            }
        }
        offset = end;
    }
    ok.extend_from_slice(o.get(offset..).unwrap_or_default());
    if !ok.is_empty() {
        hunks.push(Hunk::Ok(ok));
    }
    hunks
}
