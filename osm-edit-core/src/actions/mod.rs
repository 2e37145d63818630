//! Graph transforms.
//!
//! Each action is a small value describing one edit. [`Action::apply`]
//! turns a graph into the edited graph and never touches its input;
//! [`Action::disabled`] reports why the edit cannot be made. Callers check
//! `disabled` first. Applying a disabled action is a caller bug: the result
//! is unspecified, though it never panics.

mod add_entity;
mod add_member;
mod change_tags;
mod circularize;
mod connect;
mod delete;
mod discard_tags;
mod disconnect;
mod extract;
mod join;
mod merge;
mod merge_nodes;
mod merge_polygon;
mod merge_remote;
mod move_node;
mod orthogonalize;
mod reflect;
mod reverse;
mod revert;
mod scale;
mod split;
mod straighten;
mod unrestrict_turn;

pub use add_entity::AddEntity;
pub use add_member::{AddMember, InsertPair};
pub use change_tags::ChangeTags;
pub use circularize::{Circularize, CircularizeOptions};
pub use connect::Connect;
pub use delete::{DeleteMember, DeleteMultiple, DeleteNode, DeleteRelation, DeleteWay};
pub use discard_tags::DiscardTags;
pub use disconnect::{Connection, Disconnect, DisconnectOptions};
pub use extract::Extract;
pub use join::Join;
pub use merge::Merge;
pub use merge_nodes::MergeNodes;
pub use merge_polygon::MergePolygon;
pub use merge_remote::{Conflict, MergeRemoteChanges, MergeRemoteOptions, MergeStrategy};
pub use move_node::MoveNode;
pub use orthogonalize::{Orthogonalize, OrthogonalizeOptions};
pub use reflect::Reflect;
pub use reverse::{Reverse, ReverseOptions};
pub use revert::Revert;
pub use scale::Scale;
pub use split::{KeepHistoryOn, Split, SplitOptions};
pub use straighten::{StraightenNodes, StraightenOptions, StraightenWay};
pub use unrestrict_turn::UnrestrictTurn;

use crate::error::{ActionError, DisabledReason};
use crate::graph::Graph;

/// A validated, pure `Graph -> Graph` edit.
///
/// Transitionable actions interpolate between the original graph at
/// `t = 0` and the finished edit at `t = 1` through [`Action::apply_at`].
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osm_edit_core::Graph;
/// use osm_edit_core::Node;
/// use osm_edit_core::actions::{Action, MoveNode};
///
/// let graph = Graph::new([Node::new("n1", Coord { x: 0.0, y: 0.0 }).into()]);
/// let action = MoveNode::new("n1", Coord { x: 2.0, y: 2.0 });
/// assert!(action.disabled(&graph).is_none());
/// let halfway = action.apply_at(&graph, 0.5)?;
/// assert_eq!(halfway.node(&"n1".into())?.loc, Coord { x: 1.0, y: 1.0 });
/// # Ok::<(), osm_edit_core::ActionError>(())
/// ```
pub trait Action {
    /// Produce the edited graph.
    ///
    /// # Errors
    /// [`ActionError`] when an entity the action names cannot be resolved.
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError>;

    /// Why the action cannot run, or `None` when it can.
    #[must_use]
    fn disabled(&self, _graph: &Graph) -> Option<DisabledReason> {
        None
    }

    /// True if [`Action::apply_at`] interpolates.
    #[must_use]
    fn transitionable(&self) -> bool {
        false
    }

    /// Produce the edit at progress `t` in `[0, 1]`. Actions that do not
    /// interpolate ignore `t`.
    ///
    /// # Errors
    /// As for [`Action::apply`].
    fn apply_at(&self, graph: &Graph, _t: f64) -> Result<Graph, ActionError> {
        self.apply(graph)
    }

    /// Check [`Action::disabled`] and apply.
    ///
    /// # Errors
    /// [`ActionError::Disabled`] carrying the reason, or any error from
    /// [`Action::apply`].
    fn try_apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        self.disabled(graph)
            .map_or_else(|| self.apply(graph), |reason| Err(ActionError::Disabled(reason)))
    }
}

/// Clamp an interpolation parameter into `[0, 1]`.
pub(crate) fn clamp_t(t: f64) -> f64 {
    if t.is_nan() { 1.0 } else { t.clamp(0.0, 1.0) }
}
