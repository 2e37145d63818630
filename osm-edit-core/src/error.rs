//! Error and disabled-reason types shared across the crate.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::id::{EntityId, EntityKind};

/// Errors raised by graph lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// No entity with this id is present in the graph.
    #[error("entity {id} not found")]
    EntityNotFound {
        /// The missing identifier.
        id: EntityId,
    },
    /// The entity exists but is not of the requested kind.
    #[error("entity {id} is not a {expected}")]
    WrongKind {
        /// The identifier looked up.
        id: EntityId,
        /// Kind the caller asked for.
        expected: EntityKind,
    },
}

/// Errors raised by way node-list edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WayError {
    /// The index lies outside the editable range.
    #[error("index {index} out of range 0..{max}")]
    IndexOutOfRange {
        /// Requested position.
        index: usize,
        /// Largest valid position; `-1` when no position is valid.
        max: isize,
    },
}

/// Errors surfaced by [`crate::actions::Action::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// A referenced entity could not be resolved.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A node-list edit was out of range.
    #[error(transparent)]
    Way(#[from] WayError),
    /// The action was applied while disabled.
    #[error("action is disabled: {0}")]
    Disabled(DisabledReason),
}

/// Why an action cannot run against a graph.
///
/// The string codes are stable and intended for translation lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisabledReason {
    /// The selection is not the kind the action works on.
    NotEligible,
    /// Ways do not share the required endpoint.
    NotAdjacent,
    /// The result would self-intersect.
    PathsIntersect,
    /// Tags differ in a way that cannot be merged.
    ConflictingTags,
    /// Relation memberships cannot be reconciled.
    ConflictingRelations,
    /// A turn restriction would be broken.
    Restriction,
    /// A lane connectivity relation would be broken.
    Connectivity,
    /// A relation would lose a required member.
    Relation,
    /// The node is not shared between ways.
    NotConnected,
    /// The way bends too much to be straightened.
    TooBendy,
    /// The way is already circular.
    AlreadyCircular,
    /// The way is already straight.
    StraightEnough,
    /// The way is not closed.
    NotClosed,
    /// Relation members are missing from the graph.
    IncompleteRelation,
    /// The node carries no reversible direction.
    NondirectionalNode,
    /// No corner is close to square or straight.
    NotSquarish,
    /// Every corner is already square.
    SquareEnough,
    /// The vertex is an end of the way or not on it.
    EndVertex,
}

impl DisabledReason {
    /// Every reason, in declaration order.
    pub const ALL: [Self; 18] = [
        Self::NotEligible,
        Self::NotAdjacent,
        Self::PathsIntersect,
        Self::ConflictingTags,
        Self::ConflictingRelations,
        Self::Restriction,
        Self::Connectivity,
        Self::Relation,
        Self::NotConnected,
        Self::TooBendy,
        Self::AlreadyCircular,
        Self::StraightEnough,
        Self::NotClosed,
        Self::IncompleteRelation,
        Self::NondirectionalNode,
        Self::NotSquarish,
        Self::SquareEnough,
        Self::EndVertex,
    ];

    /// Stable code for this reason.
    ///
    /// # Examples
    /// ```
    /// use osm_edit_core::DisabledReason;
    ///
    /// assert_eq!(DisabledReason::TooBendy.as_str(), "too_bendy");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotEligible => "not_eligible",
            Self::NotAdjacent => "not_adjacent",
            Self::PathsIntersect => "paths_intersect",
            Self::ConflictingTags => "conflicting_tags",
            Self::ConflictingRelations => "conflicting_relations",
            Self::Restriction => "restriction",
            Self::Connectivity => "connectivity",
            Self::Relation => "relation",
            Self::NotConnected => "not_connected",
            Self::TooBendy => "too_bendy",
            Self::AlreadyCircular => "already_circular",
            Self::StraightEnough => "straight_enough",
            Self::NotClosed => "not_closed",
            Self::IncompleteRelation => "incomplete_relation",
            Self::NondirectionalNode => "nondirectional_node",
            Self::NotSquarish => "not_squarish",
            Self::SquareEnough => "square_enough",
            Self::EndVertex => "end_vertex",
        }
    }
}

impl fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown reason code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown disabled reason: {0}")]
pub struct UnknownReason(pub String);

impl FromStr for DisabledReason {
    type Err = UnknownReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| UnknownReason(s.to_owned()))
    }
}
