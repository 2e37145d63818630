//! In-memory editing core for OpenStreetMap data.
//!
//! Entities are immutable and shared. A [`Graph`] layers local edits over a
//! shared base, so every edit yields a new graph that is cheap to keep in an
//! undo history. [`actions`] describe the individual edits, [`Tree`] answers
//! bounding-box queries against any graph of a lineage, and
//! [`difference::Difference`] summarises what changed between two graphs for
//! upload as a [`Changeset`].
//!
//! # Examples
//!
//! ```
//! use geo::Coord;
//! use osm_edit_core::actions::{Action, KeepHistoryOn, Split, SplitOptions};
//! use osm_edit_core::{EntityId, Graph, Node, Way};
//!
//! # fn main() -> Result<(), osm_edit_core::ActionError> {
//! let graph = Graph::new([
//!     Node::new("a", Coord { x: 0.0, y: 0.0 }).into(),
//!     Node::new("b", Coord { x: 1.0, y: 0.0 }).into(),
//!     Node::new("c", Coord { x: 2.0, y: 0.0 }).into(),
//!     Way::new("w1", vec!["a".into(), "b".into(), "c".into()]).into(),
//! ]);
//! let options = SplitOptions {
//!     keep_history_on: KeepHistoryOn::First,
//!     new_way_ids: vec!["w2".into()],
//!     ..SplitOptions::default()
//! };
//! let edited = Split::with_options("b", options).apply(&graph)?;
//! let ids = |names: [&str; 2]| names.map(EntityId::new).to_vec();
//! assert_eq!(edited.way(&"w1".into())?.nodes, ids(["a", "b"]));
//! assert_eq!(edited.way(&"w2".into())?.nodes, ids(["b", "c"]));
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod config;
pub mod difference;
pub mod entity;
pub mod error;
pub mod extent;
pub mod geom;
pub mod graph;
pub mod id;
pub mod join_ways;
pub mod projection;
pub mod tags;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tree;

pub use entity::{
    Changes, Changeset, Entity, GENERATOR, Geometry, Member, Node, Note, NoteStatus, OsmEntity,
    Relation, Way,
};
pub use error::{ActionError, DisabledReason, GraphError, WayError};
pub use extent::Extent;
pub use graph::{Graph, MutableGraph};
pub use id::{EntityId, EntityKind};
pub use projection::Projection;
pub use tree::Tree;
