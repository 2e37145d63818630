//! Facade crate for the OSM edit engine.
//!
//! This crate re-exports the core graph, entity and action types. The
//! `test-support` feature exposes planar projections and entity builders for
//! downstream tests.

#![forbid(unsafe_code)]

pub use osm_edit_core::{
    ActionError, Changes, Changeset, DisabledReason, Entity, EntityId, EntityKind, Extent,
    GENERATOR, Geometry, Graph, GraphError, Member, MutableGraph, Node, Note, NoteStatus,
    OsmEntity, Projection, Relation, Tree, Way, WayError,
};
pub use osm_edit_core::{actions, config, difference, geom, join_ways, tags};

#[cfg(feature = "test-support")]
pub use osm_edit_core::test_support;
