//! Entity value types.
//!
//! Entities are immutable once built: every edit produces a new value, and
//! graphs share them through [`Rc`]. Two graph entries are "the same" entity
//! only when they point at the same allocation, which [`Entity::ptr_eq`]
//! tests.

mod changeset;
mod node;
mod note;
mod relation;
mod way;

use std::rc::Rc;

pub use changeset::{Changes, Changeset, GENERATOR};
pub use node::Node;
pub use note::{Note, NoteComment, NoteStatus};
pub use relation::{Member, Relation};
pub use way::{Affix, Segment, Way};

use serde_json::{Value, json};

use crate::extent::Extent;
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};
use crate::tags::{self, Tags};

/// How an entity is drawn and selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Geometry {
    /// A node that belongs to no way.
    Point,
    /// A node that belongs to at least one way.
    Vertex,
    /// A way that is not an area.
    Line,
    /// A closed way or multipolygon describing a surface.
    Area,
    /// Any other relation.
    Relation,
}

impl Geometry {
    /// Lower-case name of the geometry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Vertex => "vertex",
            Self::Line => "line",
            Self::Area => "area",
            Self::Relation => "relation",
        }
    }
}

/// Fields and tag queries shared by every entity kind.
pub trait OsmEntity {
    /// Stable identifier.
    fn id(&self) -> &EntityId;

    /// Tags carried by the entity.
    fn tags(&self) -> &Tags;

    /// Entity kind.
    fn kind(&self) -> EntityKind;

    /// Server version, absent for entities never uploaded.
    fn version(&self) -> Option<&str>;

    /// False for entities the server reports as deleted.
    fn is_visible(&self) -> bool;

    /// Identifier without its kind prefix.
    #[must_use]
    fn osm_id(&self) -> &str {
        self.id().osm_id()
    }

    /// True if the entity has never been uploaded.
    #[must_use]
    fn is_new(&self) -> bool {
        self.id().is_new()
    }

    /// True if any tag carries feature semantics.
    #[must_use]
    fn has_interesting_tags(&self) -> bool {
        tags::has_interesting_tags(self.tags())
    }

    /// True if any tag other than `area` is present.
    #[must_use]
    fn has_non_geometry_tags(&self) -> bool {
        tags::has_non_geometry_tags(self.tags())
    }
}

/// A node, way or relation held by a graph.
#[derive(Debug, Clone)]
pub enum Entity {
    /// A node.
    Node(Rc<Node>),
    /// A way.
    Way(Rc<Way>),
    /// A relation.
    Relation(Rc<Relation>),
}

impl Entity {
    /// True if both values share one allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Node(a), Self::Node(b)) => Rc::ptr_eq(a, b),
            (Self::Way(a), Self::Way(b)) => Rc::ptr_eq(a, b),
            (Self::Relation(a), Self::Relation(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn inner(&self) -> &dyn OsmEntity {
        match self {
            Self::Node(node) => node.as_ref(),
            Self::Way(way) => way.as_ref(),
            Self::Relation(relation) => relation.as_ref(),
        }
    }

    /// Address of the shared allocation, used as an identity key.
    pub(crate) fn data_ptr(&self) -> *const () {
        match self {
            Self::Node(node) => Rc::as_ptr(node).cast(),
            Self::Way(way) => Rc::as_ptr(way).cast(),
            Self::Relation(relation) => Rc::as_ptr(relation).cast(),
        }
    }

    /// The node, if this is one.
    #[must_use]
    pub const fn as_node(&self) -> Option<&Rc<Node>> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    /// The way, if this is one.
    #[must_use]
    pub const fn as_way(&self) -> Option<&Rc<Way>> {
        match self {
            Self::Way(way) => Some(way),
            _ => None,
        }
    }

    /// The relation, if this is one.
    #[must_use]
    pub const fn as_relation(&self) -> Option<&Rc<Relation>> {
        match self {
            Self::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    /// Ids this entity refers to: way nodes or relation members, in order.
    #[must_use]
    pub fn child_ids(&self) -> Vec<EntityId> {
        match self {
            Self::Node(_) => Vec::new(),
            Self::Way(way) => way.nodes.clone(),
            Self::Relation(relation) => relation.members.iter().map(|m| m.id.clone()).collect(),
        }
    }

    /// A copy carrying `tags`.
    #[must_use]
    pub fn with_tags(&self, tags: Tags) -> Self {
        match self {
            Self::Node(node) => Node::clone(node).with_tags(tags).into(),
            Self::Way(way) => Way::clone(way).with_tags(tags).into(),
            Self::Relation(relation) => Relation::clone(relation).with_tags(tags).into(),
        }
    }

    /// A copy carrying `version`.
    #[must_use]
    pub fn with_version(&self, version: Option<String>) -> Self {
        match self {
            Self::Node(node) => Node {
                version,
                ..Node::clone(node)
            }
            .into(),
            Self::Way(way) => Way {
                version,
                ..Way::clone(way)
            }
            .into(),
            Self::Relation(relation) => Relation {
                version,
                ..Relation::clone(relation)
            }
            .into(),
        }
    }

    /// Merge `incoming` tags, returning `self` unchanged when nothing differs.
    #[must_use]
    pub fn merge_tags(&self, incoming: &Tags) -> Self {
        tags::merge_tags(self.tags(), incoming).map_or_else(|| self.clone(), |t| self.with_tags(t))
    }

    /// Bounding box in `graph`; empty when nothing is resolvable.
    #[must_use]
    pub fn extent(&self, graph: &Graph) -> Extent {
        match self {
            Self::Node(node) => node.extent(),
            Self::Way(way) => way.extent(graph),
            Self::Relation(relation) => relation.extent(graph),
        }
    }

    /// True if the extent in `graph` meets `extent`.
    #[must_use]
    pub fn intersects(&self, extent: &Extent, graph: &Graph) -> bool {
        self.extent(graph).intersects(extent)
    }

    /// Drawing geometry in `graph`.
    #[must_use]
    pub fn geometry(&self, graph: &Graph) -> Geometry {
        match self {
            Self::Node(node) => node.geometry(graph),
            Self::Way(way) => way.geometry(graph),
            Self::Relation(relation) => relation.geometry(graph),
        }
    }

    /// True when the entity cannot be drawn meaningfully.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        match self {
            Self::Node(node) => node.is_degenerate(),
            Self::Way(way) => way.is_degenerate(),
            Self::Relation(relation) => relation.is_degenerate(),
        }
    }

    /// Upload representation.
    #[must_use]
    pub fn as_jxon(&self, changeset: Option<&str>) -> Value {
        match self {
            Self::Node(node) => node.as_jxon(changeset),
            Self::Way(way) => way.as_jxon(changeset),
            Self::Relation(relation) => relation.as_jxon(changeset),
        }
    }
}

impl OsmEntity for Entity {
    fn id(&self) -> &EntityId {
        self.inner().id()
    }

    fn tags(&self) -> &Tags {
        self.inner().tags()
    }

    fn kind(&self) -> EntityKind {
        self.inner().kind()
    }

    fn version(&self) -> Option<&str> {
        self.inner().version()
    }

    fn is_visible(&self) -> bool {
        self.inner().is_visible()
    }
}

macro_rules! entity_conversions {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Entity {
            fn from(value: $ty) -> Self {
                Self::$variant(Rc::new(value))
            }
        }

        impl From<Rc<$ty>> for Entity {
            fn from(value: Rc<$ty>) -> Self {
                Self::$variant(value)
            }
        }

        impl From<&Rc<$ty>> for Entity {
            fn from(value: &Rc<$ty>) -> Self {
                Self::$variant(Rc::clone(value))
            }
        }
    };
}

entity_conversions!(Node, Node);
entity_conversions!(Way, Way);
entity_conversions!(Relation, Relation);

macro_rules! impl_osm_entity {
    ($ty:ty, $kind:expr) => {
        impl OsmEntity for $ty {
            fn id(&self) -> &EntityId {
                &self.id
            }

            fn tags(&self) -> &Tags {
                &self.tags
            }

            fn kind(&self) -> EntityKind {
                $kind
            }

            fn version(&self) -> Option<&str> {
                self.version.as_deref()
            }

            fn is_visible(&self) -> bool {
                self.visible
            }
        }
    };
}

impl_osm_entity!(Node, EntityKind::Node);
impl_osm_entity!(Way, EntityKind::Way);
impl_osm_entity!(Relation, EntityKind::Relation);

/// `tag` array shared by node, way and relation documents.
fn tag_jxon(tags: &Tags) -> Value {
    Value::Array(
        tags.iter()
            .map(|(k, v)| json!({ "keyAttributes": { "k": k, "v": v } }))
            .collect(),
    )
}

/// `@version` attribute, `0` for never-uploaded entities.
fn version_jxon(version: Option<&str>) -> Value {
    version.map_or_else(|| json!(0), |v| json!(v))
}
