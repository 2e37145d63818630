//! Entity identifiers.
//!
//! Identifiers are strings whose first character encodes the entity kind
//! (`n`, `w`, `r` or `c`) followed by the OSM numeric id. Entities that have
//! never been uploaded carry negative numbers, issued from process-wide
//! counters by [`EntityId::next`].

use std::borrow::Borrow;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicI64, Ordering};

/// The kind of a graph entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EntityKind {
    /// A point feature or way vertex.
    Node,
    /// An ordered list of nodes.
    Way,
    /// An ordered list of typed, role-bearing members.
    Relation,
}

impl EntityKind {
    /// Return the kind as used in OSM documents.
    ///
    /// # Examples
    /// ```
    /// use osm_edit_core::EntityKind;
    ///
    /// assert_eq!(EntityKind::Relation.as_str(), "relation");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }

    const fn prefix(self) -> char {
        match self {
            Self::Node => 'n',
            Self::Way => 'w',
            Self::Relation => 'r',
        }
    }

    /// Sort rank used wherever nodes must precede ways and ways relations.
    pub(crate) const fn rank(self) -> u8 {
        match self {
            Self::Node => 0,
            Self::Way => 1,
            Self::Relation => 2,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static NEXT_NODE: AtomicI64 = AtomicI64::new(-1);
static NEXT_WAY: AtomicI64 = AtomicI64::new(-1);
static NEXT_RELATION: AtomicI64 = AtomicI64::new(-1);
static NEXT_CHANGESET: AtomicI64 = AtomicI64::new(-1);

/// Identifier of an entity, cheap to clone and compare.
///
/// # Examples
/// ```
/// use osm_edit_core::{EntityId, EntityKind};
///
/// let id = EntityId::from_osm(EntityKind::Way, 17);
/// assert_eq!(id.as_str(), "w17");
/// assert_eq!(id.osm_id(), "17");
/// assert!(!id.is_new());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Rc<str>);

impl EntityId {
    /// Wrap an existing identifier string.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(Rc::from(id))
    }

    /// Build an identifier from an entity kind and OSM numeric id.
    #[must_use]
    pub fn from_osm(kind: EntityKind, osm_id: impl fmt::Display) -> Self {
        Self(Rc::from(format!("{}{osm_id}", kind.prefix())))
    }

    /// Issue a fresh negative identifier for a new entity of `kind`.
    #[must_use]
    pub fn next(kind: EntityKind) -> Self {
        let counter = match kind {
            EntityKind::Node => &NEXT_NODE,
            EntityKind::Way => &NEXT_WAY,
            EntityKind::Relation => &NEXT_RELATION,
        };
        Self::from_osm(kind, counter.fetch_sub(1, Ordering::Relaxed))
    }

    /// Issue a fresh negative changeset identifier.
    #[must_use]
    pub fn next_changeset() -> Self {
        Self(Rc::from(format!(
            "c{}",
            NEXT_CHANGESET.fetch_sub(1, Ordering::Relaxed)
        )))
    }

    /// The full identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier without its kind prefix.
    #[must_use]
    pub fn osm_id(&self) -> &str {
        let mut chars = self.0.chars();
        chars.next();
        chars.as_str()
    }

    /// The kind encoded in the prefix, if it is a graph entity prefix.
    #[must_use]
    pub fn kind(&self) -> Option<EntityKind> {
        match self.0.chars().next() {
            Some('n') => Some(EntityKind::Node),
            Some('w') => Some(EntityKind::Way),
            Some('r') => Some(EntityKind::Relation),
            _ => None,
        }
    }

    /// True when the entity has never been uploaded.
    ///
    /// Only a negative OSM part marks a new id; ids without a numeric part
    /// count as uploaded.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.osm_id().starts_with('-')
    }

    /// Leading integer of the OSM id, parsed leniently.
    fn numeric(&self) -> Option<i64> {
        leading_integer(self.osm_id())
    }
}

/// Parse an optional sign followed by digits, ignoring any trailing text.
fn leading_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, digits) = trimmed.strip_prefix('-').map_or_else(
        || (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        |rest| (true, rest),
    );
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(digits.len(), |(i, _)| i);
    let value: i64 = digits.get(..end)?.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Pick the identifier that has existed longest.
///
/// Uploaded ids beat new ones, the smallest uploaded id wins, and among new
/// ids the one closest to zero wins. Ids without a numeric part lose to any
/// numeric id and keep the first candidate among themselves.
///
/// # Examples
/// ```
/// use osm_edit_core::{EntityId, id::oldest_id};
///
/// let ids = [EntityId::new("w-1"), EntityId::new("w7"), EntityId::new("w3")];
/// assert_eq!(oldest_id(&ids), Some(&ids[2]));
/// ```
#[must_use]
pub fn oldest_id(ids: &[EntityId]) -> Option<&EntityId> {
    let mut iter = ids.iter();
    let mut oldest = iter.next()?;
    for candidate in iter {
        if is_older(candidate, oldest) {
            oldest = candidate;
        }
    }
    Some(oldest)
}

fn is_older(candidate: &EntityId, current: &EntityId) -> bool {
    if candidate.osm_id() == current.osm_id() {
        return false;
    }
    match (current.numeric(), candidate.numeric()) {
        (None, None) | (Some(_), None) => false,
        (None, Some(_)) => true,
        (Some(cur), Some(cand)) => {
            if cur.signum() != cand.signum() {
                cur < 0
            } else if cur < 0 {
                cand > cur
            } else {
                cand < cur
            }
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(Rc::from(value))
    }
}

impl From<&EntityId> for EntityId {
    fn from(value: &EntityId) -> Self {
        value.clone()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for EntityId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for EntityId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw))
    }
}
