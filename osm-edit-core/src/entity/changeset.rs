//! Changesets and the `osmChange` upload document.

use std::collections::HashSet;

use serde_json::{Map, Value, json};

use super::Entity;
use crate::id::EntityId;
use crate::tags::Tags;

/// Value of the `@generator` attribute on upload documents.
pub const GENERATOR: &str = "osm-edit-engine";

const API_VERSION: f64 = 0.6;

/// Entities grouped by upload operation.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    /// Entities new to the server.
    pub created: Vec<Entity>,
    /// Existing entities with edits.
    pub modified: Vec<Entity>,
    /// Existing entities to delete.
    pub deleted: Vec<Entity>,
}

/// A tagged upload session. Not part of any graph.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Changeset {
    /// Identifier with a `c` prefix.
    pub id: EntityId,
    /// Changeset tags such as `comment`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: Tags,
}

impl Default for Changeset {
    fn default() -> Self {
        Self::new(EntityId::next_changeset())
    }
}

impl Changeset {
    /// An untagged changeset.
    #[must_use]
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            tags: Tags::new(),
        }
    }

    /// Replace the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// The changeset creation document.
    ///
    /// # Examples
    /// ```
    /// use osm_edit_core::{Changeset, GENERATOR};
    /// use osm_edit_core::tags::tags_from;
    ///
    /// let jxon = Changeset::new("c1").with_tags(tags_from([("comment", "hello")])).as_jxon();
    /// assert_eq!(jxon["osm"]["changeset"]["tag"][0]["@v"], "hello");
    /// assert_eq!(jxon["osm"]["changeset"]["@generator"], GENERATOR);
    /// ```
    #[must_use]
    pub fn as_jxon(&self) -> Value {
        let tag: Vec<Value> = self
            .tags
            .iter()
            .map(|(k, v)| json!({ "@k": k, "@v": v }))
            .collect();
        json!({
            "osm": {
                "changeset": {
                    "tag": tag,
                    "@version": API_VERSION,
                    "@generator": GENERATOR,
                }
            }
        })
    }

    /// The `osmChange` document uploading `changes` under this changeset.
    ///
    /// Creations and modifications are grouped node, way, relation; created
    /// relations are ordered so members precede the relations using them.
    /// Deletions are grouped relation, way, node. Empty groups are omitted.
    #[must_use]
    pub fn osm_change_jxon(&self, changes: &Changes) -> Value {
        let changeset = self.id.osm_id();
        let mut create = group(&changes.created, FORWARD, changeset);
        if let Some(Value::Array(relations)) = create.get_mut("relation") {
            sort_relations(relations);
        }
        let modify = group(&changes.modified, FORWARD, changeset);
        let mut delete = group(&changes.deleted, BACKWARD, changeset);
        delete.insert("@if-unused".to_owned(), Value::Bool(true));
        json!({
            "osmChange": {
                "@version": API_VERSION,
                "@generator": GENERATOR,
                "create": create,
                "modify": modify,
                "delete": delete,
            }
        })
    }
}

const FORWARD: [&str; 3] = ["node", "way", "relation"];
const BACKWARD: [&str; 3] = ["relation", "way", "node"];

fn group(entities: &[Entity], order: [&str; 3], changeset: &str) -> Map<String, Value> {
    let documents: Vec<Value> = entities.iter().map(|e| e.as_jxon(Some(changeset))).collect();
    let mut grouped = Map::new();
    for tag in order {
        let bodies: Vec<Value> = documents
            .iter()
            .filter_map(|doc| doc.get(tag).cloned())
            .collect();
        if !bodies.is_empty() {
            grouped.insert(tag.to_owned(), Value::Array(bodies));
        }
    }
    grouped
}

fn relation_id(doc: &Value) -> Option<&str> {
    doc.get("@id").and_then(Value::as_str)
}

/// Ids of created relations that `doc` references as members.
fn relation_refs<'a>(doc: &'a Value, created: &HashSet<&str>) -> Vec<&'a str> {
    doc.get("member")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|member| member.get("keyAttributes"))
        .filter(|attrs| attrs.get("type").and_then(Value::as_str) == Some("relation"))
        .filter_map(|attrs| attrs.get("ref").and_then(Value::as_str))
        .filter(|r| created.contains(r))
        .collect()
}

/// Reorder relation documents so referenced relations come first.
///
/// Works through a processing stack; a relation already on the stack is not
/// pushed again, which breaks reference cycles.
fn sort_relations(relations: &mut Vec<Value>) {
    let docs = std::mem::take(relations);
    let created: HashSet<&str> = docs.iter().filter_map(relation_id).collect();
    let index_of = |id: &str| docs.iter().position(|d| relation_id(d) == Some(id));

    let mut sorted: Vec<usize> = Vec::with_capacity(docs.len());
    let mut done: HashSet<usize> = HashSet::new();
    for start in 0..docs.len() {
        if done.contains(&start) {
            continue;
        }
        let mut processing = vec![start];
        while let Some(&next) = processing.first() {
            let deps: Vec<usize> = docs
                .get(next)
                .map(|doc| relation_refs(doc, &created))
                .unwrap_or_default()
                .into_iter()
                .filter_map(index_of)
                .filter(|i| !done.contains(i) && !processing.contains(i))
                .collect();
            if deps.is_empty() {
                done.insert(next);
                sorted.push(next);
                processing.remove(0);
            } else {
                let pending = std::mem::replace(&mut processing, deps);
                processing.extend(pending);
            }
        }
    }

    let mut slots: Vec<Option<Value>> = docs.into_iter().map(Some).collect();
    relations.extend(sorted.into_iter().filter_map(|i| slots.get_mut(i).and_then(Option::take)));
}
