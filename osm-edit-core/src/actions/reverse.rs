//! Reverse a way, or the direction tags of a single node.

use crate::entity::{Member, Node, OsmEntity, Way};
use crate::error::{ActionError, DisabledReason};
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};
use crate::tags::Tags;

use super::Action;

/// Options for [`Reverse`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReverseOptions {
    /// Flip `oneway=yes` and `oneway=-1`. Left alone by default because
    /// reversing a one-way street usually means fixing its node order.
    pub reverse_oneway: bool,
}

/// Reverse a way's node order together with every direction-sensitive tag,
/// member role and child-node direction. Applied to a node, reverses that
/// node's direction tags, including absolute compass bearings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reverse {
    entity_id: EntityId,
    options: ReverseOptions,
}

const KEY_SWAPS: [(&str, &str); 4] = [
    (":right", ":left"),
    (":left", ":right"),
    (":forward", ":backward"),
    (":backward", ":forward"),
];

const IGNORED_KEY_PARTS: [&str; 5] = ["description", "name", "note", "ref", "start_date"];

const COMPASS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

fn reverse_key(key: &str) -> String {
    for (from, to) in KEY_SWAPS {
        if let Some(stem) = key.strip_suffix(from) {
            return format!("{stem}{to}");
        }
    }
    for (from, to) in KEY_SWAPS {
        let infix = format!("{from}:");
        if key.contains(&infix) {
            return key.replacen(&infix, &format!("{to}:"), 1);
        }
    }
    key.to_owned()
}

fn is_ignored_key(key: &str) -> bool {
    key.split([':', '_'])
        .any(|part| IGNORED_KEY_PARTS.contains(&part))
}

fn relative_value(value: &str) -> Option<&'static str> {
    match value {
        "left" => Some("right"),
        "right" => Some("left"),
        "up" => Some("down"),
        "down" => Some("up"),
        "forward" | "forwards" => Some("backward"),
        "backward" | "backwards" => Some("forward"),
        _ => None,
    }
}

/// Negate a leading numeric value, as in `5%` or `-.8°`.
fn negate_incline(value: &str) -> Option<String> {
    let (sign, rest) = match value.as_bytes().first() {
        Some(b'-') => ("-", &value[1..]),
        Some(b'+') => ("+", &value[1..]),
        _ => ("", value),
    };
    let numeric = rest.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.');
    if !numeric {
        return None;
    }
    Some(if sign == "-" {
        rest.to_owned()
    } else {
        format!("-{rest}")
    })
}

#[expect(
    clippy::integer_division,
    clippy::integer_division_remainder_used,
    reason = "the opposite compass point is half the rose away"
)]
fn reverse_bearing(value: &str) -> Option<String> {
    if let Some(i) = COMPASS.iter().position(|point| *point == value) {
        return COMPASS.get((i + COMPASS.len() / 2) % COMPASS.len()).map(|p| (*p).to_owned());
    }
    let degrees: f64 = value.trim().parse().ok()?;
    if !degrees.is_finite() {
        return None;
    }
    let normalized = degrees.rem_euclid(360.0);
    Some(((normalized + 180.0) % 360.0).to_string())
}

impl Reverse {
    /// Reverse `entity_id` with default options.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>) -> Self {
        Self::with_options(entity_id, ReverseOptions::default())
    }

    /// Reverse `entity_id` with `options`.
    #[must_use]
    pub fn with_options(entity_id: impl Into<EntityId>, options: ReverseOptions) -> Self {
        Self {
            entity_id: entity_id.into(),
            options,
        }
    }

    /// The entity being reversed.
    #[must_use]
    pub const fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    fn reverse_value(&self, key: &str, value: &str, absolute: bool) -> String {
        if is_ignored_key(key) || key.starts_with("turn:lanes") {
            return value.to_owned();
        }
        if key == "incline" {
            if let Some(negated) = negate_incline(value) {
                return negated;
            }
        }
        if key == "oneway" && self.options.reverse_oneway {
            return match value {
                "yes" | "1" => "-1".to_owned(),
                "-1" => "yes".to_owned(),
                other => other.to_owned(),
            };
        }
        if absolute && key.ends_with("direction") {
            if let Some(bearing) = reverse_bearing(value) {
                return bearing;
            }
        }
        relative_value(value).map_or_else(|| value.to_owned(), str::to_owned)
    }

    fn reverse_tags(&self, tags: &Tags, absolute: bool) -> Tags {
        tags.iter()
            .map(|(k, v)| (reverse_key(k), self.reverse_value(k, v, absolute)))
            .collect()
    }

    /// `way` with its nodes and tags reversed, without touching a graph.
    pub(crate) fn reversed_way(&self, way: &Way) -> Way {
        let mut nodes = way.nodes.clone();
        nodes.reverse();
        Way::clone(way)
            .with_nodes(nodes)
            .with_tags(self.reverse_tags(&way.tags, false))
    }

    fn reverse_node_tags(&self, graph: &Graph, ids: &[EntityId]) -> Graph {
        graph.update(|g| {
            for id in ids {
                let Ok(node) = g.node(id) else { continue };
                if node.tags.is_empty() {
                    continue;
                }
                let absolute = *id == self.entity_id;
                let tags = self.reverse_tags(&node.tags, absolute);
                if tags != node.tags {
                    g.replace(Node::clone(&node).with_tags(tags));
                }
            }
        })
    }

    fn reverse_roles(&self, graph: &Graph) -> Graph {
        let relations = graph.parent_relations(&self.entity_id);
        graph.update(|g| {
            for relation in relations {
                let mut updated = (*relation).clone();
                for (index, member) in relation.members.iter().enumerate() {
                    if member.id != self.entity_id {
                        continue;
                    }
                    if let Some(role) = relative_value(&member.role)
                        .filter(|r| *r == "forward" || *r == "backward")
                    {
                        let flipped = Member::new(member.id.clone(), member.kind, role);
                        updated = updated.update_member(flipped, index);
                    }
                }
                if updated.members != relation.members {
                    g.replace(updated);
                }
            }
        })
    }
}

impl Action for Reverse {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let entity = graph.entity(&self.entity_id)?;
        let Some(way) = entity.as_way() else {
            return Ok(self.reverse_node_tags(graph, std::slice::from_ref(&self.entity_id)));
        };
        let reversed = self.reversed_way(way);
        let graph = self.reverse_roles(graph);
        let graph = self.reverse_node_tags(&graph, &reversed.nodes);
        Ok(graph.replace(reversed))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let entity = graph.has_entity(&self.entity_id)?;
        if entity.kind() == EntityKind::Way {
            return None;
        }
        let directional = entity
            .tags()
            .iter()
            .any(|(k, v)| reverse_key(k) != *k || self.reverse_value(k, v, true) != *v);
        (!directional).then_some(DisabledReason::NondirectionalNode)
    }
}
