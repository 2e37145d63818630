//! Assemble ways into connected chains.
//!
//! Used for multipolygon rings, route ordering and the join action. Each
//! chain records its ways in traversal order and the combined node list.
//! Ways that had to be turned around to fit are reported as [`Reverse`]
//! actions, which callers may apply to make stored directions agree.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::actions::{Reverse, ReverseOptions};
use crate::entity::{Member, Way};
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};

/// One way placed in a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainItem {
    /// The member as supplied, or a role-less way member when joining
    /// way entities.
    pub member: Member,
    /// Position of the member in the input list.
    pub index: usize,
    /// The way, turned around when `reversed` is set.
    pub way: Rc<Way>,
    /// True if the way runs against the chain direction in the graph.
    pub reversed: bool,
}

/// A connected run of ways.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinedChain {
    /// Ways in traversal order.
    pub items: Vec<ChainItem>,
    /// Node ids along the chain, shared nodes listed once.
    pub nodes: Vec<EntityId>,
}

/// Chains found by [`join_ways`] or [`join_way_entities`].
#[derive(Debug, Clone, Default)]
pub struct JoinResult {
    /// One entry per disjoint chain, in discovery order.
    pub chains: Vec<JoinedChain>,
    /// Reversals that align each way with its chain. A way reversed twice
    /// appears twice.
    pub actions: Vec<Reverse>,
}

#[derive(Debug, Clone, Copy)]
enum Attach {
    EndForward,
    EndReversed,
    StartForward,
    StartReversed,
}

fn attachment(nodes: &[EntityId], start: &EntityId, end: &EntityId) -> Option<Attach> {
    let (first, last) = (nodes.first()?, nodes.last()?);
    if first == end {
        Some(Attach::EndForward)
    } else if last == end {
        Some(Attach::EndReversed)
    } else if last == start {
        Some(Attach::StartForward)
    } else if first == start {
        Some(Attach::StartReversed)
    } else {
        None
    }
}

struct Builder {
    as_members: bool,
    actions: Vec<Reverse>,
}

impl Builder {
    fn reverse(&mut self, item: &mut ChainItem) {
        let action = Reverse::with_options(
            item.way.id.clone(),
            ReverseOptions {
                reverse_oneway: true,
            },
        );
        item.way = Rc::new(action.reversed_way(&item.way));
        item.reversed = !item.reversed;
        self.actions.push(action);
    }

    fn chain(&mut self, first: ChainItem, pending: &mut VecDeque<ChainItem>) -> JoinedChain {
        let mut nodes: VecDeque<EntityId> = first.way.nodes.iter().cloned().collect();
        let mut items = VecDeque::from([first]);

        while let Some((index, mut attach)) = self.next_candidate(&nodes, pending) {
            let Some(mut item) = pending.remove(index) else {
                break;
            };
            if self.as_members && items.len() == 1 && matches!(attach, Attach::StartForward | Attach::StartReversed) {
                // Keep member order by running the first way backwards.
                if let Some(head) = items.front_mut() {
                    self.reverse(head);
                }
                nodes.make_contiguous().reverse();
                attach = match attach {
                    Attach::StartForward => Attach::EndReversed,
                    _ => Attach::EndForward,
                };
            }
            let way_nodes = item.way.nodes.clone();
            match attach {
                Attach::EndForward => {
                    nodes.extend(way_nodes.into_iter().skip(1));
                    items.push_back(item);
                }
                Attach::EndReversed => {
                    nodes.extend(way_nodes.into_iter().rev().skip(1));
                    self.reverse(&mut item);
                    items.push_back(item);
                }
                Attach::StartForward => {
                    for id in way_nodes.into_iter().rev().skip(1) {
                        nodes.push_front(id);
                    }
                    items.push_front(item);
                }
                Attach::StartReversed => {
                    for id in way_nodes.into_iter().skip(1) {
                        nodes.push_front(id);
                    }
                    self.reverse(&mut item);
                    items.push_front(item);
                }
            }
        }

        JoinedChain {
            items: items.into(),
            nodes: nodes.into(),
        }
    }

    fn next_candidate(
        &self,
        nodes: &VecDeque<EntityId>,
        pending: &VecDeque<ChainItem>,
    ) -> Option<(usize, Attach)> {
        let (start, end) = (nodes.front()?, nodes.back()?);
        pending
            .iter()
            .enumerate()
            .find_map(|(i, item)| attachment(&item.way.nodes, start, end).map(|a| (i, a)))
    }
}

fn join(pending: Vec<ChainItem>, as_members: bool) -> JoinResult {
    let mut pending: VecDeque<ChainItem> = pending.into();
    let mut builder = Builder {
        as_members,
        actions: Vec::new(),
    };
    let mut chains = Vec::new();
    while let Some(first) = pending.pop_front() {
        chains.push(builder.chain(first, &mut pending));
    }
    JoinResult {
        chains,
        actions: builder.actions,
    }
}

/// Join the way members of a relation into chains.
///
/// Members that are not ways, or are missing from `graph`, are skipped.
/// When the second member attaches to the start of the first, the first is
/// reversed so the chain follows member order.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osm_edit_core::{Graph, Member, Node, Way};
/// use osm_edit_core::join_ways::join_ways;
///
/// let graph = Graph::new([
///     Node::new("a", Coord { x: 0.0, y: 0.0 }).into(),
///     Node::new("b", Coord { x: 1.0, y: 0.0 }).into(),
///     Node::new("c", Coord { x: 2.0, y: 0.0 }).into(),
///     Way::new("w1", vec!["a".into(), "b".into()]).into(),
///     Way::new("w2", vec!["b".into(), "c".into()]).into(),
/// ]);
/// let result = join_ways(&[Member::way("w2", ""), Member::way("w1", "")], &graph);
/// let ids: Vec<&str> = result.chains[0].nodes.iter().map(|id| id.as_str()).collect();
/// assert_eq!(ids, ["c", "b", "a"]);
/// assert_eq!(result.actions.len(), 2);
/// ```
#[must_use]
pub fn join_ways(members: &[Member], graph: &Graph) -> JoinResult {
    let items = members
        .iter()
        .enumerate()
        .filter(|(_, m)| m.kind == EntityKind::Way)
        .filter_map(|(index, m)| {
            let way = graph.way(&m.id).ok()?;
            Some(ChainItem {
                member: m.clone(),
                index,
                way,
                reversed: false,
            })
        })
        .collect();
    join(items, true)
}

/// Join ways into chains without regard to input order.
///
/// Ways absent from `graph` are skipped; the graph's version of each way is
/// used.
#[must_use]
pub fn join_way_entities(ways: &[Rc<Way>], graph: &Graph) -> JoinResult {
    let items = ways
        .iter()
        .enumerate()
        .filter_map(|(index, w)| {
            let way = graph.way(&w.id).ok()?;
            Some(ChainItem {
                member: Member::way(w.id.clone(), ""),
                index,
                way,
                reversed: false,
            })
        })
        .collect();
    join(items, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Node;
    use crate::tags::tags_from;
    use geo::Coord;
    use rstest::{fixture, rstest};

    fn node(id: &str, x: f64) -> Node {
        Node::new(id, Coord { x, y: 0.0 })
    }

    fn way(id: &str, nodes: &str) -> Way {
        Way::new(id, nodes.chars().map(|c| EntityId::new(&c.to_string())).collect())
    }

    fn nodes(chain: &JoinedChain) -> String {
        chain.nodes.iter().map(EntityId::as_str).collect()
    }

    fn member_ids(chain: &JoinedChain) -> Vec<&str> {
        chain.items.iter().map(|i| i.member.id.as_str()).collect()
    }

    fn members(ids: &[&str]) -> Vec<Member> {
        ids.iter().map(|id| Member::way(*id, "")).collect()
    }

    fn graph_of(ways: Vec<Way>) -> Graph {
        let mut entities: Vec<crate::Entity> = "abcdef"
            .chars()
            .zip(0..)
            .map(|(c, x)| node(&c.to_string(), f64::from(x)).into())
            .collect();
        entities.extend(ways.into_iter().map(Into::into));
        Graph::new(entities)
    }

    #[fixture]
    fn abc() -> Graph {
        graph_of(vec![way("-", "ab"), way("=", "bc")])
    }

    #[rstest]
    fn single_way() {
        let graph = graph_of(vec![way("-", "a")]);
        let result = join_ways(&members(&["-"]), &graph);
        assert_eq!(result.chains.len(), 1);
        assert!(result.actions.is_empty());
        assert_eq!(nodes(&result.chains[0]), "a");
    }

    #[rstest]
    #[case(&["-", "="])]
    #[case(&["=", "-"])]
    fn way_entities_join_in_any_order(abc: Graph, #[case] order: &[&str]) {
        let ways: Vec<Rc<Way>> = order.iter().map(|id| abc.way(&(*id).into()).unwrap()).collect();
        let result = join_way_entities(&ways, &abc);
        assert_eq!(result.chains.len(), 1);
        assert!(result.actions.is_empty());
        assert_eq!(nodes(&result.chains[0]), "abc");
        assert_eq!(member_ids(&result.chains[0]), ["-", "="]);
    }

    #[rstest]
    fn members_in_order(abc: Graph) {
        let result = join_ways(&members(&["-", "="]), &abc);
        assert!(result.actions.is_empty());
        assert_eq!(nodes(&result.chains[0]), "abc");
        assert_eq!(member_ids(&result.chains[0]), ["-", "="]);
    }

    #[rstest]
    fn members_out_of_order_keep_member_order(abc: Graph) {
        let result = join_ways(&members(&["=", "-"]), &abc);
        assert_eq!(result.actions.len(), 2);
        assert_eq!(nodes(&result.chains[0]), "cba");
        assert_eq!(member_ids(&result.chains[0]), ["=", "-"]);
    }

    #[rstest]
    fn members_returned_in_traversal_order() {
        let graph = graph_of(vec![way("-", "bc"), way("=", "ba"), way("~", "cd")]);
        let result = join_ways(&members(&["-", "~", "="]), &graph);
        assert_eq!(result.actions.len(), 1);
        assert_eq!(nodes(&result.chains[0]), "abcd");
        assert_eq!(member_ids(&result.chains[0]), ["=", "-", "~"]);
    }

    #[rstest]
    fn reversed_way_carries_reversed_tags() {
        let tagged = way("=", "cb").with_tags(tags_from([("oneway", "yes"), ("lanes:forward", "2")]));
        let graph = graph_of(vec![way("-", "ab"), tagged]);
        let ways = vec![graph.way(&"-".into()).unwrap(), graph.way(&"=".into()).unwrap()];
        let result = join_way_entities(&ways, &graph);
        assert_eq!(result.actions.len(), 1);
        assert_eq!(nodes(&result.chains[0]), "abc");
        let second = &result.chains[0].items[1];
        assert!(second.reversed);
        assert_eq!(second.way.nodes, vec![EntityId::new("b"), EntityId::new("c")]);
        assert_eq!(second.way.tags, tags_from([("oneway", "-1"), ("lanes:backward", "2")]));
    }

    #[rstest]
    fn first_member_reversed_to_preserve_order() {
        let graph = graph_of(vec![way("-", "ba"), way("=", "bc")]);
        let result = join_ways(&members(&["-", "="]), &graph);
        assert_eq!(result.actions.len(), 1);
        assert_eq!(nodes(&result.chains[0]), "abc");
        assert_eq!(member_ids(&result.chains[0]), ["-", "="]);
        assert!(result.chains[0].items[0].reversed);
    }

    #[rstest]
    fn skips_non_way_and_missing_members() {
        let graph = graph_of(Vec::new());
        assert!(join_ways(&[Member::node("a", "")], &graph).chains.is_empty());
        assert!(join_ways(&members(&["w"]), &graph).chains.is_empty());
    }

    #[rstest]
    fn disjoint_ways_form_separate_chains() {
        let graph = graph_of(vec![
            way("/", "ab"),
            way("\\", "bc"),
            way("-", "de"),
            way("=", "ef"),
        ]);
        let result = join_ways(&members(&["/", "\\", "-", "="]), &graph);
        assert!(result.actions.is_empty());
        assert_eq!(result.chains.len(), 2);
        assert_eq!(nodes(&result.chains[0]), "abc");
        assert_eq!(nodes(&result.chains[1]), "def");
        assert_eq!(member_ids(&result.chains[1]), ["-", "="]);
    }

    #[rstest]
    fn doubled_back_route() {
        let graph = graph_of(vec![
            way("=", "ba"),
            way("-", "bc"),
            way("~", "cd"),
            way("\\", "de"),
            way("/", "ce"),
        ]);
        let result = join_ways(&members(&["=", "-", "~", "\\", "/", "-", "="]), &graph);
        assert_eq!(result.chains.len(), 1);
        assert_eq!(result.actions.len(), 3);
        assert_eq!(nodes(&result.chains[0]), "abcdecba");
        assert_eq!(member_ids(&result.chains[0]), ["=", "-", "~", "\\", "/", "-", "="]);
    }
}
