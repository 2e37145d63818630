//! An editing session from loaded data to the upload document.

use geo::Coord;
use osm_edit_core::actions::{Action, AddEntity, DeleteNode, DiscardTags, MoveNode};
use osm_edit_core::config::DiscardTags as DiscardKeys;
use osm_edit_core::difference::Difference;
use osm_edit_core::tags::tags_from;
use osm_edit_core::{Changes, Changeset, Graph, Node, Way};
use rstest::{fixture, rstest};
use serde_json::{Value, json};

fn node(id: &str, x: f64) -> Node {
    Node::new(id, Coord { x, y: 0.0 }).with_version("1")
}

#[fixture]
fn loaded() -> Graph {
    Graph::new([
        node("n1", 0.0).into(),
        node("n2", 1.0).into(),
        node("n3", 2.0).into(),
        Way::new("w1", vec!["n1".into(), "n2".into(), "n3".into()])
            .with_version("1")
            .into(),
    ])
}

/// Add a bench, nudge `n2` and delete `n3`, keeping each step.
fn history(base: &Graph) -> Vec<Graph> {
    let bench = Node::new("n-1", Coord { x: 3.0, y: 0.0 })
        .with_tags(tags_from([("amenity", "bench"), ("created_by", "test")]));
    let steps: [&dyn Action; 3] = [
        &AddEntity::new(bench),
        &MoveNode::new("n2", Coord { x: 1.0, y: 1.0 }),
        &DeleteNode::new("n3"),
    ];
    let mut graphs = vec![base.clone()];
    for step in steps {
        let previous = graphs.last().expect("history starts with the base");
        let next = step.try_apply(previous).expect("step applies");
        graphs.push(next);
    }
    graphs
}

#[rstest]
fn earlier_graphs_are_untouched(loaded: Graph) {
    let graphs = history(&loaded);
    assert!(loaded.has_entity(&"n3".into()).is_some());
    assert!(graphs[2].has_entity(&"n3".into()).is_some());
    assert!(graphs[3].has_entity(&"n3".into()).is_none());
    assert_eq!(graphs[1].node(&"n2".into()).expect("n2").loc, Coord { x: 1.0, y: 0.0 });
}

#[rstest]
fn difference_counts_each_kind_of_change(loaded: Graph) {
    let head = history(&loaded).pop().expect("head graph");
    let diff = Difference::new(&loaded, &head);
    let changes = Changes::from(&diff);
    assert_eq!(changes.created.len(), 1);
    // n2 moved and w1 lost n3.
    assert_eq!(changes.modified.len(), 2);
    assert_eq!(changes.deleted.len(), 1);
    let did = diff.did_change();
    assert!(did.addition && did.deletion && did.geometry);
}

fn first_id<'a>(doc: &'a Value, operation: &str, kind: &str) -> &'a Value {
    &doc["osmChange"][operation][kind][0]["@id"]
}

#[rstest]
fn upload_document_omits_discarded_tags(loaded: Graph) {
    let head = history(&loaded).pop().expect("head graph");
    let cleaned = DiscardTags::new(Difference::new(&loaded, &head), DiscardKeys::default())
        .apply(&head)
        .expect("tags discarded");
    let changes = Changes::from(&Difference::new(&loaded, &cleaned));
    let doc = Changeset::new("c5").osm_change_jxon(&changes);

    assert_eq!(first_id(&doc, "create", "node"), "-1");
    assert_eq!(
        doc["osmChange"]["create"]["node"][0]["tag"],
        json!([{ "keyAttributes": { "k": "amenity", "v": "bench" } }])
    );
    assert_eq!(first_id(&doc, "modify", "node"), "2");
    assert_eq!(first_id(&doc, "modify", "way"), "1");
    assert_eq!(first_id(&doc, "delete", "node"), "3");
    assert_eq!(doc["osmChange"]["delete"]["node"][0]["@changeset"], "5");
}
