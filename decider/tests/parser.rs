//! Structural tests over the fixture definition covering every node kind.

use decider::core::parse::parse_definition;
use decider::tree::Tree;

const FIXTURE: &str = include_str!("fixtures/test.tree");

fn fixture_tree() -> Tree {
    parse_definition(FIXTURE).expect("parse fixture")
}

#[test]
fn root_element_is_the_declared_decision() {
    let tree = fixture_tree();
    let root = tree.element(tree.root_element());
    assert!(root.as_decision().is_some());
    assert_eq!(root.name(), "FirstDecision");
}

#[test]
fn root_children_match_declared_labels_exactly() {
    let tree = fixture_tree();
    let root = tree
        .element(tree.root_element())
        .as_decision()
        .expect("decision");
    let labels: Vec<&str> = root.children.keys().map(String::as_str).collect();
    let mut expected = vec!["ACTION", "DECISION", "SUBBEHAVIOR", "SEQUENCE", "PARAMETERS"];
    expected.sort_unstable();
    assert_eq!(labels, expected);
}

#[test]
fn following_elements_keep_name_and_type() {
    let tree = fixture_tree();
    let root = tree.root_element();

    let first = tree.get_child(root, "ACTION").expect("ACTION child");
    assert_eq!(tree.element(first).name(), "FirstAction");
    assert!(tree.element(first).is_action());

    let second = tree.get_child(root, "DECISION").expect("DECISION child");
    assert_eq!(tree.element(second).name(), "SecondDecision");
    assert!(tree.element(second).as_decision().is_some());
}

#[test]
fn nested_decision_children_are_reachable() {
    let tree = fixture_tree();
    let nested = tree
        .get_child(tree.root_element(), "DECISION")
        .expect("DECISION child");
    let decision = tree.element(nested).as_decision().expect("decision");
    let labels: Vec<&str> = decision.children.keys().map(String::as_str).collect();
    assert_eq!(labels, vec!["FIRST", "SECOND"]);

    let first = tree.get_child(nested, "FIRST").expect("FIRST child");
    assert_eq!(tree.element(first).name(), "FirstAction");
    assert!(tree.element(first).is_action());

    let second = tree.get_child(nested, "SECOND").expect("SECOND child");
    assert_eq!(tree.element(second).name(), "SecondAction");
    assert!(tree.element(second).is_action());
}

#[test]
fn sub_behavior_splices_the_foreign_root() {
    let tree = fixture_tree();
    let spliced = tree
        .get_child(tree.root_element(), "SUBBEHAVIOR")
        .expect("SUBBEHAVIOR child");

    // Indistinguishable from declaring the decision inline.
    assert_eq!(tree.element(spliced).name(), "ThirdDecision");
    let decision = tree.element(spliced).as_decision().expect("decision");
    let labels: Vec<&str> = decision.children.keys().map(String::as_str).collect();
    assert_eq!(labels, vec!["FIRST", "SECOND"]);
    assert_eq!(spliced, tree.root_named("ThirdDecision").expect("root"));

    let first = tree.get_child(spliced, "FIRST").expect("FIRST child");
    assert_eq!(tree.element(first).name(), "FirstAction");
    assert!(tree.element(first).is_action());
}

#[test]
fn sequence_preserves_declaration_order() {
    let tree = fixture_tree();
    let child = tree
        .get_child(tree.root_element(), "SEQUENCE")
        .expect("SEQUENCE child");
    let sequence = tree.element(child).as_sequence().expect("sequence");
    assert_eq!(sequence.action_elements.len(), 2);

    let first = tree.element(sequence.action_elements[0]);
    assert_eq!(first.name(), "FirstAction");
    assert!(first.is_action());
    let second = tree.element(sequence.action_elements[1]);
    assert_eq!(second.name(), "SecondAction");
    assert!(second.is_action());
}

#[test]
fn parameters_are_the_declared_pairs() {
    let tree = fixture_tree();
    let child = tree
        .get_child(tree.root_element(), "PARAMETERS")
        .expect("PARAMETERS child");
    let action = tree.element(child).as_action().expect("action");
    assert_eq!(action.name, "FirstAction");
    assert_eq!(action.parameters.len(), 1);
    assert_eq!(action.parameters.get("key"), Some(&"value".to_string()));
}

#[test]
fn nested_lookup_reaches_the_declared_leaf() {
    let tree = fixture_tree();
    let nested = tree
        .get_child(tree.root_element(), "DECISION")
        .expect("DECISION child");
    let leaf = tree.get_child(nested, "SECOND").expect("SECOND child");
    assert_eq!(tree.element(leaf).name(), "SecondAction");
}
