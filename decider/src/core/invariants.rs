//! Structural invariants checked after reference resolution.

use std::collections::BTreeSet;

use crate::tree::{ElementId, Tree, TreeElement};

/// Check invariants the grammar alone cannot guarantee:
/// - Every decision has at least one branch
/// - Every sequence has at least one member, and members are actions
/// - The children graph is acyclic (sub-behavior splices form a DAG)
pub fn validate_invariants(tree: &Tree) -> Vec<String> {
    let mut errors = Vec::new();

    for id in tree.ids() {
        match tree.element(id) {
            TreeElement::Decision(decision) => {
                if decision.children.is_empty() {
                    errors.push(format!("decision '{}' has no branches", decision.name));
                }
            }
            TreeElement::Sequence(sequence) => {
                if sequence.action_elements.is_empty() {
                    errors.push(format!("sequence '{}' has no actions", sequence.name));
                }
                for &member in &sequence.action_elements {
                    if !tree.element(member).is_action() {
                        errors.push(format!(
                            "sequence '{}' contains non-action member '{}'",
                            sequence.name,
                            tree.element(member).name()
                        ));
                    }
                }
            }
            TreeElement::Action(_) => {}
        }
    }

    for (name, &root) in tree.roots() {
        if let Some(cycle_at) = find_cycle(tree, root) {
            errors.push(format!(
                "decision '{}' is reachable from itself via sub-behavior inclusion (from root '{}')",
                tree.element(cycle_at).name(),
                name
            ));
        }
    }

    errors
}

/// Depth-first walk over decision children; returns an element on a cycle.
fn find_cycle(tree: &Tree, root: ElementId) -> Option<ElementId> {
    let mut on_path = BTreeSet::new();
    let mut done = BTreeSet::new();
    walk(tree, root, &mut on_path, &mut done)
}

fn walk(
    tree: &Tree,
    id: ElementId,
    on_path: &mut BTreeSet<ElementId>,
    done: &mut BTreeSet<ElementId>,
) -> Option<ElementId> {
    if done.contains(&id) {
        return None;
    }
    if !on_path.insert(id) {
        return Some(id);
    }
    if let TreeElement::Decision(decision) = tree.element(id) {
        for &child in decision.children.values() {
            if on_path.contains(&child) {
                return Some(child);
            }
            if let Some(found) = walk(tree, child, on_path, done) {
                return Some(found);
            }
        }
    }
    on_path.remove(&id);
    done.insert(id);
    None
}
