//! Text rendering of the mirrored stack.
//!
//! The active path renders as an indented tree: each on-stack decision shows
//! all of its branches, with the activated one expanded and the others left
//! as single context lines. Below the tree, each stack entry's debug data is
//! flattened to `key: value` lines (lists by index, maps by key, scalars
//! inline).

use decider::mirror::{MirrorEngine, MirrorState};
use decider::tree::{ElementId, Tree, TreeElement};
use serde_json::Value;

/// Render the full viewer output for the current replica state.
pub fn render(mirror: &MirrorEngine) -> String {
    match mirror.state() {
        MirrorState::NotReceived => placeholder(),
        MirrorState::Invalid(reason) => invalid_notice(reason),
        MirrorState::Valid => {
            let stack: Vec<(ElementId, Option<&str>)> = mirror.stack().collect();
            let mut out = String::new();
            stack_lines(mirror.tree(), &stack, 0, &mut out);
            let debug = debug_lines(mirror.tree(), &stack);
            if !debug.is_empty() {
                out.push('\n');
                out.push_str(&debug.join("\n"));
                out.push('\n');
            }
            out
        }
    }
}

fn placeholder() -> String {
    "no snapshot received from the engine yet\n\
     make sure that:\n\
     - the decider is running\n\
     - mirroring is enabled (mirror.enabled = true)\n\
     - this viewer reads the stream the engine writes to\n"
        .to_string()
}

fn invalid_notice(reason: &str) -> String {
    format!("rejected last snapshot: {reason}\nwaiting for the next snapshot\n")
}

/// One line per element: decisions in brackets, leaves in parentheses, the
/// active path marked with `*`.
fn display(tree: &Tree, id: ElementId, active: bool) -> String {
    let marker = if active { "*" } else { "·" };
    match tree.element(id) {
        TreeElement::Decision(element) => format!("{marker} [{}]", element.name),
        TreeElement::Sequence(element) => format!("{marker} (Sequence: {})", element.name),
        TreeElement::Action(element) => format!("{marker} ({})", element.name),
    }
}

/// Recursively render the stack suffix starting at `stack[0]`: every branch
/// of an on-stack decision appears, but only the activated one is expanded
/// further.
fn stack_lines(tree: &Tree, stack: &[(ElementId, Option<&str>)], depth: usize, out: &mut String) {
    let (id, _) = stack[0];
    let indent = "    ".repeat(depth);
    out.push_str(&format!("{indent}{}\n", display(tree, id, true)));

    let Some(decision) = tree.element(id).as_decision() else {
        return;
    };
    for (label, &child) in &decision.children {
        let on_stack = stack.len() > 1 && stack[1].1 == Some(label.as_str()) && stack[1].0 == child;
        if on_stack {
            out.push_str(&format!("{indent}  {label} -->\n"));
            stack_lines(tree, &stack[1..], depth + 1, out);
        } else {
            out.push_str(&format!(
                "{indent}  {label} --> {}\n",
                display(tree, child, false)
            ));
        }
    }
}

/// Flatten every stack entry's debug data, blank line between entries.
fn debug_lines(tree: &Tree, stack: &[(ElementId, Option<&str>)]) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for &(id, _) in stack {
        let element = tree.element(id);
        let mut entry = Vec::new();
        match element {
            TreeElement::Sequence(sequence) => {
                for &member in &sequence.action_elements {
                    let action = tree.element(member);
                    flatten(action.name(), action.debug_data(), 0, &mut entry);
                }
            }
            _ => flatten(element.name(), element.debug_data(), 0, &mut entry),
        }
        if entry.is_empty() {
            continue;
        }
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.append(&mut entry);
    }
    lines
}

/// `label: value` lines; lists recurse by index, maps by key, null prints
/// nothing.
fn flatten(label: &str, value: &Value, depth: usize, out: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Null => {}
        Value::Array(items) => {
            out.push(format!("{indent}{label}:"));
            for (index, item) in items.iter().enumerate() {
                flatten(&index.to_string(), item, depth + 1, out);
            }
        }
        Value::Object(map) => {
            out.push(format!("{indent}{label}:"));
            for (key, item) in map {
                flatten(key, item, depth + 1, out);
            }
        }
        Value::String(text) => out.push(format!("{indent}{label}: {text}")),
        scalar => out.push(format!("{indent}{label}: {scalar}")),
    }
}
