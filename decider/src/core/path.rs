//! Helpers for rendering deterministic element paths.

use crate::tree::{ElementId, Tree};

/// Render a root-to-leaf stack as a `/`-separated path of element names,
/// with each entry's activation label prefixed where present, e.g.
/// `FirstDecision/SECOND:SecondAction`.
pub fn stack_path<'a, I>(tree: &Tree, stack: I) -> String
where
    I: IntoIterator<Item = (ElementId, Option<&'a str>)>,
{
    let mut segments = Vec::new();
    for (id, reason) in stack {
        let name = tree.element(id).name();
        match reason {
            Some(label) => segments.push(format!("{label}:{name}")),
            None => segments.push(name.to_string()),
        }
    }
    segments.join("/")
}
