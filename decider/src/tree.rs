//! Typed behavior-tree model produced by the definition parser.
//!
//! Elements live in an arena owned by [`Tree`]; parents refer to children by
//! [`ElementId`]. Sub-behavior inclusion splices a foreign root's id directly
//! into the including decision's children map, so a spliced sub-tree shares
//! its arena nodes (and their `debug_data`) with every inclusion site.

use std::collections::BTreeMap;

use serde_json::Value;

/// Debug payload a bound behavior attaches to its element each active tick.
pub type DebugData = Value;

/// Index of an element in its [`Tree`]'s arena.
///
/// Ids are only meaningful for the tree that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(pub(crate) usize);

/// A decision selects one of several labeled children every tick.
#[derive(Debug, Clone)]
pub struct DecisionElement {
    pub name: String,
    /// Result label returned by the bound decision logic, to the child it
    /// activates. Exhaustive over the labels the logic may return.
    pub children: BTreeMap<String, ElementId>,
    pub debug_data: DebugData,
}

/// A leaf bound to a single executable behavior.
#[derive(Debug, Clone)]
pub struct ActionElement {
    pub name: String,
    /// Literal `key=value` pairs from the definition, passed verbatim to the
    /// bound action at instantiation.
    pub parameters: BTreeMap<String, String>,
    pub debug_data: DebugData,
}

/// An ordered list of actions executed to completion, one at a time.
///
/// The engine treats the whole sequence as a single stack entry that tracks
/// its own position.
#[derive(Debug, Clone)]
pub struct SequenceElement {
    pub name: String,
    /// Arena ids of the member actions, in declaration order. Always
    /// [`TreeElement::Action`] nodes.
    pub action_elements: Vec<ElementId>,
    pub debug_data: DebugData,
}

/// Closed set of node variants the engine dispatches over.
#[derive(Debug, Clone)]
pub enum TreeElement {
    Decision(DecisionElement),
    Action(ActionElement),
    Sequence(SequenceElement),
}

impl TreeElement {
    pub fn name(&self) -> &str {
        match self {
            TreeElement::Decision(e) => &e.name,
            TreeElement::Action(e) => &e.name,
            TreeElement::Sequence(e) => &e.name,
        }
    }

    pub fn debug_data(&self) -> &DebugData {
        match self {
            TreeElement::Decision(e) => &e.debug_data,
            TreeElement::Action(e) => &e.debug_data,
            TreeElement::Sequence(e) => &e.debug_data,
        }
    }

    pub fn set_debug_data(&mut self, data: DebugData) {
        match self {
            TreeElement::Decision(e) => e.debug_data = data,
            TreeElement::Action(e) => e.debug_data = data,
            TreeElement::Sequence(e) => e.debug_data = data,
        }
    }

    pub fn as_decision(&self) -> Option<&DecisionElement> {
        match self {
            TreeElement::Decision(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionElement> {
        match self {
            TreeElement::Action(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceElement> {
        match self {
            TreeElement::Sequence(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self, TreeElement::Action(_))
    }
}

/// A fully resolved definition: arena, default root, and the named roots
/// declared at file scope (reachable via sub-behavior inclusion).
#[derive(Debug, Clone)]
pub struct Tree {
    elements: Vec<TreeElement>,
    root: ElementId,
    roots: BTreeMap<String, ElementId>,
}

impl Tree {
    pub(crate) fn from_parts(
        elements: Vec<TreeElement>,
        root: ElementId,
        roots: BTreeMap<String, ElementId>,
    ) -> Self {
        Self {
            elements,
            root,
            roots,
        }
    }

    /// Id of the default root element.
    pub fn root_element(&self) -> ElementId {
        self.root
    }

    /// Declared root name to element id, default root included.
    pub fn roots(&self) -> &BTreeMap<String, ElementId> {
        &self.roots
    }

    pub fn root_named(&self, name: &str) -> Option<ElementId> {
        self.roots.get(name).copied()
    }

    /// Look up an element. Ids come from this tree, so the lookup is total.
    pub fn element(&self, id: ElementId) -> &TreeElement {
        &self.elements[id.0]
    }

    /// Mutable lookup, for the engine's `debug_data` writes. The tree is
    /// immutable to everyone else once parsed.
    pub(crate) fn element_mut(&mut self, id: ElementId) -> &mut TreeElement {
        &mut self.elements[id.0]
    }

    /// Child of a decision element activated by `label`.
    ///
    /// Returns `None` when `parent` is not a decision or the label is not
    /// declared for it.
    pub fn get_child(&self, parent: ElementId, label: &str) -> Option<ElementId> {
        self.element(parent)
            .as_decision()
            .and_then(|d| d.children.get(label).copied())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        (0..self.elements.len()).map(ElementId)
    }
}
