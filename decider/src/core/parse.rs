//! Definition-language parser: text in, [`Tree`] out.
//!
//! The language is line-oriented and indentation-nested. `//` starts a
//! comment, blank lines are ignored. `$Name` at column zero opens a named
//! decision block; branch lines below it read `LABEL --> node`, where a node
//! is `@Action key=value ...`, an inline `$Decision` (branches follow at
//! deeper indentation), a `#SubBehavior` reference to another block's root,
//! or a comma-separated list of `@` actions forming a sequence. `--> Name`
//! at column zero designates the default root; without it the first declared
//! block wins. Sub-behavior references may point forward and are resolved
//! once all input has been read, splicing the referenced root directly into
//! the including decision's children map.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use anyhow::{Result, anyhow, bail};
use regex::Regex;
use serde_json::Value;

use crate::core::invariants::validate_invariants;
use crate::tree::{
    ActionElement, DecisionElement, ElementId, SequenceElement, Tree, TreeElement,
};

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// One definition input, with a display name for error messages.
#[derive(Debug, Clone)]
pub struct DefinitionSource {
    pub origin: String,
    pub text: String,
}

/// Parse a single definition text into a resolved tree.
pub fn parse_definition(text: &str) -> Result<Tree> {
    parse_definitions(&[DefinitionSource {
        origin: "<definition>".to_string(),
        text: text.to_string(),
    }])
}

/// Parse one or more definition texts sharing a namespace into a resolved
/// tree. Sub-behavior references resolve across all sources.
pub fn parse_definitions(sources: &[DefinitionSource]) -> Result<Tree> {
    if sources.is_empty() {
        bail!("no definition sources given");
    }
    let mut builder = TreeBuilder::default();
    for source in sources {
        let lines = lex(&source.origin, &source.text)?;
        builder.consume_source(&source.origin, &lines)?;
    }
    builder.finish()
}

#[derive(Debug, Clone, Copy)]
struct At<'a> {
    origin: &'a str,
    line: usize,
}

impl fmt::Display for At<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.line)
    }
}

#[derive(Debug)]
struct Line<'a> {
    indent: usize,
    content: &'a str,
    number: usize,
}

/// Strip comments and blanks, measure indentation.
fn lex<'a>(origin: &str, text: &'a str) -> Result<Vec<Line<'a>>> {
    let mut lines = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let number = idx + 1;
        let code = match raw.find("//") {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let content = code.trim();
        if content.is_empty() {
            continue;
        }
        if code.trim_end().contains('\t') {
            bail!("{origin}:{number}: tabs are not allowed, indent with spaces");
        }
        let indent = code.len() - code.trim_start().len();
        lines.push(Line {
            indent,
            content,
            number,
        });
    }
    Ok(lines)
}

#[derive(Debug)]
struct PendingReference {
    decision: ElementId,
    label: String,
    target: String,
    at: String,
}

#[derive(Debug)]
struct StartDirective {
    target: String,
    at: String,
}

#[derive(Debug, Default)]
struct TreeBuilder {
    elements: Vec<TreeElement>,
    roots: BTreeMap<String, ElementId>,
    first_root: Option<ElementId>,
    pending: Vec<PendingReference>,
    start: Option<StartDirective>,
}

/// Result of parsing one branch target: an arena element, or a sub-behavior
/// reference patched in after all blocks are known.
enum NodeRef {
    Element(ElementId),
    Reference(String),
}

impl TreeBuilder {
    fn consume_source(&mut self, origin: &str, lines: &[Line<'_>]) -> Result<()> {
        let mut pos = 0;
        while pos < lines.len() {
            let line = &lines[pos];
            let at = At {
                origin,
                line: line.number,
            };
            if line.indent != 0 {
                bail!("{at}: expected '$Name' block or '--> Name' directive at column zero");
            }
            if let Some(rest) = line.content.strip_prefix("-->") {
                let target = ident(rest.trim(), at, "start directive")?;
                if let Some(previous) = &self.start {
                    bail!("{at}: duplicate start directive (already set at {})", previous.at);
                }
                self.start = Some(StartDirective {
                    target,
                    at: at.to_string(),
                });
                pos += 1;
                continue;
            }
            let Some(rest) = line.content.strip_prefix('$') else {
                bail!("{at}: expected '$Name' block or '--> Name' directive, got '{}'", line.content);
            };
            let name = ident(rest, at, "decision")?;
            if self.roots.contains_key(&name) {
                bail!("{at}: duplicate decision block '${name}'");
            }
            pos += 1;
            let id = self.parse_decision(origin, lines, &mut pos, name.clone(), 0, at)?;
            self.roots.insert(name, id);
            if self.first_root.is_none() {
                self.first_root = Some(id);
            }
        }
        Ok(())
    }

    /// Parse the branch list of a decision whose header sits at
    /// `parent_indent`. The first branch line fixes the expected indent;
    /// a dedent closes the block.
    fn parse_decision(
        &mut self,
        origin: &str,
        lines: &[Line<'_>],
        pos: &mut usize,
        name: String,
        parent_indent: usize,
        opened_at: At<'_>,
    ) -> Result<ElementId> {
        let id = self.alloc(TreeElement::Decision(DecisionElement {
            name: name.clone(),
            children: BTreeMap::new(),
            debug_data: Value::Null,
        }));

        let child_indent = match lines.get(*pos) {
            Some(first) if first.indent > parent_indent => first.indent,
            _ => bail!("{opened_at}: decision '${name}' has no branches"),
        };

        while let Some(line) = lines.get(*pos) {
            if line.indent < child_indent {
                break;
            }
            let at = At {
                origin,
                line: line.number,
            };
            if line.indent > child_indent {
                bail!("{at}: unexpected indentation");
            }
            let Some((label_raw, target_raw)) = line.content.split_once("-->") else {
                bail!("{at}: expected 'LABEL --> node', got '{}'", line.content);
            };
            let label = ident(label_raw.trim(), at, "branch label")?;
            *pos += 1;
            match self.parse_node(origin, lines, pos, target_raw.trim(), child_indent, at)? {
                NodeRef::Element(child) => self.add_child(id, &label, child, at)?,
                NodeRef::Reference(target) => self.pending.push(PendingReference {
                    decision: id,
                    label,
                    target,
                    at: at.to_string(),
                }),
            }
        }
        Ok(id)
    }

    fn parse_node(
        &mut self,
        origin: &str,
        lines: &[Line<'_>],
        pos: &mut usize,
        target: &str,
        indent: usize,
        at: At<'_>,
    ) -> Result<NodeRef> {
        if let Some(rest) = target.strip_prefix('$') {
            let name = ident(rest, at, "decision")?;
            let id = self.parse_decision(origin, lines, pos, name, indent, at)?;
            return Ok(NodeRef::Element(id));
        }
        if let Some(rest) = target.strip_prefix('#') {
            let name = ident(rest, at, "sub-behavior reference")?;
            return Ok(NodeRef::Reference(name));
        }
        if target.starts_with('@') {
            let items: Vec<&str> = target.split(',').map(str::trim).collect();
            if items.len() == 1 {
                return Ok(NodeRef::Element(self.parse_action(items[0], at)?));
            }
            let mut action_elements = Vec::with_capacity(items.len());
            let mut names = Vec::with_capacity(items.len());
            for item in &items {
                let action = self.parse_action(item, at)?;
                names.push(self.elements[action.0].name().to_string());
                action_elements.push(action);
            }
            let id = self.alloc(TreeElement::Sequence(SequenceElement {
                name: names.join(", "),
                action_elements,
                debug_data: Value::Null,
            }));
            return Ok(NodeRef::Element(id));
        }
        bail!("{at}: expected '@Action', '$Decision', or '#SubBehavior', got '{target}'");
    }

    /// `@Name key=value ...` — sequences route every member through here,
    /// which is what rejects nested decisions or sequences inside one.
    fn parse_action(&mut self, item: &str, at: At<'_>) -> Result<ElementId> {
        let mut tokens = item.split_whitespace();
        let head = tokens.next().unwrap_or_default();
        let Some(raw_name) = head.strip_prefix('@') else {
            bail!("{at}: expected '@Action', got '{item}'");
        };
        let name = ident(raw_name, at, "action")?;
        let mut parameters = BTreeMap::new();
        for token in tokens {
            let Some((key, value)) = token.split_once('=') else {
                bail!("{at}: expected 'key=value' parameter, got '{token}'");
            };
            let key = ident(key, at, "parameter")?;
            if parameters.insert(key.clone(), value.to_string()).is_some() {
                bail!("{at}: duplicate parameter '{key}' for action '{name}'");
            }
        }
        Ok(self.alloc(TreeElement::Action(ActionElement {
            name,
            parameters,
            debug_data: Value::Null,
        })))
    }

    fn add_child(&mut self, decision: ElementId, label: &str, child: ElementId, at: At<'_>) -> Result<()> {
        let TreeElement::Decision(element) = &mut self.elements[decision.0] else {
            bail!("{at}: internal: branch added to non-decision element");
        };
        if element.children.contains_key(label) {
            bail!(
                "{at}: duplicate branch label '{label}' under decision '{}'",
                element.name
            );
        }
        element.children.insert(label.to_string(), child);
        Ok(())
    }

    fn alloc(&mut self, element: TreeElement) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(element);
        id
    }

    /// Resolve sub-behavior references, pick the default root, validate.
    fn finish(mut self) -> Result<Tree> {
        for pending in std::mem::take(&mut self.pending) {
            let Some(&target) = self.roots.get(&pending.target) else {
                bail!(
                    "{}: reference to unknown decision '#{}'",
                    pending.at,
                    pending.target
                );
            };
            let at_msg = pending.at.clone();
            let TreeElement::Decision(element) = &mut self.elements[pending.decision.0] else {
                bail!("{at_msg}: internal: branch added to non-decision element");
            };
            if element.children.contains_key(&pending.label) {
                bail!(
                    "{at_msg}: duplicate branch label '{}' under decision '{}'",
                    pending.label,
                    element.name
                );
            }
            element.children.insert(pending.label, target);
        }

        let root = match &self.start {
            Some(directive) => self.roots.get(&directive.target).copied().ok_or_else(|| {
                anyhow!(
                    "{}: start directive names unknown decision '{}'",
                    directive.at,
                    directive.target
                )
            })?,
            None => self
                .first_root
                .ok_or_else(|| anyhow!("no decision blocks declared"))?,
        };

        let tree = Tree::from_parts(self.elements, root, self.roots);
        let errors = validate_invariants(&tree);
        if !errors.is_empty() {
            bail!("definition invariants failed:\n- {}", errors.join("\n- "));
        }
        Ok(tree)
    }
}

fn ident(text: &str, at: At<'_>, what: &str) -> Result<String> {
    if !IDENT_RE.is_match(text) {
        bail!("{at}: invalid {what} identifier '{text}'");
    }
    Ok(text.to_string())
}
