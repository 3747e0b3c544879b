//! Debug mirroring: publish the active stack as a nested snapshot and
//! rebuild an equivalent stack on a decision-free replica.
//!
//! The producer side serializes top-down: one record per stack entry with
//! the element type, the label that activated it, and its debug payload
//! (sequences carry a `content` list with one payload per member action
//! instead). The consumer side holds the same tree but no behavior logic;
//! it reconstructs the stack purely by child lookup on each record's
//! activation reason. Every snapshot is complete, so a missed message means
//! lag, never corruption.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::StackEngine;
use crate::io::transport::{DebugPublisher, DebugSubscription};
use crate::tree::{DebugData, ElementId, Tree, TreeElement};

/// Element type tag on the wire.
///
/// `Abstract` is never produced by this engine but stays in the wire enum:
/// a snapshot carrying it anywhere is rejected by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Decision,
    Action,
    Sequence,
    Abstract,
}

/// Per-member debug payload inside a sequence record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStepRecord {
    pub debug_data: DebugData,
}

/// One stack entry on the wire; `next` nests the entry below it.
///
/// The root record carries `activation_reason: null`; `next: null` marks the
/// current leaf. `debug_data` is omitted for sequences, which carry
/// `content` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub activation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_data: Option<DebugData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<SequenceStepRecord>>,
    pub next: Option<Box<DebugRecord>>,
}

/// Serialize the engine's active stack top-down into a nested record.
///
/// `None` when the stack is empty (nothing to mirror yet).
pub fn snapshot<C>(engine: &StackEngine<C>) -> Option<DebugRecord> {
    let tree = engine.tree();
    let entries: Vec<(ElementId, Option<String>)> = engine
        .stack()
        .map(|(id, reason)| (id, reason.map(str::to_string)))
        .collect();

    let mut record = None;
    for (id, activation_reason) in entries.into_iter().rev() {
        let (kind, debug_data, content) = match tree.element(id) {
            TreeElement::Decision(element) => {
                (RecordKind::Decision, Some(element.debug_data.clone()), None)
            }
            TreeElement::Action(element) => {
                (RecordKind::Action, Some(element.debug_data.clone()), None)
            }
            TreeElement::Sequence(element) => {
                let content = element
                    .action_elements
                    .iter()
                    .map(|&member| SequenceStepRecord {
                        debug_data: tree.element(member).debug_data().clone(),
                    })
                    .collect();
                (RecordKind::Sequence, None, Some(content))
            }
        };
        record = Some(DebugRecord {
            kind,
            activation_reason,
            debug_data,
            content,
            next: record.map(Box::new),
        });
    }
    record
}

/// JSON payload for one snapshot, or `None` when the stack is empty.
pub fn serialize_stack<C>(engine: &StackEngine<C>) -> Result<Option<String>> {
    match snapshot(engine) {
        Some(record) => Ok(Some(
            serde_json::to_string(&record).context("serialize stack snapshot")?,
        )),
        None => Ok(None),
    }
}

/// Serialize and publish the current stack; the per-tick producer call.
/// No-op on an empty stack.
pub fn publish_stack<C, P: DebugPublisher + ?Sized>(
    engine: &StackEngine<C>,
    publisher: &mut P,
) -> Result<()> {
    if let Some(payload) = serialize_stack(engine)? {
        publisher.publish(&payload)?;
    }
    Ok(())
}

/// Replica validity as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorState {
    /// No snapshot accepted yet.
    NotReceived,
    /// The replica stack matches the last accepted snapshot.
    Valid,
    /// The last snapshot was rejected for the contained reason; the replica
    /// exposes no stack until the next valid snapshot arrives.
    Invalid(String),
}

/// Decision-free replica of a remote engine's active stack.
///
/// Holds the same parsed tree as the producer but never invokes behavior
/// logic; stacks are rebuilt from snapshots alone. Byte-identical repeats of
/// the last accepted payload are ignored. A rejected snapshot clears the
/// replica rather than fabricating a fallback stack.
pub struct MirrorEngine {
    engine: StackEngine<()>,
    subscription: Option<Box<dyn DebugSubscription>>,
    cached_payload: Option<String>,
    state: MirrorState,
}

impl MirrorEngine {
    pub fn new(tree: Tree) -> Self {
        Self {
            engine: StackEngine::passive(tree),
            subscription: None,
            cached_payload: None,
            state: MirrorState::NotReceived,
        }
    }

    pub fn with_subscription(tree: Tree, subscription: Box<dyn DebugSubscription>) -> Self {
        let mut mirror = Self::new(tree);
        mirror.subscription = Some(subscription);
        mirror
    }

    pub fn state(&self) -> &MirrorState {
        &self.state
    }

    pub fn tree(&self) -> &Tree {
        self.engine.tree()
    }

    /// Ordered view of the replica stack, root first.
    pub fn stack(&self) -> impl Iterator<Item = (ElementId, Option<&str>)> {
        self.engine.stack()
    }

    pub fn active_path(&self) -> String {
        self.engine.active_path()
    }

    /// Drain pending snapshots in arrival order.
    ///
    /// Subscription failures are reported and swallowed; the replica keeps
    /// whatever state it had. Returns whether the replica changed.
    pub fn poll(&mut self) -> bool {
        let mut payloads = Vec::new();
        if let Some(subscription) = self.subscription.as_mut() {
            loop {
                match subscription.try_next() {
                    Ok(Some(payload)) => payloads.push(payload),
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "debug subscription failed");
                        break;
                    }
                }
            }
        }
        let mut changed = false;
        for payload in &payloads {
            changed |= self.apply_payload(payload);
        }
        changed
    }

    /// Apply one snapshot payload. Returns whether the replica changed.
    pub fn apply_payload(&mut self, payload: &str) -> bool {
        if self.cached_payload.as_deref() == Some(payload) {
            return false;
        }
        match self.rebuild(payload) {
            Ok(()) => {
                self.cached_payload = Some(payload.to_string());
                self.state = MirrorState::Valid;
                debug!(path = %self.engine.active_path(), "mirrored stack");
                true
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "rejected stack snapshot");
                self.engine.close(&mut ());
                self.cached_payload = None;
                self.state = MirrorState::Invalid(format!("{err:#}"));
                true
            }
        }
    }

    /// Release the subscription. Idempotent; the replica stack is kept.
    pub fn close(&mut self) {
        if self.subscription.take().is_some() {
            debug!("debug subscription released");
        }
    }

    fn rebuild(&mut self, payload: &str) -> Result<()> {
        let record: DebugRecord =
            serde_json::from_str(payload).context("parse stack snapshot")?;
        if record.activation_reason.is_some() {
            bail!("root record must not carry an activation reason");
        }

        let root = self.engine.tree().root_element();
        self.engine.set_start_element(root, &mut ())?;
        self.apply_record(root, &record)?;

        let mut parent = root;
        let mut cursor = record.next.as_deref();
        while let Some(rec) = cursor {
            let Some(reason) = rec.activation_reason.clone() else {
                bail!(
                    "missing activation reason below '{}'",
                    self.engine.tree().element(parent).name()
                );
            };
            let child = {
                let tree = self.engine.tree();
                match tree.element(parent) {
                    TreeElement::Decision(decision) => {
                        let Some(&child) = decision.children.get(&reason) else {
                            bail!(
                                "unknown activation label '{reason}' under decision '{}'",
                                decision.name
                            );
                        };
                        child
                    }
                    leaf => bail!("remote stack extends past leaf element '{}'", leaf.name()),
                }
            };
            self.apply_record(child, rec)?;
            self.engine.push(child, Some(reason))?;
            parent = child;
            cursor = rec.next.as_deref();
        }
        Ok(())
    }

    /// Check a record against the element it lands on and store its debug
    /// payload there.
    fn apply_record(&mut self, id: ElementId, record: &DebugRecord) -> Result<()> {
        if record.kind == RecordKind::Abstract {
            bail!("snapshot carries an abstract element in the remote stack");
        }
        let expected = match self.engine.tree().element(id) {
            TreeElement::Decision(_) => RecordKind::Decision,
            TreeElement::Action(_) => RecordKind::Action,
            TreeElement::Sequence(_) => RecordKind::Sequence,
        };
        if record.kind != expected {
            bail!(
                "snapshot type {:?} does not match element '{}'",
                record.kind,
                self.engine.tree().element(id).name()
            );
        }
        if expected == RecordKind::Sequence {
            let Some(content) = &record.content else {
                bail!(
                    "sequence record for '{}' has no content list",
                    self.engine.tree().element(id).name()
                );
            };
            let members = match self.engine.tree().element(id) {
                TreeElement::Sequence(sequence) => sequence.action_elements.clone(),
                _ => Vec::new(),
            };
            if content.len() != members.len() {
                bail!(
                    "sequence record for '{}' carries {} payloads for {} actions",
                    self.engine.tree().element(id).name(),
                    content.len(),
                    members.len()
                );
            }
            for (&member, step) in members.iter().zip(content) {
                self.engine
                    .tree_mut()
                    .element_mut(member)
                    .set_debug_data(step.debug_data.clone());
            }
        } else {
            let data = record.debug_data.clone().unwrap_or(DebugData::Null);
            self.engine.tree_mut().element_mut(id).set_debug_data(data);
        }
        Ok(())
    }
}
