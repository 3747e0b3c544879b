//! Stack-based execution over a parsed tree.
//!
//! The engine's complete state is the active stack: the root-to-leaf path
//! currently selected, one entry per element, each carrying the activation
//! reason its parent chose it by and the lazily instantiated behavior bound
//! to it. Every tick re-derives the path from the top, keeps whatever still
//! matches, and unwinds exactly the stale suffix (exit hooks leaf-first)
//! before pushing the newly selected elements.

use std::fmt;

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};

use crate::behavior::{Action, BehaviorRegistry, Decision};
use crate::core::path::stack_path;
use crate::core::types::{ActionStatus, TickOutcome};
use crate::tree::{ElementId, Tree, TreeElement};

/// A decision callback returned a label its element does not declare.
///
/// Surfaced through `anyhow::Error`; recover with `downcast_ref` when the
/// caller wants to treat arbitration failures differently from behavior
/// errors. The stack is left unchanged at the failing depth.
#[derive(Debug, Clone)]
pub struct UnknownOutcomeError {
    pub decision: String,
    pub outcome: String,
    pub declared: Vec<String>,
}

impl fmt::Display for UnknownOutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "decision '{}' returned undeclared outcome '{}' (declared: {})",
            self.decision,
            self.outcome,
            self.declared.join(", ")
        )
    }
}

impl std::error::Error for UnknownOutcomeError {}

enum Binding<C> {
    Decision {
        logic: Box<dyn Decision<C>>,
        last_outcome: Option<String>,
    },
    Action {
        logic: Box<dyn Action<C>>,
    },
    Sequence {
        steps: Vec<Box<dyn Action<C>>>,
        position: usize,
    },
}

struct StackEntry<C> {
    element: ElementId,
    reason: Option<String>,
    binding: Option<Binding<C>>,
}

impl<C> StackEntry<C> {
    /// Run exit hooks for this entry. A sequence only exits its in-progress
    /// step; completed steps already ran theirs when the sequence advanced.
    fn finalize(&mut self, ctx: &mut C) {
        match self.binding.as_mut() {
            Some(Binding::Decision { logic, .. }) => logic.on_exit(ctx),
            Some(Binding::Action { logic }) => logic.on_exit(ctx),
            Some(Binding::Sequence { steps, position }) => {
                if let Some(step) = steps.get_mut(*position) {
                    step.on_exit(ctx);
                }
            }
            None => {}
        }
        self.binding = None;
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Decision,
    Action,
    Sequence,
}

/// The arbitration engine: owns the tree, the active stack, and the
/// instantiated behavior bindings.
///
/// `C` is the integrator's context type, passed by `&mut` into every
/// behavior invocation. A passive engine (no registry) instantiates nothing
/// and cannot tick; the mirroring consumer uses one to rebuild stacks from
/// remote snapshots via [`StackEngine::push`].
pub struct StackEngine<C> {
    tree: Tree,
    registry: Option<Box<dyn BehaviorRegistry<C>>>,
    stack: Vec<StackEntry<C>>,
}

impl<C> StackEngine<C> {
    pub fn new(tree: Tree, registry: Box<dyn BehaviorRegistry<C>>) -> Self {
        Self {
            tree,
            registry: Some(registry),
            stack: Vec::new(),
        }
    }

    /// Engine without behaviors, for stack reconstruction only.
    pub fn passive(tree: Tree) -> Self {
        Self {
            tree,
            registry: None,
            stack: Vec::new(),
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// Ordered view of the active stack, root first.
    pub fn stack(&self) -> impl Iterator<Item = (ElementId, Option<&str>)> {
        self.stack
            .iter()
            .map(|entry| (entry.element, entry.reason.as_deref()))
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// `/`-joined rendering of the active stack for logs and errors.
    pub fn active_path(&self) -> String {
        stack_path(&self.tree, self.stack())
    }

    /// Reset the stack to contain exactly `element`, finalizing (exit hooks,
    /// leaf-first) whatever was on it. The new root's behavior is
    /// instantiated lazily through the registry.
    pub fn set_start_element(&mut self, element: ElementId, ctx: &mut C) -> Result<()> {
        self.truncate(0, ctx);
        self.push_entry(element, None)
    }

    /// Append one element without decision re-evaluation.
    ///
    /// This is the mirror-reconstruction path: the pushed element must be
    /// the child its parent's declared `reason` label activates, and nothing
    /// can be pushed below an action or sequence leaf.
    pub fn push(&mut self, element: ElementId, reason: Option<String>) -> Result<()> {
        if let Some(top) = self.stack.last() {
            let top_id = top.element;
            let Some(label) = reason.as_deref() else {
                bail!(
                    "activation reason required to push below '{}'",
                    self.tree.element(top_id).name()
                );
            };
            match self.tree.element(top_id) {
                TreeElement::Decision(parent) => {
                    let Some(&child) = parent.children.get(label) else {
                        bail!(
                            "'{label}' is not a declared result of decision '{}'",
                            parent.name
                        );
                    };
                    if child != element {
                        bail!(
                            "element '{}' is not the child activated by '{label}' under '{}'",
                            self.tree.element(element).name(),
                            parent.name
                        );
                    }
                }
                leaf => bail!(
                    "cannot push '{}' below leaf element '{}'",
                    self.tree.element(element).name(),
                    leaf.name()
                ),
            }
        }
        self.push_entry(element, reason)
    }

    /// One control tick.
    ///
    /// Walks the stack from the root. Each decision either re-decides
    /// (`reevaluate`) or reuses its recorded outcome; an unchanged outcome
    /// keeps the suffix below it untouched (sequence position preserved, no
    /// hooks fire), a changed one truncates there (exit hooks leaf-first,
    /// all before any push) and descends into the newly selected child. The
    /// reached leaf executes once. A first tick on an empty stack roots it
    /// at the tree's default root.
    #[instrument(skip_all, fields(reevaluate = reevaluate))]
    pub fn update(&mut self, ctx: &mut C, reevaluate: bool) -> Result<TickOutcome> {
        if self.registry.is_none() {
            bail!("passive engine cannot tick (no behavior registry bound)");
        }
        if self.stack.is_empty() {
            let root = self.tree.root_element();
            self.push_entry(root, None)?;
        }

        let mut index = 0;
        loop {
            let id = self.stack[index].element;
            let kind = match self.tree.element(id) {
                TreeElement::Decision(_) => Kind::Decision,
                TreeElement::Action(_) => Kind::Action,
                TreeElement::Sequence(_) => Kind::Sequence,
            };
            match kind {
                Kind::Decision => {
                    let outcome = self.decide_at(index, ctx, reevaluate)?;
                    let Some(child) = self.tree.get_child(id, &outcome) else {
                        let decision = self
                            .tree
                            .element(id)
                            .as_decision()
                            .map(|d| {
                                (
                                    d.name.clone(),
                                    d.children.keys().cloned().collect::<Vec<_>>(),
                                )
                            })
                            .unwrap_or_default();
                        return Err(UnknownOutcomeError {
                            decision: decision.0,
                            outcome,
                            declared: decision.1,
                        }
                        .into());
                    };
                    let keep = self.stack.get(index + 1).is_some_and(|next| {
                        next.element == child && next.reason.as_deref() == Some(outcome.as_str())
                    });
                    if !keep {
                        self.truncate(index + 1, ctx);
                        self.push_entry(child, Some(outcome))?;
                    }
                    index += 1;
                }
                Kind::Action => return self.tick_action(index, ctx),
                Kind::Sequence => return self.tick_sequence(index, ctx),
            }
        }
    }

    /// Finalize every stack entry (leaf-first) and clear the stack.
    /// Idempotent; a later `update` re-roots the engine (explicit restart).
    pub fn close(&mut self, ctx: &mut C) {
        self.truncate(0, ctx);
    }

    fn decide_at(&mut self, index: usize, ctx: &mut C, reevaluate: bool) -> Result<String> {
        let id = self.stack[index].element;
        let entry = &mut self.stack[index];
        let Some(Binding::Decision {
            logic,
            last_outcome,
        }) = entry.binding.as_mut()
        else {
            bail!(
                "decision element '{}' has no decision binding",
                self.tree.element(id).name()
            );
        };
        if !reevaluate {
            if let Some(previous) = last_outcome {
                return Ok(previous.clone());
            }
        }
        let outcome = logic.decide(ctx)?;
        *last_outcome = Some(outcome.clone());
        let data = logic.debug_data();
        self.tree.element_mut(id).set_debug_data(data);
        debug!(
            decision = %self.tree.element(id).name(),
            outcome = %outcome,
            "decided"
        );
        Ok(outcome)
    }

    fn tick_action(&mut self, index: usize, ctx: &mut C) -> Result<TickOutcome> {
        let id = self.stack[index].element;
        let entry = &mut self.stack[index];
        let Some(Binding::Action { logic }) = entry.binding.as_mut() else {
            bail!(
                "action element '{}' has no action binding",
                self.tree.element(id).name()
            );
        };
        let status = logic.execute(ctx)?;
        let data = logic.debug_data();
        self.tree.element_mut(id).set_debug_data(data);
        Ok(match status {
            ActionStatus::Complete => TickOutcome::LeafComplete,
            ActionStatus::Running => TickOutcome::Running,
        })
    }

    fn tick_sequence(&mut self, index: usize, ctx: &mut C) -> Result<TickOutcome> {
        let id = self.stack[index].element;
        let action_ids = match self.tree.element(id) {
            TreeElement::Sequence(sequence) => sequence.action_elements.clone(),
            _ => bail!("sequence binding on non-sequence element"),
        };
        let entry = &mut self.stack[index];
        let Some(Binding::Sequence { steps, position }) = entry.binding.as_mut() else {
            bail!(
                "sequence element '{}' has no sequence binding",
                self.tree.element(id).name()
            );
        };
        if *position >= steps.len() {
            // Exhausted: keep reporting completion without re-running
            // actions until the parent decision selects something else.
            return Ok(TickOutcome::LeafComplete);
        }
        let current = *position;
        let status = steps[current].execute(ctx)?;
        let data = steps[current].debug_data();
        let outcome = if status == ActionStatus::Complete {
            steps[current].on_exit(ctx);
            *position += 1;
            if *position == steps.len() {
                TickOutcome::LeafComplete
            } else {
                TickOutcome::Running
            }
        } else {
            TickOutcome::Running
        };
        self.tree.element_mut(action_ids[current]).set_debug_data(data);
        Ok(outcome)
    }

    /// Pop and finalize entries until the stack is `depth` long. Hooks run
    /// leaf-first and always complete before any subsequent push.
    fn truncate(&mut self, depth: usize, ctx: &mut C) {
        while self.stack.len() > depth {
            if let Some(mut entry) = self.stack.pop() {
                entry.finalize(ctx);
                debug!(element = %self.tree.element(entry.element).name(), "popped");
            }
        }
    }

    fn push_entry(&mut self, element: ElementId, reason: Option<String>) -> Result<()> {
        let binding = self.instantiate(element)?;
        debug!(element = %self.tree.element(element).name(), "pushed");
        self.stack.push(StackEntry {
            element,
            reason,
            binding,
        });
        Ok(())
    }

    fn instantiate(&self, element: ElementId) -> Result<Option<Binding<C>>> {
        let Some(registry) = &self.registry else {
            return Ok(None);
        };
        let binding = match self.tree.element(element) {
            TreeElement::Decision(decision) => Binding::Decision {
                logic: registry
                    .decision(&decision.name)
                    .with_context(|| format!("instantiate decision '{}'", decision.name))?,
                last_outcome: None,
            },
            TreeElement::Action(action) => Binding::Action {
                logic: registry
                    .action(&action.name, &action.parameters)
                    .with_context(|| format!("instantiate action '{}'", action.name))?,
            },
            TreeElement::Sequence(sequence) => {
                let mut steps = Vec::with_capacity(sequence.action_elements.len());
                for &member in &sequence.action_elements {
                    let Some(action) = self.tree.element(member).as_action() else {
                        bail!(
                            "sequence '{}' contains non-action member '{}'",
                            sequence.name,
                            self.tree.element(member).name()
                        );
                    };
                    steps.push(
                        registry
                            .action(&action.name, &action.parameters)
                            .with_context(|| format!("instantiate action '{}'", action.name))?,
                    );
                }
                Binding::Sequence { steps, position: 0 }
            }
        };
        Ok(Some(binding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parse::parse_definition;
    use crate::test_support::ScriptedRegistry;

    const LAYERED: &str = "\
$Root
    STAY --> @Idle
    DIVE --> $Lower
        LEFT --> @Left
        RIGHT --> @Right
    RUN --> @First, @Second
";

    fn engine_with(registry: &ScriptedRegistry) -> StackEngine<()> {
        let tree = parse_definition(LAYERED).expect("parse");
        StackEngine::new(tree, Box::new(registry.clone()))
    }

    #[test]
    fn first_tick_roots_and_descends_to_action() {
        let registry = ScriptedRegistry::new();
        registry.set_outcome("Root", "STAY");
        let mut engine = engine_with(&registry);

        let outcome = engine.update(&mut (), true).expect("tick");
        assert_eq!(outcome, TickOutcome::Running);
        assert_eq!(engine.active_path(), "Root/STAY:Idle");
        assert_eq!(
            registry.events(),
            vec!["init:Root", "decide:Root=STAY", "init:Idle", "exec:Idle"]
        );
    }

    #[test]
    fn unchanged_outcome_keeps_stack_without_hooks() {
        let registry = ScriptedRegistry::new();
        registry.set_outcome("Root", "STAY");
        let mut engine = engine_with(&registry);

        engine.update(&mut (), true).expect("tick 1");
        registry.clear_events();
        engine.update(&mut (), true).expect("tick 2");

        assert_eq!(engine.active_path(), "Root/STAY:Idle");
        let events = registry.events();
        assert!(events.iter().all(|event| !event.starts_with("exit:")));
        assert!(events.iter().all(|event| !event.starts_with("init:")));
        assert_eq!(events, vec!["decide:Root=STAY", "exec:Idle"]);
    }

    #[test]
    fn changed_outcome_unwinds_leaf_first_before_pushing() {
        let registry = ScriptedRegistry::new();
        registry.set_outcome("Root", "DIVE");
        registry.set_outcome("Lower", "LEFT");
        let mut engine = engine_with(&registry);
        engine.update(&mut (), true).expect("tick 1");
        assert_eq!(engine.active_path(), "Root/DIVE:Lower/LEFT:Left");

        registry.set_outcome("Root", "STAY");
        registry.clear_events();
        engine.update(&mut (), true).expect("tick 2");

        assert_eq!(engine.active_path(), "Root/STAY:Idle");
        assert_eq!(
            registry.events(),
            vec![
                "decide:Root=STAY",
                "exit:Left",
                "exit:Lower",
                "init:Idle",
                "exec:Idle"
            ]
        );
    }

    #[test]
    fn divergence_below_an_unchanged_decision_swaps_only_the_leaf() {
        let registry = ScriptedRegistry::new();
        registry.set_outcome("Root", "DIVE");
        registry.set_outcome("Lower", "LEFT");
        let mut engine = engine_with(&registry);
        engine.update(&mut (), true).expect("tick 1");

        registry.set_outcome("Lower", "RIGHT");
        registry.clear_events();
        engine.update(&mut (), true).expect("tick 2");

        assert_eq!(engine.active_path(), "Root/DIVE:Lower/RIGHT:Right");
        assert_eq!(
            registry.events(),
            vec![
                "decide:Root=DIVE",
                "decide:Lower=RIGHT",
                "exit:Left",
                "init:Right",
                "exec:Right"
            ]
        );
    }

    #[test]
    fn reevaluate_false_reuses_recorded_outcomes() {
        let registry = ScriptedRegistry::new();
        registry.set_outcome("Root", "STAY");
        let mut engine = engine_with(&registry);
        engine.update(&mut (), true).expect("tick 1");

        // The scripted outcome changes, but a non-reevaluating tick must
        // keep following the recorded path.
        registry.set_outcome("Root", "DIVE");
        registry.clear_events();
        engine.update(&mut (), false).expect("tick 2");

        assert_eq!(engine.active_path(), "Root/STAY:Idle");
        assert_eq!(registry.events(), vec!["exec:Idle"]);
    }

    #[test]
    fn sequence_advances_on_completion_and_reports_exhaustion() {
        let registry = ScriptedRegistry::new();
        registry.set_outcome("Root", "RUN");
        let mut engine = engine_with(&registry);

        assert_eq!(engine.update(&mut (), true).expect("tick 1"), TickOutcome::Running);
        assert_eq!(engine.active_path(), "Root/RUN:First, Second");

        registry.set_completing("First", true);
        registry.clear_events();
        assert_eq!(engine.update(&mut (), false).expect("tick 2"), TickOutcome::Running);
        assert_eq!(registry.events(), vec!["exec:First", "exit:First"]);

        registry.set_completing("Second", true);
        registry.clear_events();
        assert_eq!(
            engine.update(&mut (), false).expect("tick 3"),
            TickOutcome::LeafComplete
        );
        assert_eq!(registry.events(), vec!["exec:Second", "exit:Second"]);

        // Exhausted: keeps reporting completion without re-running actions.
        registry.clear_events();
        assert_eq!(
            engine.update(&mut (), false).expect("tick 4"),
            TickOutcome::LeafComplete
        );
        assert!(registry.events().is_empty());
    }

    #[test]
    fn sequence_position_survives_unchanged_reevaluation() {
        let registry = ScriptedRegistry::new();
        registry.set_outcome("Root", "RUN");
        registry.set_completing("First", true);
        let mut engine = engine_with(&registry);

        engine.update(&mut (), true).expect("tick 1");
        registry.clear_events();
        engine.update(&mut (), true).expect("tick 2");

        // Re-evaluating with an unchanged outcome must not reset the
        // sequence to its first member.
        assert_eq!(registry.events(), vec!["decide:Root=RUN", "exec:Second"]);
    }

    #[test]
    fn undeclared_outcome_is_a_typed_error_and_leaves_stack_alone() {
        let registry = ScriptedRegistry::new();
        registry.set_outcome("Root", "STAY");
        let mut engine = engine_with(&registry);
        engine.update(&mut (), true).expect("tick 1");

        registry.set_outcome("Root", "SIDEWAYS");
        registry.clear_events();
        let err = engine.update(&mut (), true).expect_err("undeclared outcome");
        let typed = err
            .downcast_ref::<UnknownOutcomeError>()
            .expect("typed error");
        assert_eq!(typed.decision, "Root");
        assert_eq!(typed.outcome, "SIDEWAYS");
        assert_eq!(typed.declared, vec!["DIVE", "RUN", "STAY"]);

        assert_eq!(engine.active_path(), "Root/STAY:Idle");
        assert!(registry.events().iter().all(|event| !event.starts_with("exit:")));
    }

    #[test]
    fn close_finalizes_leaf_first_and_is_idempotent() {
        let registry = ScriptedRegistry::new();
        registry.set_outcome("Root", "DIVE");
        registry.set_outcome("Lower", "LEFT");
        let mut engine = engine_with(&registry);
        engine.update(&mut (), true).expect("tick");

        registry.clear_events();
        engine.close(&mut ());
        assert_eq!(registry.events(), vec!["exit:Left", "exit:Lower", "exit:Root"]);
        assert_eq!(engine.depth(), 0);

        registry.clear_events();
        engine.close(&mut ());
        assert!(registry.events().is_empty());
    }

    #[test]
    fn set_start_element_reroots_and_finalizes_previous_stack() {
        let registry = ScriptedRegistry::new();
        registry.set_outcome("Root", "STAY");
        let mut engine = engine_with(&registry);
        engine.update(&mut (), true).expect("tick");

        let root = engine.tree().root_element();
        registry.clear_events();
        engine.set_start_element(root, &mut ()).expect("restart");

        assert_eq!(registry.events(), vec!["exit:Idle", "exit:Root", "init:Root"]);
        assert_eq!(engine.depth(), 1);
    }

    #[test]
    fn passive_engine_rejects_ticks_but_accepts_pushes() {
        let tree = parse_definition(LAYERED).expect("parse");
        let root = tree.root_element();
        let idle = tree.get_child(root, "STAY").expect("child");
        let mut engine: StackEngine<()> = StackEngine::passive(tree);

        let err = engine.update(&mut (), true).expect_err("passive tick");
        assert!(err.to_string().contains("passive engine"));

        engine.set_start_element(root, &mut ()).expect("root");
        engine.push(idle, Some("STAY".to_string())).expect("push");
        assert_eq!(engine.active_path(), "Root/STAY:Idle");
    }

    #[test]
    fn push_rejects_mismatched_children() {
        let tree = parse_definition(LAYERED).expect("parse");
        let root = tree.root_element();
        let right = {
            let lower = tree.get_child(root, "DIVE").expect("lower");
            tree.get_child(lower, "RIGHT").expect("right")
        };
        let mut engine: StackEngine<()> = StackEngine::passive(tree);
        engine.set_start_element(root, &mut ()).expect("root");

        let err = engine
            .push(right, Some("STAY".to_string()))
            .expect_err("mismatch");
        assert!(err.to_string().contains("not the child activated by 'STAY'"));
    }
}
