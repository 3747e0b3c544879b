//! Scripted behaviors for exercising the engine without robot code.
//!
//! [`ScriptedRegistry`] hands out decisions that return a preconfigured
//! outcome label and actions that report completion on demand. Every
//! instantiation, decision, execution, and exit is appended to a shared
//! event log so tests can assert exact ordering.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use serde_json::json;

use crate::behavior::{Action, BehaviorRegistry, Decision};
use crate::core::types::ActionStatus;
use crate::tree::DebugData;

type EventLog = Rc<RefCell<Vec<String>>>;

/// Registry of scripted behaviors keyed by node name.
///
/// Clones share the same script and event log, so a test can keep one clone
/// to steer outcomes while the engine owns another.
#[derive(Clone, Default)]
pub struct ScriptedRegistry {
    log: EventLog,
    outcomes: Rc<RefCell<BTreeMap<String, String>>>,
    completing: Rc<RefCell<BTreeSet<String>>>,
}

impl ScriptedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the label `decision` returns from now on.
    pub fn set_outcome(&self, decision: &str, label: &str) {
        self.outcomes
            .borrow_mut()
            .insert(decision.to_string(), label.to_string());
    }

    /// Script whether `action` reports [`ActionStatus::Complete`].
    pub fn set_completing(&self, action: &str, completing: bool) {
        if completing {
            self.completing.borrow_mut().insert(action.to_string());
        } else {
            self.completing.borrow_mut().remove(action);
        }
    }

    /// Snapshot of the recorded events, oldest first.
    pub fn events(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.log.borrow_mut().clear();
    }

    fn record(&self, event: String) {
        self.log.borrow_mut().push(event);
    }
}

impl BehaviorRegistry<()> for ScriptedRegistry {
    fn decision(&self, name: &str) -> Result<Box<dyn Decision<()>>> {
        self.record(format!("init:{name}"));
        Ok(Box::new(ScriptedDecision {
            name: name.to_string(),
            outcomes: Rc::clone(&self.outcomes),
            log: Rc::clone(&self.log),
        }))
    }

    fn action(
        &self,
        name: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Box<dyn Action<()>>> {
        self.record(format!("init:{name}"));
        Ok(Box::new(ScriptedAction {
            name: name.to_string(),
            parameters: parameters.clone(),
            completing: Rc::clone(&self.completing),
            log: Rc::clone(&self.log),
            ticks: 0,
        }))
    }
}

struct ScriptedDecision {
    name: String,
    outcomes: Rc<RefCell<BTreeMap<String, String>>>,
    log: EventLog,
}

impl Decision<()> for ScriptedDecision {
    fn decide(&mut self, _ctx: &mut ()) -> Result<String> {
        let outcome = self
            .outcomes
            .borrow()
            .get(&self.name)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted outcome for decision '{}'", self.name))?;
        self.log
            .borrow_mut()
            .push(format!("decide:{}={outcome}", self.name));
        Ok(outcome)
    }

    fn on_exit(&mut self, _ctx: &mut ()) {
        self.log.borrow_mut().push(format!("exit:{}", self.name));
    }
}

/// Temporary directory holding definition files for loader tests.
pub struct TestDefinitions {
    dir: tempfile::TempDir,
}

impl TestDefinitions {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create definitions tempdir")?;
        Ok(Self { dir })
    }

    /// Write a definition file and return its path.
    pub fn write(&self, name: &str, text: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

struct ScriptedAction {
    name: String,
    parameters: BTreeMap<String, String>,
    completing: Rc<RefCell<BTreeSet<String>>>,
    log: EventLog,
    ticks: u32,
}

impl Action<()> for ScriptedAction {
    fn execute(&mut self, _ctx: &mut ()) -> Result<ActionStatus> {
        self.ticks += 1;
        self.log.borrow_mut().push(format!("exec:{}", self.name));
        if self.completing.borrow().contains(&self.name) {
            Ok(ActionStatus::Complete)
        } else {
            Ok(ActionStatus::Running)
        }
    }

    fn debug_data(&self) -> DebugData {
        json!({ "ticks": self.ticks, "parameters": self.parameters })
    }

    fn on_exit(&mut self, _ctx: &mut ()) {
        self.log.borrow_mut().push(format!("exit:{}", self.name));
    }
}
