//! Capability seam between the engine and integrator-supplied behaviors.
//!
//! The engine never contains robot logic. The integrator implements
//! [`BehaviorRegistry`] to hand out a [`Decision`] or [`Action`] per node
//! name; the engine instantiates them lazily when an element is pushed onto
//! the stack and drops them when it is popped. Tests use scripted
//! implementations that return predetermined outcomes.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::core::types::ActionStatus;
use crate::tree::DebugData;

/// Logic bound to a decision element.
///
/// `decide` runs on every re-evaluating tick while the element is on the
/// stack and must return one of the result labels declared for the element.
/// It is expected to be fast; long-running work belongs in action state
/// polled across ticks.
pub trait Decision<C> {
    fn decide(&mut self, ctx: &mut C) -> Result<String>;

    /// Payload mirrored to remote observers after each invocation.
    fn debug_data(&self) -> DebugData {
        DebugData::Null
    }

    /// Invoked exactly once when the element is popped off the stack.
    fn on_exit(&mut self, _ctx: &mut C) {}
}

/// Logic bound to an action element, invoked once per tick while it is the
/// active leaf (or the current member of an active sequence).
pub trait Action<C> {
    fn execute(&mut self, ctx: &mut C) -> Result<ActionStatus>;

    /// Payload mirrored to remote observers after each invocation.
    fn debug_data(&self) -> DebugData {
        DebugData::Null
    }

    /// Invoked exactly once when the action leaves the stack: for a plain
    /// action when its element is popped, for a sequence member when the
    /// sequence advances past it or is popped mid-step.
    fn on_exit(&mut self, _ctx: &mut C) {}
}

/// Factory the integrator supplies at engine construction, keyed by node
/// name from the definition.
pub trait BehaviorRegistry<C> {
    fn decision(&self, name: &str) -> Result<Box<dyn Decision<C>>>;

    fn action(
        &self,
        name: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Box<dyn Action<C>>>;
}
