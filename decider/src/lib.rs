//! Hierarchical behavior arbitration for robotic control loops.
//!
//! A textual definition describes a tree of decisions, actions, and action
//! sequences; the engine re-evaluates that tree every control tick to pick
//! the single leaf behavior that should currently drive the robot, keeping
//! the active root-to-leaf path as an explicit stack. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, validation, path
//!   rendering). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (definition files, config, the
//!   mirroring transport seam). Isolated to enable scripting in tests.
//!
//! [`engine`] runs the stack against integrator-supplied [`behavior`]
//! bindings; [`mirror`] serializes the active stack for a remote,
//! decision-free replica to reconstruct.

pub mod behavior;
pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod mirror;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tree;
