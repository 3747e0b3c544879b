//! Shared deterministic types for the engine core.

/// Completion signal a bound action reports on each tick it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// Still working; tick it again next cycle.
    Running,
    /// Finished; a sequence may advance past it.
    Complete,
}

/// What the active leaf did during one engine tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The active leaf ran and is still in progress.
    Running,
    /// The active leaf finished this tick. For a sequence this means the
    /// final member action completed; the parent decision is free to select
    /// a different branch on the next re-evaluating tick.
    LeafComplete,
}
