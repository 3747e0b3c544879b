//! Shared viewer state around the mirroring consumer.

use decider::mirror::{MirrorEngine, MirrorState};
use decider::tree::Tree;

/// Viewer-side state: the replica engine plus counters for the status line.
pub struct ViewState {
    mirror: MirrorEngine,
    accepted: u64,
    rejected: u64,
}

impl ViewState {
    pub fn new(tree: Tree) -> Self {
        Self {
            mirror: MirrorEngine::new(tree),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Feed one snapshot payload. Returns whether the view changed.
    pub fn apply(&mut self, payload: &str) -> bool {
        let changed = self.mirror.apply_payload(payload);
        if changed {
            match self.mirror.state() {
                MirrorState::Invalid(_) => self.rejected += 1,
                _ => self.accepted += 1,
            }
        }
        changed
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn render(&self) -> String {
        crate::render::render(&self.mirror)
    }
}
