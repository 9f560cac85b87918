//! Insertion journal
//!
//! Chrome does not promise that the `childNodeInserted` for a replacement
//! iframe arrives after the `childNodeRemoved` for the old one. Insertions
//! nobody is waiting for are parked here until a removal claims them.

use smallvec::SmallVec;

use crate::event::{ChildIframeInserted, NodeId};

/// Matches for one parent. Almost always zero or one.
pub type Matches = SmallVec<[ChildIframeInserted; 1]>;

/// Append-only buffer of unclaimed iframe insertions
#[derive(Debug, Default)]
pub struct EventJournal {
    entries: Vec<ChildIframeInserted>,
}

impl EventJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an insertion
    pub fn record(&mut self, event: ChildIframeInserted) {
        tracing::trace!(
            "Journaled iframe {} under parent {}",
            event.node,
            event.parent
        );
        self.entries.push(event);
    }

    /// Number of parked insertions under `parent`
    pub fn count_matching(&self, parent: NodeId) -> usize {
        self.entries.iter().filter(|e| e.parent == parent).count()
    }

    /// Remove and return every insertion under `parent`, oldest first
    pub fn take_matching(&mut self, parent: NodeId) -> Matches {
        let mut taken = Matches::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if entry.parent == parent {
                taken.push(entry);
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        taken
    }

    /// Forget insertions of `node`. A removed node never replaces anything.
    pub fn discard_node(&mut self, node: NodeId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.node != node);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything (the node ids belong to a dead document)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
