//! Local canvas state: per-page sequences of live operations.
//!
//! This is the authoritative rendering source. Insertion order is
//! rendering order; a `Clear` empties its page and is never stored.
//! There is no deduplication: applying the same stroke twice yields two
//! strokes.

use std::collections::BTreeMap;

use crate::op::Operation;

/// Page annotation state for a whole document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasState {
    pages: BTreeMap<u32, Vec<Operation>>,
}

impl CanvasState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one operation to its page.
    pub fn apply(&mut self, op: Operation) {
        let page = op.page();
        match op {
            Operation::Clear(_) => {
                let dropped = self.pages.insert(page, Vec::new()).map_or(0, |v| v.len());
                log::trace!("Cleared page {page} ({dropped} ops dropped)");
            }
            live => self.pages.entry(page).or_default().push(live),
        }
    }

    /// Apply a batch in order.
    pub fn apply_all(&mut self, ops: impl IntoIterator<Item = Operation>) {
        for op in ops {
            self.apply(op);
        }
    }

    /// Live operations for `page`, in rendering order. Empty if unseen.
    pub fn page(&self, page: u32) -> &[Operation] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Create the empty sequence for `page` if it does not exist yet.
    pub fn ensure_page(&mut self, page: u32) -> &[Operation] {
        self.pages.entry(page).or_default()
    }

    /// Pages that have a (possibly empty) sequence.
    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    /// Total live operations across all pages.
    pub fn operation_count(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }

    /// Forget everything (new session).
    pub fn reset(&mut self) {
        self.pages.clear();
    }
}
