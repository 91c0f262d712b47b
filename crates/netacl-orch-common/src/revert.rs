//! Ordered list of typed undo descriptors.
//!
//! Every step that creates something records the inverse action. On failure
//! the caller drains the list in reverse and executes each action; on success
//! the list is handed out so a later failure in the caller can still unwind
//! it.
//!
//! Keeping the actions as data rather than closures lets tests assert
//! exactly what a rollback would delete.

/// Accumulated undo actions, executed newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revert<A> {
    actions: Vec<A>,
}

impl<A> Revert<A> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Records the inverse of a step that just succeeded.
    pub fn add(&mut self, action: A) {
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Recorded actions in the order they were added.
    pub fn actions(&self) -> &[A] {
        &self.actions
    }

    /// Consumes the list, returning actions in execution (reverse) order.
    pub fn into_unwind_order(self) -> Vec<A> {
        let mut actions = self.actions;
        actions.reverse();
        actions
    }
}

impl<A> Default for Revert<A> {
    fn default() -> Self {
        Self::new()
    }
}
