// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recursive link queue.
//!
//! Nested vending-bot links found while a parent link runs are parked here
//! and drained only after the parent reaches a terminal state. The visited
//! set spans the whole expansion, which cuts cycles between bots that link
//! to each other.

use std::collections::{HashSet, VecDeque};

use courier_core::SourceLink;

#[derive(Debug, Default)]
pub struct LinkQueue {
    pending: VecDeque<SourceLink>,
    visited: HashSet<String>,
}

impl LinkQueue {
    /// A queue for the expansion rooted at `root`; the root counts as visited.
    pub fn new(root: &SourceLink) -> Self {
        let mut visited = HashSet::new();
        visited.insert(root.raw().to_string());
        Self {
            pending: VecDeque::new(),
            visited,
        }
    }

    /// Enqueue `link` unless this expansion has already seen it.
    pub fn push(&mut self, link: SourceLink) -> bool {
        if !self.visited.insert(link.raw().to_string()) {
            return false;
        }
        self.pending.push_back(link);
        true
    }

    pub fn pop(&mut self) -> Option<SourceLink> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(param: &str) -> SourceLink {
        SourceLink::new(format!("https://t.me/a_bot?start={param}"), "a_bot")
    }

    #[test]
    fn fifo_order() {
        let mut q = LinkQueue::new(&link("root"));
        assert!(q.push(link("1")));
        assert!(q.push(link("2")));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(link("1")));
        assert_eq!(q.pop(), Some(link("2")));
        assert!(q.is_empty());
    }

    #[test]
    fn root_and_repeats_are_rejected() {
        let mut q = LinkQueue::new(&link("root"));
        assert!(!q.push(link("root")));
        assert!(q.push(link("1")));
        q.pop();
        // Still visited after being popped.
        assert!(!q.push(link("1")));
        assert!(q.is_empty());
    }
}
