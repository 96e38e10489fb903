//! Key iteration over a frontier of pages still to visit.

use std::sync::atomic::Ordering;

use crate::alloc::{is_valid_next, AllocatorExt, BlockId};
use crate::error::{BlobError, Result};

use super::page::Page;
use super::tree::BTree;

/// Yields every key once, in no particular order
///
/// Holds no tree lock between steps. Each step checks the tree's modification
/// counter against the value seen at creation; a mismatch yields
/// [`BlobError::ConcurrentModification`] and ends the iteration.
pub struct KeysIter<'a> {
    tree: &'a BTree,
    expected_mods: u64,
    frontier: Vec<BlockId>,
    current: Option<Page>,
    index: usize,
    done: bool,
}

impl<'a> KeysIter<'a> {
    pub(super) fn new(tree: &'a BTree, root: BlockId, expected_mods: u64) -> Self {
        Self {
            tree,
            expected_mods,
            frontier: vec![root],
            current: None,
            index: 0,
            done: false,
        }
    }

    fn step(&mut self) -> Result<Option<String>> {
        if self.tree.mod_count.load(Ordering::Acquire) != self.expected_mods {
            return Err(BlobError::ConcurrentModification);
        }
        loop {
            if let Some(page) = &self.current {
                if let Some(entry) = page.entries.get(self.index) {
                    self.index += 1;
                    if is_valid_next(entry.child) {
                        self.frontier.push(entry.child);
                    }
                    return self.tree.whole_key(entry).map(Some);
                }
            }
            let Some(page_id) = self.frontier.pop() else {
                return Ok(None);
            };
            let page: Page = self.tree.alloc.load(page_id)?;
            if is_valid_next(page.last_child) {
                self.frontier.push(page.last_child);
            }
            self.current = Some(page);
            self.index = 0;
        }
    }
}

impl Iterator for KeysIter<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(key)) => Some(Ok(key)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
