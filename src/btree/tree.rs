//! B-tree over fixed-size pages
//!
//! With `max` entry slots per page, `t = (max + 1) / 2`. Pages rest with
//! `t - 1 ..= 2t - 2` entries (the root may hold fewer); a page that reaches
//! `2t - 1` after an insert is split around entry `t - 1` straight away.
//!
//! ## Concurrency
//! One reader/writer lock guards the root pointer and entry count. Lookups
//! take it shared, mutations exclusive. Iterators only hold it per step.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::alloc::{is_valid_next, Allocator, AllocatorExt, BlockId, NULL_DATA};
use crate::codec::{from_utf16, to_utf16};
use crate::error::{BlobError, Result};

use super::entry::{TreeEntry, TreeKey};
use super::iter::KeysIter;
use super::names::NameHelper;
use super::page::{Page, TreeInfo};
use super::max_entries_for;

const INFO_BLOCK: BlockId = 0;

/// Produces the data pointer stored for a key
pub trait TreeData {
    /// Called when the key is new.
    fn create(&mut self) -> Result<i64>;

    /// Called with the current pointer when the key exists; returns the new one.
    fn update(&mut self, old: i64) -> Result<i64>;
}

impl TreeData for i64 {
    fn create(&mut self) -> Result<i64> {
        Ok(*self)
    }

    fn update(&mut self, _old: i64) -> Result<i64> {
        Ok(*self)
    }
}

/// Shape of the tree as seen by [`BTree::verify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub pages: usize,
    pub depth: usize,
    pub entries: u64,
}

pub(super) struct TreeState {
    pub(super) root: BlockId,
    pub(super) total: u64,
}

/// Result of inserting below a page
struct Inserted {
    new_key: bool,
    /// Median and new right sibling when the page below split
    split: Option<(TreeEntry, BlockId)>,
}

pub struct BTree {
    pub(super) alloc: Arc<dyn Allocator>,
    pub(super) names: Arc<dyn NameHelper>,
    pub(super) state: RwLock<TreeState>,
    pub(super) mod_count: AtomicU64,
    t: usize,
    max: usize,
}

impl BTree {
    /// Open the tree stored in `alloc`, initializing an empty allocator.
    pub fn new(alloc: Arc<dyn Allocator>, names: Arc<dyn NameHelper>) -> Result<Self> {
        let max = max_entries_for(alloc.block_size())?;
        let t = (max + 1) / 2;

        let state = if alloc.block_count() == 0 {
            let info_id = alloc.allocate()?;
            if info_id != INFO_BLOCK {
                return Err(BlobError::Serialization(format!(
                    "tree info landed in block {} instead of {}",
                    info_id, INFO_BLOCK
                )));
            }
            let root = alloc.allocate()?;
            alloc.store(root, &Page::empty())?;
            alloc.store(INFO_BLOCK, &TreeInfo { total_count: 0, root })?;
            tracing::debug!("Initialized empty tree with root {} (t = {})", root, t);
            TreeState { root, total: 0 }
        } else {
            let info: TreeInfo = alloc.load(INFO_BLOCK)?;
            tracing::debug!("Loaded tree with root {} and {} keys", info.root, info.total_count);
            TreeState {
                root: info.root,
                total: info.total_count,
            }
        };

        Ok(Self {
            alloc,
            names,
            state: RwLock::new(state),
            mod_count: AtomicU64::new(0),
            t,
            max,
        })
    }

    /// Minimum degree
    pub fn degree(&self) -> usize {
        self.t
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Data pointer for `key`, or [`NULL_DATA`] when absent.
    pub fn get(&self, key: &str) -> Result<i64> {
        let key = TreeKey::new(key, self.names.as_ref());
        let state = self.state.read();
        Ok(self
            .find(state.root, &key)?
            .map_or(NULL_DATA, |entry| entry.data))
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        let key = TreeKey::new(key, self.names.as_ref());
        let state = self.state.read();
        Ok(self.find(state.root, &key)?.is_some())
    }

    /// Number of keys
    pub fn size(&self) -> u64 {
        self.state.read().total
    }

    /// Iterate over all keys in no particular order.
    pub fn keys(&self) -> KeysIter<'_> {
        let state = self.state.read();
        KeysIter::new(self, state.root, self.mod_count.load(AtomicOrdering::Acquire))
    }

    fn find(&self, mut page_id: BlockId, key: &TreeKey) -> Result<Option<TreeEntry>> {
        loop {
            let mut page: Page = self.alloc.load(page_id)?;
            match self.search(&page, key)? {
                Ok(pos) => return Ok(Some(page.entries.swap_remove(pos))),
                Err(pos) => {
                    let child = page.child(pos);
                    if !is_valid_next(child) {
                        return Ok(None);
                    }
                    page_id = child;
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Insert
    // -------------------------------------------------------------------------

    /// Insert `key` or update its pointer through `data`.
    pub fn put(&self, key: &str, data: &mut dyn TreeData) -> Result<()> {
        let key = TreeKey::new(key, self.names.as_ref());
        let mut state = self.state.write();
        let inserted = self.insert_into(state.root, &key, data)?;

        if let Some((mut median, right)) = inserted.split {
            median.child = state.root;
            let root = self.alloc.allocate()?;
            self.alloc.store(
                root,
                &Page {
                    entries: vec![median],
                    last_child: right,
                },
            )?;
            tracing::trace!("Split root page {} into new root {}", state.root, root);
            state.root = root;
        }
        if inserted.new_key {
            state.total += 1;
            self.mod_count.fetch_add(1, AtomicOrdering::AcqRel);
        }
        Ok(())
    }

    fn insert_into(&self, page_id: BlockId, key: &TreeKey, data: &mut dyn TreeData) -> Result<Inserted> {
        let mut page: Page = self.alloc.load(page_id)?;
        let pos = match self.search(&page, key)? {
            Ok(pos) => {
                let entry = &mut page.entries[pos];
                entry.data = data.update(entry.data)?;
                self.alloc.store(page_id, &page)?;
                return Ok(Inserted {
                    new_key: false,
                    split: None,
                });
            }
            Err(pos) => pos,
        };

        let child = page.child(pos);
        let new_key = if is_valid_next(child) {
            let Inserted { new_key, split } = self.insert_into(child, key, data)?;
            let Some((mut median, right)) = split else {
                return Ok(Inserted {
                    new_key,
                    split: None,
                });
            };
            median.child = child;
            page.entries.insert(pos, median);
            page.set_child(pos + 1, right);
            new_key
        } else {
            page.entries.insert(pos, TreeEntry::new(key, data.create()?));
            true
        };

        let split = self.split_if_full(page_id, &mut page)?;
        self.alloc.store(page_id, &page)?;
        Ok(Inserted { new_key, split })
    }

    /// Split a page holding `2t - 1` entries, returning the median and the new right page.
    fn split_if_full(&self, page_id: BlockId, page: &mut Page) -> Result<Option<(TreeEntry, BlockId)>> {
        if page.len() < self.max {
            return Ok(None);
        }
        let right_entries = page.entries.split_off(self.t);
        let median = page
            .entries
            .pop()
            .ok_or_else(|| BlobError::Serialization("split of an empty page".to_string()))?;
        let right = Page {
            entries: right_entries,
            last_child: page.last_child,
        };
        page.last_child = median.child;

        let right_id = self.alloc.allocate()?;
        self.alloc.store(right_id, &right)?;
        tracing::trace!("Split page {} into {}", page_id, right_id);
        Ok(Some((median, right_id)))
    }

    // -------------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------------

    /// Remove `key`, returning its data pointer or [`NULL_DATA`] when absent.
    pub fn remove(&self, key: &str) -> Result<i64> {
        let key = TreeKey::new(key, self.names.as_ref());
        let mut state = self.state.write();
        let removed = self.delete_from(state.root, &key)?;

        let root: Page = self.alloc.load(state.root)?;
        if root.is_empty() && is_valid_next(root.last_child) {
            self.alloc.free(state.root)?;
            tracing::trace!("Collapsed root page {} into {}", state.root, root.last_child);
            state.root = root.last_child;
        }

        match removed {
            Some(entry) => {
                state.total = state.total.saturating_sub(1);
                self.mod_count.fetch_add(1, AtomicOrdering::AcqRel);
                Ok(entry.data)
            }
            None => Ok(NULL_DATA),
        }
    }

    fn delete_from(&self, page_id: BlockId, key: &TreeKey) -> Result<Option<TreeEntry>> {
        let mut page: Page = self.alloc.load(page_id)?;
        match self.search(&page, key)? {
            Ok(pos) if page.is_leaf() => {
                let removed = page.entries.remove(pos);
                self.alloc.store(page_id, &page)?;
                Ok(Some(removed))
            }
            Ok(pos) => {
                let left = page.child(pos);
                let right = page.child(pos + 1);
                let left_len = self.alloc.load::<Page>(left)?.len();
                let right_len = self.alloc.load::<Page>(right)?.len();
                let mut replacement = if left_len > right_len {
                    self.remove_last(left)?
                } else {
                    self.remove_first(right)?
                };
                replacement.child = left;
                let removed = std::mem::replace(&mut page.entries[pos], replacement);
                self.rebalance(&mut page, pos)?;
                self.alloc.store(page_id, &page)?;
                Ok(Some(removed))
            }
            Err(pos) => {
                let child = page.child(pos);
                if !is_valid_next(child) {
                    return Ok(None);
                }
                let removed = self.delete_from(child, key)?;
                if removed.is_some() {
                    self.rebalance(&mut page, pos)?;
                    self.alloc.store(page_id, &page)?;
                }
                Ok(removed)
            }
        }
    }

    /// Detach the greatest entry of the subtree at `page_id`.
    fn remove_last(&self, page_id: BlockId) -> Result<TreeEntry> {
        let mut page: Page = self.alloc.load(page_id)?;
        let entry = if page.is_leaf() {
            page.entries.pop()
        } else {
            let entry = self.remove_last(page.last_child)?;
            let pos = page.len();
            self.rebalance(&mut page, pos)?;
            Some(entry)
        };
        self.alloc.store(page_id, &page)?;
        entry.ok_or_else(|| BlobError::Serialization(format!("page {} is empty", page_id)))
    }

    /// Detach the smallest entry of the subtree at `page_id`.
    fn remove_first(&self, page_id: BlockId) -> Result<TreeEntry> {
        let mut page: Page = self.alloc.load(page_id)?;
        let entry = if page.is_leaf() {
            if page.is_empty() {
                None
            } else {
                Some(page.entries.remove(0))
            }
        } else {
            let entry = self.remove_first(page.child(0))?;
            self.rebalance(&mut page, 0)?;
            Some(entry)
        };
        self.alloc.store(page_id, &page)?;
        entry.ok_or_else(|| BlobError::Serialization(format!("page {} is empty", page_id)))
    }

    /// Restore the minimum around child `pos` of `page` by merging or rotating
    /// with its sibling. The pair is `(pos, pos + 1)`, or `(pos - 1, pos)` for
    /// the last child.
    fn rebalance(&self, page: &mut Page, pos: usize) -> Result<()> {
        if page.is_empty() {
            return Ok(());
        }
        let sep = pos.min(page.len() - 1);
        let left_id = page.child(sep);
        let right_id = page.child(sep + 1);
        if !is_valid_next(left_id) || !is_valid_next(right_id) {
            return Ok(());
        }
        let min = self.t - 1;
        let mut left: Page = self.alloc.load(left_id)?;
        let mut right: Page = self.alloc.load(right_id)?;
        if left.len() >= min && right.len() >= min {
            return Ok(());
        }

        if left.len() + right.len() + 1 <= 2 * min {
            let mut separator = page.entries.remove(sep);
            separator.child = left.last_child;
            left.entries.push(separator);
            left.entries.append(&mut right.entries);
            left.last_child = right.last_child;
            page.set_child(sep, left_id);
            self.alloc.store(left_id, &left)?;
            self.alloc.free(right_id)?;
            tracing::trace!("Merged page {} into {}", right_id, left_id);
        } else if left.len() < min {
            let mut lowered = page.entries[sep].clone();
            lowered.child = left.last_child;
            left.entries.push(lowered);
            let mut raised = right.entries.remove(0);
            left.last_child = raised.child;
            raised.child = left_id;
            page.entries[sep] = raised;
            self.alloc.store(left_id, &left)?;
            self.alloc.store(right_id, &right)?;
        } else {
            let mut lowered = page.entries[sep].clone();
            lowered.child = left.last_child;
            right.entries.insert(0, lowered);
            let mut raised = left
                .entries
                .pop()
                .ok_or_else(|| BlobError::Serialization(format!("page {} is empty", left_id)))?;
            left.last_child = raised.child;
            raised.child = left_id;
            page.entries[sep] = raised;
            self.alloc.store(left_id, &left)?;
            self.alloc.store(right_id, &right)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Comparison
    // -------------------------------------------------------------------------

    /// Binary search: `Ok(pos)` on a match, `Err(insertion point)` otherwise.
    pub(super) fn search(&self, page: &Page, key: &TreeKey) -> Result<std::result::Result<usize, usize>> {
        let (mut lo, mut hi) = (0, page.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.compare(key, &page.entries[mid])? {
                Ordering::Less => hi = mid,
                Ordering::Greater => lo = mid + 1,
                Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    /// Order by hash, then key part, then (only on a tie) the full keys.
    fn compare(&self, key: &TreeKey, entry: &TreeEntry) -> Result<Ordering> {
        let ord = key
            .hash
            .cmp(&entry.hash)
            .then_with(|| key.part.as_slice().cmp(entry.key_part.as_slice()));
        if ord != Ordering::Equal {
            return Ok(ord);
        }
        if entry.holds_whole_key() {
            return Ok(key.units.as_slice().cmp(entry.key_part.as_slice()));
        }
        let full = to_utf16(&self.names.full_name(entry.data)?);
        Ok(key.units.as_slice().cmp(full.as_slice()))
    }

    /// Full key of `entry`, resolved through the name helper when truncated.
    pub(super) fn whole_key(&self, entry: &TreeEntry) -> Result<String> {
        if entry.holds_whole_key() {
            from_utf16(&entry.key_part)
        } else {
            self.names.full_name(entry.data)
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    fn write_info(&self, state: &TreeState) -> Result<()> {
        self.alloc.store(
            INFO_BLOCK,
            &TreeInfo {
                total_count: state.total,
                root: state.root,
            },
        )
    }

    /// Persist the tree info and flush the allocator.
    pub fn flush(&self) -> Result<()> {
        let state = self.state.write();
        self.write_info(&state)?;
        self.alloc.flush()
    }

    /// Persist the tree info and close the allocator.
    pub fn close(&self) -> Result<()> {
        let state = self.state.write();
        self.write_info(&state)?;
        self.alloc.close()
    }

    // -------------------------------------------------------------------------
    // Verification
    // -------------------------------------------------------------------------

    /// Walk the whole tree checking page fill, key order, leaf depth and count.
    pub fn verify(&self) -> Result<TreeStats> {
        let state = self.state.read();
        let mut stats = TreeStats {
            pages: 0,
            depth: 0,
            entries: 0,
        };
        let mut leaf_depth = None;
        self.verify_page(state.root, true, None, None, 1, &mut leaf_depth, &mut stats)?;
        stats.depth = leaf_depth.unwrap_or(1);
        if stats.entries != state.total {
            return Err(BlobError::Serialization(format!(
                "tree holds {} entries but records {}",
                stats.entries, state.total
            )));
        }
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn verify_page(
        &self,
        page_id: BlockId,
        is_root: bool,
        lower: Option<&TreeKey>,
        upper: Option<&TreeKey>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        stats: &mut TreeStats,
    ) -> Result<()> {
        let page: Page = self.alloc.load(page_id)?;
        stats.pages += 1;
        stats.entries += page.len() as u64;

        let broken = |what: String| BlobError::Serialization(format!("page {}: {}", page_id, what));
        if page.len() >= self.max {
            return Err(broken(format!("{} entries, limit {}", page.len(), self.max - 1)));
        }
        if !is_root && page.len() < self.t - 1 {
            return Err(broken(format!("{} entries, minimum {}", page.len(), self.t - 1)));
        }

        let keys = page
            .entries
            .iter()
            .map(|entry| Ok(TreeKey::new(&self.whole_key(entry)?, self.names.as_ref())))
            .collect::<Result<Vec<_>>>()?;
        for (i, entry) in page.entries.iter().enumerate() {
            if let Some(lower) = lower {
                if self.compare(lower, entry)? != Ordering::Less {
                    return Err(broken(format!("entry {} is not above its lower bound", i)));
                }
            }
            if let Some(upper) = upper {
                if self.compare(upper, entry)? != Ordering::Greater {
                    return Err(broken(format!("entry {} is not below its upper bound", i)));
                }
            }
            if i > 0 && self.compare(&keys[i - 1], entry)? != Ordering::Less {
                return Err(broken(format!("entries {} and {} are out of order", i - 1, i)));
            }
        }

        if page.is_leaf() {
            if page.entries.iter().any(|e| is_valid_next(e.child)) || is_valid_next(page.last_child) {
                return Err(broken("leaf with child links".to_string()));
            }
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(expected) if expected != depth => {
                    return Err(broken(format!("leaf at depth {}, expected {}", depth, expected)));
                }
                Some(_) => {}
            }
            return Ok(());
        }

        for pos in 0..=page.len() {
            let child = page.child(pos);
            if !is_valid_next(child) {
                return Err(broken(format!("missing child {}", pos)));
            }
            let child_lower = if pos == 0 { lower } else { Some(&keys[pos - 1]) };
            let child_upper = if pos == page.len() { upper } else { Some(&keys[pos]) };
            self.verify_page(child, false, child_lower, child_upper, depth + 1, leaf_depth, stats)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for BTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("BTree")
            .field("root", &state.root)
            .field("total", &state.total)
            .field("t", &self.t)
            .finish()
    }
}
