//! The set of threads currently holding a shared primitive.

use std::collections::BTreeMap;

/// Tracks which threads hold an [`RwLock`](super::RwLock).
///
/// Thread ids live in a dense arena so that iteration and counting are cheap;
/// an index keyed by tid makes membership tests and removal logarithmic.
/// Removal swaps the last slot into the hole, so iteration order is not
/// insertion order.
#[derive(Debug, Default, Clone)]
pub struct HolderList {
    slots: Vec<u64>,
    index: BTreeMap<u64, usize>,
}

impl HolderList {
    /// Creates an empty list.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Records `tid` as a holder.
    ///
    /// # Panics
    /// If `tid` is already recorded.
    pub fn insert(&mut self, tid: u64) {
        assert!(
            !self.index.contains_key(&tid),
            "Thread {tid} is already a holder."
        );
        self.index.insert(tid, self.slots.len());
        self.slots.push(tid);
    }

    /// Forgets `tid`. Returns whether it was recorded.
    pub fn remove(&mut self, tid: u64) -> bool {
        let Some(slot) = self.index.remove(&tid) else {
            return false;
        };
        self.slots.swap_remove(slot);
        if let Some(&moved) = self.slots.get(slot) {
            self.index.insert(moved, slot);
        }
        true
    }

    /// Whether `tid` is recorded.
    pub fn contains(&self, tid: u64) -> bool {
        self.index.contains_key(&tid)
    }

    /// The number of holders.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nobody holds.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over the holders, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.iter().copied()
    }
}
