//! The writes accumulated while resolving a single insertion call.

use crate::indexed::{IndexedLeaf, LeafPreimage};
use rollup_cryptography::Field;
use std::collections::BTreeMap;

/// Preimages written during a call, before any of them reach the tree.
///
/// New leaves occupy consecutive slots from `start`. Earlier slots can only be rewritten.
pub(crate) struct Pending<L: IndexedLeaf> {
    start: u32,
    rewrites: BTreeMap<u32, LeafPreimage<L>>,
    appended: Vec<LeafPreimage<L>>,

    // Keys inserted during the call, mapped to their provisional slots.
    keys: BTreeMap<Field, u32>,
}

impl<L: IndexedLeaf> Pending<L> {
    pub fn new(start: u32) -> Self {
        Self {
            start,
            rewrites: BTreeMap::new(),
            appended: Vec::new(),
            keys: BTreeMap::new(),
        }
    }

    /// The slot the next appended preimage will occupy.
    pub fn next_slot(&self) -> u32 {
        self.start + self.appended.len() as u32
    }

    /// Returns true if `index` was appended during this call.
    pub fn is_new(&self, index: u32) -> bool {
        index >= self.start
    }

    pub fn get(&self, index: u32) -> Option<&LeafPreimage<L>> {
        if self.is_new(index) {
            return self.appended.get((index - self.start) as usize);
        }
        self.rewrites.get(&index)
    }

    /// Overwrite the preimage at `index`, which is either an existing slot or one appended earlier
    /// in the call.
    pub fn set(&mut self, index: u32, preimage: LeafPreimage<L>) {
        if self.is_new(index) {
            self.appended[(index - self.start) as usize] = preimage;
            return;
        }
        self.rewrites.insert(index, preimage);
    }

    /// Append `preimage`, registering its key for later lookups unless it is empty.
    pub fn push(&mut self, preimage: LeafPreimage<L>) -> u32 {
        let slot = self.next_slot();
        if !preimage.is_empty() {
            self.keys.insert(preimage.key(), slot);
        }
        self.appended.push(preimage);
        slot
    }

    /// Returns the greatest key inserted during the call that is below `key`, with its slot.
    pub fn previous_key(&self, key: &Field) -> Option<(Field, u32)> {
        self.keys
            .range(..key)
            .next_back()
            .map(|(key, slot)| (*key, *slot))
    }

    pub fn into_parts(self) -> (u32, BTreeMap<u32, LeafPreimage<L>>, Vec<LeafPreimage<L>>) {
        (self.start, self.rewrites, self.appended)
    }
}
