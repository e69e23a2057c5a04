//! An append-only tree whose leaves also form a sorted linked list.
//!
//! # Overview
//!
//! Each leaf of an [IndexedTree] stores a key together with the key and slot of its successor in
//! key order. Leaves are placed in slots in the order they are inserted, so list order and slot
//! order are unrelated:
//!
//! ```text
//!   Slot        0          1          2
//!   Leaf    (0, 2, 2)  (5, 0, 0)  (2, 5, 1)
//!
//!   (key, next key, next slot) after inserting 5 and then 2
//! ```
//!
//! Slot 0 always holds the sentinel, whose key is zero. The leaf with the greatest key points back
//! to `(0, 0)`. Following `next slot` from the sentinel therefore visits every key in increasing
//! order.
//!
//! The _low leaf_ of a key `k` is the leaf with the greatest key not above `k`. If its key equals
//! `k` then `k` is present. Otherwise `low.key < k < low.next_key` (or `low.next_key` is zero), and
//! a membership witness for the low leaf proves that `k` is absent.
//!
//! # Batch insertion
//!
//! [IndexedTree::batch_insert] inserts `2^h` keys at once and returns, for every new key, the
//! original preimage and sibling path of its low leaf against the root before the call. A circuit
//! can use these to check non-membership, rewrite the low leaves, and then place the new leaves
//! as a single subtree using the returned subtree sibling path.
//!
//! The new leaves are appended at the next available slot, which must be a multiple of `2^h`.
//! [Config::prefilled] can be used to reserve slots so that batches start aligned.
//!
//! Empty leaves are padding: they occupy a slot and never enter the list. Any other leaf with a
//! zero key is rejected.

use crate::merkle::{self, Snapshot};
use rollup_cryptography::Field;
use thiserror::Error;

mod leaf;
pub use leaf::{IndexedLeaf, LeafPreimage, NullifierLeaf, PublicDataLeaf};
mod pending;
mod tree;
pub use tree::{Config, IndexedTree, Metrics};
mod witness;
pub use witness::{BatchInsertionResult, LowLeafWitnessData};

/// Errors that can occur when interacting with an indexed tree.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("merkle error: {0}")]
    Merkle(#[from] merkle::Error),
    #[error("invalid batch shape: {leaves} leaves for subtree height {subtree_height}")]
    InvalidBatchShape { leaves: usize, subtree_height: u8 },
    #[error("next slot {start} is not aligned to a subtree of height {subtree_height}")]
    MisalignedBatch { start: u32, subtree_height: u8 },
    #[error("leaf at batch position {0} has a zero key but is not empty")]
    ZeroKey(usize),
    #[error("duplicate key {key} at batch positions {first} and {second}")]
    DuplicateKey {
        key: Field,
        first: usize,
        second: usize,
    },
    #[error("tree is empty")]
    EmptyTree,
    #[error("staged changes must be included")]
    UncommittedChanges,
    #[error("missing leaf: {0}")]
    MissingLeaf(u32),
    #[error("snapshot mismatch: expected {expected:?}, found {found:?}")]
    SnapshotMismatch { expected: Snapshot, found: Snapshot },
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}
