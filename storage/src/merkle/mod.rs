//! A fixed-height binary Merkle tree that only grows to the right.
//!
//! # Terminology
//!
//! The tree has `2^height` leaf _slots_ numbered from 0. Slots are filled in order, so the tree is
//! always a prefix of written slots followed by unwritten ones. The number of written slots is the
//! _next available leaf index_: the slot the next appended leaf will occupy.
//!
//! The "level" of a node is 0 for a leaf, 1 for the parent of 2 leaves, and `height` for the root.
//! Within a level, nodes are numbered from 0 left to right, so the parent of node `i` is node
//! `i >> 1` one level up and its sibling is node `i ^ 1`.
//!
//! Unwritten slots hold [Field::ZERO]. A subtree made entirely of unwritten slots therefore has a
//! digest that depends only on its level, and these _zero digests_ are computed once per tree.
//!
//! ```text
//!    Level
//!      2              r
//!                   /   \
//!      1          n0     z1
//!                /  \
//!      0       l0    l1  0  0
//!
//!   Slot       0     1   2  3
//! ```
//!
//! In the example above two leaves have been written to a tree of height 2. `z1` is the zero digest
//! of level 1 and the next available leaf index is 2.
//!
//! # Staging
//!
//! Writes are _staged_ until [AppendOnlyTree::commit] is called. Every read takes an
//! `include_uncommitted` flag selecting between the committed view and the committed view with the
//! staged writes applied on top. [AppendOnlyTree::rollback] drops whatever is staged.

use crate::merkle::hasher::Hasher;
use rollup_cryptography::{Field, Hasher as CHasher};
use thiserror::Error;

pub mod append_only;
pub mod hasher;
pub mod proof;
pub mod snapshot;

pub use append_only::{AppendOnlyTree, Config};
pub use hasher::Standard;
pub use proof::{MembershipWitness, SiblingPath};
pub use snapshot::Snapshot;

/// The largest supported tree height.
///
/// Capped so every slot index and every next available leaf index fits in a `u32`.
pub const MAX_HEIGHT: u8 = 31;

/// Errors that can occur when interacting with an append-only tree.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid height: {0}")]
    InvalidHeight(u8),
    #[error("capacity exceeded: {requested} leaves requested, capacity is {capacity}")]
    CapacityExceeded { requested: u64, capacity: u64 },
    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(u64),
    #[error("invalid subtree height: {0}")]
    InvalidSubtreeHeight(u8),
}

/// Returns the digests of empty subtrees, indexed by level. Level 0 is the empty leaf.
pub fn zero_digests<H: CHasher>(hasher: &mut impl Hasher<H>, height: u8) -> Vec<Field> {
    let mut zeros = Vec::with_capacity(height as usize + 1);
    let mut current = Field::ZERO;
    zeros.push(current);
    for _ in 0..height {
        current = hasher.node_digest(&current, &current);
        zeros.push(current);
    }
    zeros
}
