//! Arrange nullifier tree witnesses into base rollup inputs.
//!
//! A base rollup circuit inserts a block's new nullifiers into the nullifier tree. It receives the
//! nullifiers sorted greatest first, the position each held in the block, one low leaf preimage and
//! membership witness per nullifier, and the sibling path of the subtree they are appended as. All
//! vectors line up positionally with the [BatchInsertionResult] they were built from, so the low
//! leaf vectors follow input order while the nullifiers themselves are sorted.
//!
//! # Example
//!
//! ```
//! use rollup_cryptography::{Field, Hasher, Sha256};
//! use rollup_storage::{
//!     indexed::{Config, IndexedTree, NullifierLeaf},
//!     merkle::Standard,
//!     rollup::NullifierTreeInputs,
//! };
//!
//! let mut hasher = Sha256::new();
//! let mut hasher = Standard::new(&mut hasher);
//! let mut tree = IndexedTree::<NullifierLeaf, Sha256>::init(
//!     &mut hasher,
//!     Config { height: 8, prefilled: 4, pool: None },
//! )
//! .unwrap();
//!
//! let nullifiers = [7u32, 3, 0, 9].map(Field::from);
//! let inputs = NullifierTreeInputs::build(&mut tree, &mut hasher, &nullifiers, 2).unwrap();
//! assert_eq!(inputs.sorted_new_nullifiers[0], Field::from(9u32));
//! assert_eq!(inputs.end_nullifier_tree_snapshot, tree.snapshot(true));
//! ```

use crate::{
    indexed::{self, BatchInsertionResult, IndexedTree, LeafPreimage, NullifierLeaf},
    merkle::{hasher::Hasher, MembershipWitness, SiblingPath, Snapshot},
};
use bytes::{Buf, BufMut};
use rollup_codec::{
    DecodeExt, EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write,
};
use rollup_cryptography::{Field, Hasher as CHasher};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when building rollup inputs.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("indexed tree error: {0}")]
    Indexed(#[from] indexed::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// The nullifier tree section of a base rollup's inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NullifierTreeInputs {
    pub start_nullifier_tree_snapshot: Snapshot,
    pub sorted_new_nullifiers: Vec<Field>,
    /// `sorted_new_nullifiers_indexes[i]` is the input position of `sorted_new_nullifiers[i]`.
    pub sorted_new_nullifiers_indexes: Vec<u32>,
    /// Entry `i` is the low leaf of the nullifier at input position `i`, not of
    /// `sorted_new_nullifiers[i]`.
    pub low_nullifier_leaf_preimages: Vec<LeafPreimage<NullifierLeaf>>,
    /// Entry `i` proves the low leaf at input position `i`, in the same order as
    /// `low_nullifier_leaf_preimages`.
    pub low_nullifier_membership_witness: Vec<MembershipWitness>,
    pub new_nullifiers_subtree_sibling_path: SiblingPath,
    pub end_nullifier_tree_snapshot: Snapshot,
}

impl NullifierTreeInputs {
    /// Package a batch insertion performed between the `start` and `end` snapshots of a tree of
    /// the given height.
    ///
    /// Inputs without a low leaf witness get the empty preimage and an all-zero witness.
    pub fn new(
        start: Snapshot,
        result: BatchInsertionResult<NullifierLeaf>,
        end: Snapshot,
        height: u8,
    ) -> Result<Self, Error> {
        let sorted_new_nullifiers = result
            .sorted_new_leaves
            .into_iter()
            .map(|encoded| NullifierLeaf::decode(encoded).map(|leaf| leaf.value))
            .collect::<Result<Vec<_>, _>>()?;

        let mut low_nullifier_leaf_preimages = Vec::with_capacity(sorted_new_nullifiers.len());
        let mut low_nullifier_membership_witness = Vec::with_capacity(sorted_new_nullifiers.len());
        for witness in result.low_leaves_witness_data {
            match witness {
                Some(witness) => {
                    low_nullifier_membership_witness.push(witness.membership_witness());
                    low_nullifier_leaf_preimages.push(witness.leaf_preimage);
                }
                None => {
                    low_nullifier_membership_witness.push(MembershipWitness::empty(height));
                    low_nullifier_leaf_preimages.push(LeafPreimage::empty());
                }
            }
        }

        Ok(Self {
            start_nullifier_tree_snapshot: start,
            sorted_new_nullifiers,
            sorted_new_nullifiers_indexes: result.sorted_new_leaves_indexes,
            low_nullifier_leaf_preimages,
            low_nullifier_membership_witness,
            new_nullifiers_subtree_sibling_path: result.new_subtree_sibling_path,
            end_nullifier_tree_snapshot: end,
        })
    }

    /// Insert `nullifiers` into `tree` on top of its staged changes and package the result.
    ///
    /// Zero nullifiers are padding. The insertion is left staged.
    pub fn build<H: CHasher>(
        tree: &mut IndexedTree<NullifierLeaf, H>,
        hasher: &mut impl Hasher<H>,
        nullifiers: &[Field],
        subtree_height: u8,
    ) -> Result<Self, Error> {
        let leaves: Vec<NullifierLeaf> =
            nullifiers.iter().copied().map(NullifierLeaf::new).collect();
        let start = tree.snapshot(true);
        let result = tree.batch_insert(hasher, &leaves, subtree_height, true)?;
        let end = tree.snapshot(true);
        debug!(
            start = start.next_available_leaf_index,
            end = end.next_available_leaf_index,
            "built nullifier tree inputs"
        );
        Self::new(start, result, end, tree.height())
    }
}

impl Write for NullifierTreeInputs {
    fn write(&self, buf: &mut impl BufMut) {
        self.start_nullifier_tree_snapshot.write(buf);
        for nullifier in &self.sorted_new_nullifiers {
            nullifier.write(buf);
        }
        for index in &self.sorted_new_nullifiers_indexes {
            index.write(buf);
        }
        for preimage in &self.low_nullifier_leaf_preimages {
            preimage.write(buf);
        }
        for witness in &self.low_nullifier_membership_witness {
            witness.write(buf);
        }
        self.new_nullifiers_subtree_sibling_path.write(buf);
        self.end_nullifier_tree_snapshot.write(buf);
    }
}

impl EncodeSize for NullifierTreeInputs {
    fn encode_size(&self) -> usize {
        2 * Snapshot::SIZE
            + self.sorted_new_nullifiers.len() * Field::SIZE
            + self.sorted_new_nullifiers_indexes.len() * u32::SIZE
            + self.low_nullifier_leaf_preimages.len() * LeafPreimage::<NullifierLeaf>::SIZE
            + self
                .low_nullifier_membership_witness
                .iter()
                .map(EncodeSize::encode_size)
                .sum::<usize>()
            + self.new_nullifiers_subtree_sibling_path.encode_size()
    }
}

impl Read for NullifierTreeInputs {
    /// The subtree height of the batch and the height of the tree.
    type Cfg = (u8, u8);

    fn read_cfg(
        buf: &mut impl Buf,
        (subtree_height, height): &(u8, u8),
    ) -> Result<Self, CodecError> {
        if subtree_height > height || *height > crate::merkle::MAX_HEIGHT {
            return Err(CodecError::Invalid(
                "NullifierTreeInputs",
                "subtree height exceeds tree height",
            ));
        }
        let count = 1usize << subtree_height;
        let start_nullifier_tree_snapshot = Snapshot::read(buf)?;
        let sorted_new_nullifiers = (0..count)
            .map(|_| Field::read(buf))
            .collect::<Result<_, _>>()?;
        let sorted_new_nullifiers_indexes = (0..count)
            .map(|_| u32::read(buf))
            .collect::<Result<_, _>>()?;
        let low_nullifier_leaf_preimages = (0..count)
            .map(|_| LeafPreimage::read(buf))
            .collect::<Result<_, _>>()?;
        let low_nullifier_membership_witness = (0..count)
            .map(|_| MembershipWitness::read_cfg(buf, &(*height as usize)))
            .collect::<Result<_, _>>()?;
        let new_nullifiers_subtree_sibling_path =
            SiblingPath::read_cfg(buf, &((height - subtree_height) as usize))?;
        let end_nullifier_tree_snapshot = Snapshot::read(buf)?;
        Ok(Self {
            start_nullifier_tree_snapshot,
            sorted_new_nullifiers,
            sorted_new_nullifiers_indexes,
            low_nullifier_leaf_preimages,
            low_nullifier_membership_witness,
            new_nullifiers_subtree_sibling_path,
            end_nullifier_tree_snapshot,
        })
    }
}
