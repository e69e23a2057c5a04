//! Values returned by a batch insertion.

use crate::{
    indexed::{IndexedLeaf, LeafPreimage},
    merkle::{MembershipWitness, SiblingPath},
};
use bytes::Bytes;

/// Proves that `leaf_preimage` sat at `index` under the root before an insertion, making it the
/// low leaf of a new key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowLeafWitnessData<L: IndexedLeaf> {
    pub leaf_preimage: LeafPreimage<L>,
    pub sibling_path: SiblingPath,
    pub index: u32,
}

impl<L: IndexedLeaf> LowLeafWitnessData<L> {
    /// Returns the membership witness for the low leaf.
    pub fn membership_witness(&self) -> MembershipWitness {
        MembershipWitness::new(self.index, self.sibling_path.clone())
    }
}

/// Everything a circuit needs to replay a batch insertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchInsertionResult<L: IndexedLeaf> {
    /// Low leaf witnesses in input order. An entry is `None` when its key was already present, was
    /// padding, or had a low leaf that was itself inserted earlier in the batch.
    pub low_leaves_witness_data: Vec<Option<LowLeafWitnessData<L>>>,

    /// Sibling path of the subtree the new leaves were appended as, taken after the low leaves
    /// were rewritten.
    pub new_subtree_sibling_path: SiblingPath,

    /// The encoded input leaves ordered by key, greatest first.
    pub sorted_new_leaves: Vec<Bytes>,

    /// `sorted_new_leaves_indexes[i]` is the input position of `sorted_new_leaves[i]`.
    pub sorted_new_leaves_indexes: Vec<u32>,
}
