//! Leaf shapes stored in an indexed tree and the preimages that get hashed into it.

use crate::merkle::hasher::Hasher;
use bytes::{Buf, BufMut};
use rollup_codec::{Encode, Error as CodecError, FixedSize, Read, ReadExt, Write};
use rollup_cryptography::{Field, Hasher as CHasher};
use std::fmt::Debug;

/// A value that can be stored in an indexed tree.
///
/// The tree only ever looks at a leaf through its [IndexedLeaf::key]. Everything else is payload
/// that is carried into the preimage.
pub trait IndexedLeaf:
    Clone + Debug + PartialEq + Eq + Send + Sync + 'static + Write + Read<Cfg = ()> + FixedSize
{
    /// Returns the key that orders this leaf in the list.
    fn key(&self) -> Field;

    /// Returns the leaf stored in an empty slot. Its key must be zero.
    fn empty() -> Self;

    /// Returns the leaf that results from inserting `update`, which has the same key, over `self`.
    fn update(&self, update: &Self) -> Self;
}

/// A key set entry. Inserting a present nullifier changes nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NullifierLeaf {
    pub value: Field,
}

impl NullifierLeaf {
    pub fn new(value: Field) -> Self {
        Self { value }
    }
}

impl IndexedLeaf for NullifierLeaf {
    fn key(&self) -> Field {
        self.value
    }

    fn empty() -> Self {
        Self::default()
    }

    fn update(&self, _: &Self) -> Self {
        *self
    }
}

impl Write for NullifierLeaf {
    fn write(&self, buf: &mut impl BufMut) {
        self.value.write(buf);
    }
}

impl Read for NullifierLeaf {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self {
            value: Field::read(buf)?,
        })
    }
}

impl FixedSize for NullifierLeaf {
    const SIZE: usize = Field::SIZE;
}

/// A storage slot and its current value. Inserting a present slot overwrites the value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PublicDataLeaf {
    pub slot: Field,
    pub value: Field,
}

impl PublicDataLeaf {
    pub fn new(slot: Field, value: Field) -> Self {
        Self { slot, value }
    }
}

impl IndexedLeaf for PublicDataLeaf {
    fn key(&self) -> Field {
        self.slot
    }

    fn empty() -> Self {
        Self::default()
    }

    fn update(&self, update: &Self) -> Self {
        Self {
            slot: self.slot,
            value: update.value,
        }
    }
}

impl Write for PublicDataLeaf {
    fn write(&self, buf: &mut impl BufMut) {
        self.slot.write(buf);
        self.value.write(buf);
    }
}

impl Read for PublicDataLeaf {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let slot = Field::read(buf)?;
        let value = Field::read(buf)?;
        Ok(Self { slot, value })
    }
}

impl FixedSize for PublicDataLeaf {
    const SIZE: usize = 2 * Field::SIZE;
}

/// A leaf together with the position of its successor in key order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafPreimage<L: IndexedLeaf> {
    pub leaf: L,
    pub next_key: Field,
    pub next_index: u32,
}

impl<L: IndexedLeaf> LeafPreimage<L> {
    pub fn new(leaf: L, next_key: Field, next_index: u32) -> Self {
        Self {
            leaf,
            next_key,
            next_index,
        }
    }

    /// The preimage of an empty slot. Slot 0 holds this as the sentinel until a key is inserted.
    pub fn empty() -> Self {
        Self {
            leaf: L::empty(),
            next_key: Field::ZERO,
            next_index: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    pub fn key(&self) -> Field {
        self.leaf.key()
    }

    /// Returns the digest stored in the tree for this preimage.
    ///
    /// The empty preimage hashes to zero, the same as an unwritten slot.
    pub fn digest<H: CHasher>(&self, hasher: &mut impl Hasher<H>) -> Field {
        if self.is_empty() {
            return Field::ZERO;
        }
        hasher.leaf_digest(&self.encode())
    }
}

impl<L: IndexedLeaf> Write for LeafPreimage<L> {
    fn write(&self, buf: &mut impl BufMut) {
        self.leaf.write(buf);
        self.next_key.write(buf);
        Field::from(self.next_index).write(buf);
    }
}

impl<L: IndexedLeaf> Read for LeafPreimage<L> {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let leaf = L::read(buf)?;
        let next_key = Field::read(buf)?;
        let next_index = Field::read(buf)?
            .to_u32()
            .ok_or(CodecError::Invalid("LeafPreimage", "next index exceeds u32"))?;
        Ok(Self {
            leaf,
            next_key,
            next_index,
        })
    }
}

impl<L: IndexedLeaf> FixedSize for LeafPreimage<L> {
    const SIZE: usize = L::SIZE + 2 * Field::SIZE;
}
