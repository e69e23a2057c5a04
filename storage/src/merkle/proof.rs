//! Sibling paths and the membership witnesses built from them.

use crate::merkle::hasher::Hasher;
use bytes::{Buf, BufMut};
use rollup_codec::{
    util::at_least, EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write,
};
use rollup_cryptography::{Field, Hasher as CHasher};

/// The digests needed to recompute a root from a node.
///
/// Entry `i` is the sibling of the ancestor `i` levels above the level the path starts at. A path
/// from a leaf of a tree of height `H` has `H` entries. A path from the root of a subtree of height
/// `h` starts at level `h` and has `H - h` entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SiblingPath(Vec<Field>);

impl SiblingPath {
    pub fn new(siblings: Vec<Field>) -> Self {
        Self(siblings)
    }

    /// A path of `len` zero entries.
    pub fn zero(len: usize) -> Self {
        Self(vec![Field::ZERO; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Field] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Field> {
        self.0
    }

    /// Recompute the root reached by walking this path up from `node`, where `index` is the
    /// position of `node` within the level the path starts at.
    pub fn root_from<H: CHasher>(
        &self,
        hasher: &mut impl Hasher<H>,
        node: Field,
        index: u64,
    ) -> Field {
        let mut current = node;
        for (level, sibling) in self.0.iter().enumerate() {
            current = if (index >> level) & 1 == 0 {
                hasher.node_digest(&current, sibling)
            } else {
                hasher.node_digest(sibling, &current)
            };
        }
        current
    }
}

impl Write for SiblingPath {
    fn write(&self, buf: &mut impl BufMut) {
        for sibling in &self.0 {
            sibling.write(buf);
        }
    }
}

impl EncodeSize for SiblingPath {
    fn encode_size(&self) -> usize {
        self.0.len() * Field::SIZE
    }
}

impl Read for SiblingPath {
    /// The number of entries.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, len: &usize) -> Result<Self, CodecError> {
        let size = len
            .checked_mul(Field::SIZE)
            .ok_or(CodecError::InvalidLength(*len))?;
        at_least(buf, size)?;
        let mut siblings = Vec::with_capacity(*len);
        for _ in 0..*len {
            siblings.push(Field::read(buf)?);
        }
        Ok(Self(siblings))
    }
}

/// Proof that a leaf sits at `leaf_index` under some root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipWitness {
    pub leaf_index: u32,
    pub sibling_path: SiblingPath,
}

impl MembershipWitness {
    pub fn new(leaf_index: u32, sibling_path: SiblingPath) -> Self {
        Self {
            leaf_index,
            sibling_path,
        }
    }

    /// The placeholder witness for a tree of the given height: index 0 and an all-zero path.
    pub fn empty(height: u8) -> Self {
        Self {
            leaf_index: 0,
            sibling_path: SiblingPath::zero(height as usize),
        }
    }

    /// Returns true if `leaf` (a leaf digest) sits at `leaf_index` under `root`.
    pub fn verify<H: CHasher>(
        &self,
        hasher: &mut impl Hasher<H>,
        leaf: Field,
        root: &Field,
    ) -> bool {
        self.sibling_path
            .root_from(hasher, leaf, self.leaf_index as u64)
            == *root
    }
}

// The index is written as a full field element, matching the other circuit inputs.
impl Write for MembershipWitness {
    fn write(&self, buf: &mut impl BufMut) {
        Field::from(self.leaf_index).write(buf);
        self.sibling_path.write(buf);
    }
}

impl EncodeSize for MembershipWitness {
    fn encode_size(&self) -> usize {
        Field::SIZE + self.sibling_path.encode_size()
    }
}

impl Read for MembershipWitness {
    /// The height of the tree.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, height: &usize) -> Result<Self, CodecError> {
        let leaf_index = Field::read(buf)?
            .to_u32()
            .ok_or(CodecError::Invalid("MembershipWitness", "leaf index exceeds u32"))?;
        let sibling_path = SiblingPath::read_cfg(buf, height)?;
        Ok(Self {
            leaf_index,
            sibling_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::Standard;
    use rollup_codec::{Decode, Encode};
    use rollup_cryptography::{hash, Sha256};

    #[test]
    fn test_root_from() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let leaves: Vec<Field> = (0u32..4).map(|i| hash(&i.to_be_bytes())).collect();
        let n0 = hasher.node_digest(&leaves[0], &leaves[1]);
        let n1 = hasher.node_digest(&leaves[2], &leaves[3]);
        let root = hasher.node_digest(&n0, &n1);

        let path = SiblingPath::new(vec![leaves[3], n0]);
        assert_eq!(path.root_from(&mut hasher, leaves[2], 2), root);
        assert_ne!(path.root_from(&mut hasher, leaves[2], 3), root);

        // A path starting at level 1.
        let path = SiblingPath::new(vec![n1]);
        assert_eq!(path.root_from(&mut hasher, n0, 0), root);
    }

    #[test]
    fn test_membership_witness_verify() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let leaf = hash(b"leaf");
        let sibling = hash(b"sibling");
        let root = hasher.node_digest(&sibling, &leaf);

        let witness = MembershipWitness::new(1, SiblingPath::new(vec![sibling]));
        assert!(witness.verify(&mut hasher, leaf, &root));
        assert!(!witness.verify(&mut hasher, sibling, &root));

        let wrong_index = MembershipWitness::new(0, SiblingPath::new(vec![sibling]));
        assert!(!wrong_index.verify(&mut hasher, leaf, &root));
    }

    #[test]
    fn test_sibling_path_codec() {
        let path = SiblingPath::new(vec![Field::from(1u32), Field::from(2u32), Field::from(3u32)]);
        let encoded = path.encode();
        assert_eq!(encoded.len(), 3 * Field::SIZE);
        assert_eq!(&encoded[..Field::SIZE], &Field::from(1u32).to_be_bytes());
        assert_eq!(SiblingPath::decode_cfg(encoded.clone(), &3).unwrap(), path);

        // Length must match the configuration exactly.
        assert!(matches!(
            SiblingPath::decode_cfg(encoded.clone(), &4),
            Err(CodecError::EndOfBuffer)
        ));
        assert!(matches!(
            SiblingPath::decode_cfg(encoded, &2),
            Err(CodecError::ExtraData(32))
        ));
    }

    #[test]
    fn test_membership_witness_codec() {
        let witness = MembershipWitness::new(
            5,
            SiblingPath::new(vec![Field::from(9u32), Field::from(10u32)]),
        );
        let encoded = witness.encode();
        assert_eq!(encoded.len(), 3 * Field::SIZE);
        assert_eq!(&encoded[..Field::SIZE], &Field::from(5u32).to_be_bytes());
        assert_eq!(MembershipWitness::decode_cfg(encoded, &2).unwrap(), witness);

        let mut oversized = Field::from(u64::MAX).encode();
        oversized.extend_from_slice(&SiblingPath::zero(1).encode());
        assert!(matches!(
            MembershipWitness::decode_cfg(oversized, &1),
            Err(CodecError::Invalid(_, _))
        ));
    }

    #[test]
    fn test_empty_witness() {
        let witness = MembershipWitness::empty(4);
        assert_eq!(witness.leaf_index, 0);
        assert_eq!(witness.sibling_path, SiblingPath::zero(4));
        assert!(witness.sibling_path.as_slice().iter().all(Field::is_zero));
    }
}
