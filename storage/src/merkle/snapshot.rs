//! The externally visible state of a tree.

use bytes::{Buf, BufMut};
use rollup_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use rollup_cryptography::Field;

/// A root together with the next available leaf index.
///
/// Two trees with equal snapshots hold the same leaves, so a snapshot is all a circuit needs to
/// pin the state a witness was produced against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Snapshot {
    pub root: Field,
    pub next_available_leaf_index: u32,
}

impl Snapshot {
    pub fn new(root: Field, next_available_leaf_index: u32) -> Self {
        Self {
            root,
            next_available_leaf_index,
        }
    }
}

impl Write for Snapshot {
    fn write(&self, buf: &mut impl BufMut) {
        self.root.write(buf);
        self.next_available_leaf_index.write(buf);
    }
}

impl Read for Snapshot {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let root = Field::read(buf)?;
        let next_available_leaf_index = u32::read(buf)?;
        Ok(Self {
            root,
            next_available_leaf_index,
        })
    }
}

impl FixedSize for Snapshot {
    const SIZE: usize = Field::SIZE + u32::SIZE;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_codec::{DecodeExt, Encode};

    #[test]
    fn test_snapshot_codec() {
        let snapshot = Snapshot::new(Field::from(7u32), 300);
        let encoded = snapshot.encode();
        assert_eq!(encoded.len(), Snapshot::SIZE);
        assert_eq!(&encoded[..32], &Field::from(7u32).to_be_bytes());
        assert_eq!(&encoded[32..], &300u32.to_be_bytes());
        assert_eq!(Snapshot::decode(encoded).unwrap(), snapshot);
    }

    #[test]
    fn test_snapshot_decode_truncated() {
        let encoded = Snapshot::new(Field::from(7u32), 1).encode();
        let result = Snapshot::decode(&encoded[..Snapshot::SIZE - 1]);
        assert!(matches!(result, Err(CodecError::EndOfBuffer)));
    }
}
