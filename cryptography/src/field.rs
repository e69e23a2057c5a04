//! Fixed-width field element.
//!
//! A [Field] is 32 bytes in canonical big-endian form. Comparing two fields compares their numeric
//! values, which for big-endian bytes is the same as comparing the bytes lexicographically, so the
//! derived orderings are the numeric ones.

use crate::{utils::hex, Error};
use bytes::{Buf, BufMut};
use rand::RngCore;
use rollup_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use std::{
    fmt::{Debug, Display},
    ops::Deref,
};

/// Length of an encoded [Field].
pub const FIELD_LENGTH: usize = 32;

/// An opaque, totally ordered field element.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Field([u8; FIELD_LENGTH]);

impl Field {
    /// The zero element. Used as the empty leaf and as the "no successor" marker.
    pub const ZERO: Self = Self([0; FIELD_LENGTH]);

    /// Creates a field from its big-endian representation.
    pub const fn from_be_bytes(bytes: [u8; FIELD_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the big-endian representation.
    pub const fn to_be_bytes(&self) -> [u8; FIELD_LENGTH] {
        self.0
    }

    /// Returns true if this is [Field::ZERO].
    pub fn is_zero(&self) -> bool {
        self.0 == [0; FIELD_LENGTH]
    }

    /// Returns the value as a `u32` if it fits.
    pub fn to_u32(&self) -> Option<u32> {
        let (high, low) = self.0.split_at(FIELD_LENGTH - 4);
        if high.iter().any(|byte| *byte != 0) {
            return None;
        }
        let low: [u8; 4] = low.try_into().ok()?;
        Some(u32::from_be_bytes(low))
    }

    /// Samples a uniformly random 256-bit value.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; FIELD_LENGTH];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

macro_rules! impl_from_uint {
    ($($type:ty),+) => {
        $(
            impl From<$type> for Field {
                fn from(value: $type) -> Self {
                    let mut bytes = [0u8; FIELD_LENGTH];
                    let raw = value.to_be_bytes();
                    bytes[FIELD_LENGTH - raw.len()..].copy_from_slice(&raw);
                    Self(bytes)
                }
            }
        )+
    };
}

impl_from_uint!(u32, u64, u128);

impl From<[u8; FIELD_LENGTH]> for Field {
    fn from(value: [u8; FIELD_LENGTH]) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for Field {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; FIELD_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidFieldLength(value.len()))?;
        Ok(Self(array))
    }
}

impl Write for Field {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl Read for Field {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self(<[u8; FIELD_LENGTH]>::read(buf)?))
    }
}

impl FixedSize for Field {
    const SIZE: usize = FIELD_LENGTH;
}

impl AsRef<[u8]> for Field {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Field {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex(&self.0))
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex(&self.0))
    }
}
