//! Serialize fixed-width rollup state.
//!
//! # Overview
//!
//! Everything hashed into a tree or handed to a circuit has a byte layout that other parties
//! depend on bit-for-bit. This crate provides the traits used to describe those layouts:
//!
//! - [Write] appends the encoding of a value to a [bytes::BufMut].
//! - [Read] consumes an encoding from a [bytes::Buf], optionally guided by a configuration
//!   (for example the expected number of entries in a sibling path).
//! - [EncodeSize] and [FixedSize] report the number of bytes a value occupies.
//!
//! [Encode] and [Decode] are provided on top of these. [Decode] rejects buffers with trailing
//! bytes, so a decoded value always accounts for its entire input.
//!
//! All integers are written big-endian.
//!
//! # Example
//!
//! ```
//! use bytes::{Buf, BufMut};
//! use rollup_codec::{DecodeExt, Encode, Error, FixedSize, Read, ReadExt, Write};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Checkpoint {
//!     block: u64,
//!     leaves: u32,
//! }
//!
//! impl Write for Checkpoint {
//!     fn write(&self, buf: &mut impl BufMut) {
//!         self.block.write(buf);
//!         self.leaves.write(buf);
//!     }
//! }
//!
//! impl Read for Checkpoint {
//!     type Cfg = ();
//!
//!     fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
//!         let block = u64::read(buf)?;
//!         let leaves = u32::read(buf)?;
//!         Ok(Self { block, leaves })
//!     }
//! }
//!
//! impl FixedSize for Checkpoint {
//!     const SIZE: usize = u64::SIZE + u32::SIZE;
//! }
//!
//! let checkpoint = Checkpoint { block: 7, leaves: 64 };
//! let encoded = checkpoint.encode();
//! assert_eq!(encoded.len(), Checkpoint::SIZE);
//! assert_eq!(Checkpoint::decode(encoded).unwrap(), checkpoint);
//! ```

pub mod codec;
pub mod error;
pub mod types;
pub mod util;

pub use codec::{
    Codec, Decode, DecodeExt, Encode, EncodeFixed, EncodeSize, FixedSize, Read, ReadExt, Write,
};
pub use error::Error;
