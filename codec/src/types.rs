//! Codec implementations for standard types.

pub mod primitives;
