//! Field elements and hashers for authenticated rollup state.
//!
//! Trees in `rollup-storage` never inspect the arithmetic of the values they store. They need a
//! fixed-width, totally ordered value ([Field]) and a collision resistant way to combine bytes into
//! another such value ([Hasher]). Anything satisfying those two contracts can back a tree.

use thiserror::Error;

pub mod field;
pub use field::Field;
pub mod sha256;
pub use sha256::{hash, Sha256};
pub mod utils;

/// Errors that can occur when constructing cryptographic primitives.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid field length: {0}")]
    InvalidFieldLength(usize),
}

/// Interface that rollup trees rely on for hashing.
///
/// Trees are not hardcoded to a specific algorithm because circuit-friendly hashes are usually
/// preferable in production while SHA-256 is convenient for tooling and tests.
///
/// This trait is required to implement `Clone` because it is often part of a struct that is cloned.
/// Implementations do not clone the hasher state and callers should not rely on it.
pub trait Hasher: Clone + Send + Sync + 'static {
    /// Create a new hasher.
    fn new() -> Self;

    /// Append message to previously recorded data.
    fn update(&mut self, message: &[u8]);

    /// Hash all recorded data and reset the hasher to the initial state.
    fn finalize(&mut self) -> Field;

    /// Reset the hasher without generating a hash.
    ///
    /// This function does not need to be called after `finalize`.
    fn reset(&mut self);

    /// Return result of hashing nothing.
    fn empty() -> Field {
        Self::new().finalize()
    }
}
