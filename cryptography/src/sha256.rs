//! SHA-256 implementation of the [Hasher] trait.
//!
//! # Example
//! ```rust
//! use rollup_cryptography::{Hasher, Sha256};
//!
//! let mut hasher = Sha256::new();
//! hasher.update(b"hello,");
//! hasher.update(b"world!");
//! let digest = hasher.finalize();
//! println!("digest: {digest}");
//! ```

use crate::{field::FIELD_LENGTH, Field, Hasher};
use sha2::{Digest as _, Sha256 as ISha256};

/// Generate a SHA-256 digest from a message.
pub fn hash(message: &[u8]) -> Field {
    let array: [u8; FIELD_LENGTH] = ISha256::digest(message).into();
    Field::from(array)
}

/// SHA-256 hasher.
#[derive(Debug)]
pub struct Sha256 {
    hasher: ISha256,
}

impl Default for Sha256 {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Sha256 {
    fn clone(&self) -> Self {
        // Hasher state is intentionally not carried over.
        Self::default()
    }
}

impl Hasher for Sha256 {
    fn new() -> Self {
        Self {
            hasher: ISha256::new(),
        }
    }

    fn update(&mut self, message: &[u8]) {
        self.hasher.update(message);
    }

    fn finalize(&mut self) -> Field {
        let finalized = self.hasher.finalize_reset();
        let array: [u8; FIELD_LENGTH] = finalized.into();
        Field::from(array)
    }

    fn reset(&mut self) {
        self.hasher = ISha256::new();
    }
}
