//! Decorator for a cryptographic hasher that implements the tree-specific hashing logic.

use rollup_cryptography::{Field, Hasher as CHasher};

/// A trait for computing the various digests of a tree.
pub trait Hasher<H: CHasher>: Send + Sync {
    /// Computes the digest for a leaf given the element it represents.
    fn leaf_digest(&mut self, element: &[u8]) -> Field;

    /// Computes the digest for a node given the digests of its children.
    fn node_digest(&mut self, left: &Field, right: &Field) -> Field;

    /// Access the inner [CHasher] hasher.
    fn inner(&mut self) -> &mut H;
}

/// The standard hasher to use with a tree. A node is the hash of its children concatenated and a
/// leaf is the hash of its encoding.
pub struct Standard<'a, H: CHasher> {
    hasher: &'a mut H,
}

impl<'a, H: CHasher> Standard<'a, H> {
    /// Creates a new [Standard] hasher.
    pub fn new(hasher: &'a mut H) -> Self {
        Self { hasher }
    }

    pub(crate) fn update_with_digest(&mut self, digest: &Field) {
        self.hasher.update(digest.as_ref());
    }

    pub(crate) fn update_with_element(&mut self, element: &[u8]) {
        self.hasher.update(element);
    }

    pub(crate) fn finalize(&mut self) -> Field {
        self.hasher.finalize()
    }
}

impl<H: CHasher> Hasher<H> for Standard<'_, H> {
    fn inner(&mut self) -> &mut H {
        self.hasher
    }

    fn leaf_digest(&mut self, element: &[u8]) -> Field {
        self.update_with_element(element);
        self.finalize()
    }

    fn node_digest(&mut self, left: &Field, right: &Field) -> Field {
        self.update_with_digest(left);
        self.update_with_digest(right);
        self.finalize()
    }
}
