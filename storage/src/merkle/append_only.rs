//! An in-memory append-only tree with a staged overlay.
//!
//! Committed digests are stored densely per level. Staged digests live in a sparse map per level
//! keyed by node index and are consulted before the committed ones. A write stages the new leaf
//! digests and then rehashes only the ancestors of those leaves, one level at a time. Nothing
//! outside of those paths is ever recomputed.

use crate::{
    merkle::{
        hasher::{Hasher, Standard},
        zero_digests, Error, SiblingPath, Snapshot, MAX_HEIGHT,
    },
    ThreadPool,
};
use rayon::prelude::*;
use rollup_cryptography::{Field, Hasher as CHasher};
use std::{
    collections::{BTreeMap, BTreeSet},
    marker::PhantomData,
};
use tracing::debug;

/// Minimum number of dirty nodes in a level before its digests are computed in parallel.
const MIN_TO_PARALLELIZE: usize = 20;

/// Configuration for initializing an [AppendOnlyTree].
pub struct Config {
    /// The height of the tree. Must be in `1..=MAX_HEIGHT`.
    pub height: u8,

    /// Committed leaf digests, in slot order.
    pub leaves: Vec<Field>,

    /// Optional thread pool to use for parallelizing rehashing.
    pub pool: Option<ThreadPool>,
}

/// Implementation of `AppendOnlyTree`.
pub struct AppendOnlyTree<H: CHasher> {
    height: u8,

    // Committed digests by level. Level `l` holds exactly `ceil(size / 2^l)` nodes.
    nodes: Vec<Vec<Field>>,

    // The number of committed leaves.
    size: u64,

    // Staged digests by level, keyed by node index.
    staged: Vec<BTreeMap<u64, Field>>,

    // The number of leaves once staged writes are applied.
    staged_size: u64,

    // Digests of empty subtrees by level.
    zeros: Vec<Field>,

    pool: Option<ThreadPool>,

    _hasher: PhantomData<H>,
}

impl<H: CHasher> AppendOnlyTree<H> {
    /// Return a tree holding the leaves in `cfg` as committed state.
    pub fn init(hasher: &mut impl Hasher<H>, cfg: Config) -> Result<Self, Error> {
        if cfg.height == 0 || cfg.height > MAX_HEIGHT {
            return Err(Error::InvalidHeight(cfg.height));
        }
        let capacity = 1u64 << cfg.height;
        let size = cfg.leaves.len() as u64;
        if size > capacity {
            return Err(Error::CapacityExceeded {
                requested: size,
                capacity,
            });
        }

        let zeros = zero_digests(hasher, cfg.height);
        let mut nodes = Vec::with_capacity(cfg.height as usize + 1);
        nodes.push(cfg.leaves);
        for level in 0..cfg.height as usize {
            let children = &nodes[level];
            let parents: Vec<Field> = children
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&zeros[level]);
                    hasher.node_digest(&pair[0], right)
                })
                .collect();
            nodes.push(parents);
        }
        debug!(height = cfg.height, size, "initialized tree");

        Ok(Self {
            height: cfg.height,
            nodes,
            size,
            staged: vec![BTreeMap::new(); cfg.height as usize + 1],
            staged_size: size,
            zeros,
            pool: cfg.pool,
            _hasher: PhantomData,
        })
    }

    /// Return the height of the tree.
    pub fn height(&self) -> u8 {
        self.height
    }

    /// Return the number of leaf slots.
    pub fn capacity(&self) -> u64 {
        1 << self.height
    }

    /// Return the number of written leaves, which is also the next available leaf index.
    pub fn num_leaves(&self, include_uncommitted: bool) -> u64 {
        if include_uncommitted {
            self.staged_size
        } else {
            self.size
        }
    }

    /// Returns true if there are staged writes.
    pub fn is_dirty(&self) -> bool {
        self.staged_size != self.size || self.staged.iter().any(|level| !level.is_empty())
    }

    /// Returns an error unless `additional` more leaves fit after the staged ones.
    pub fn ensure_capacity(&self, additional: u64) -> Result<(), Error> {
        let requested = self.staged_size + additional;
        if requested > self.capacity() {
            return Err(Error::CapacityExceeded {
                requested,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    /// Returns the digest of node `index` at `level`.
    fn node(&self, level: usize, index: u64, include_uncommitted: bool) -> Field {
        let size = self.num_leaves(include_uncommitted);
        let width = (size + (1 << level) - 1) >> level;
        if index >= width {
            return self.zeros[level];
        }
        if include_uncommitted {
            if let Some(digest) = self.staged[level].get(&index) {
                return *digest;
            }
        }
        self.nodes[level]
            .get(index as usize)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    /// Return the root of the tree.
    pub fn root(&self, include_uncommitted: bool) -> Field {
        self.node(self.height as usize, 0, include_uncommitted)
    }

    /// Return the snapshot of the tree.
    pub fn snapshot(&self, include_uncommitted: bool) -> Snapshot {
        // Capacity is at most 2^MAX_HEIGHT, so the size fits.
        Snapshot::new(
            self.root(include_uncommitted),
            self.num_leaves(include_uncommitted) as u32,
        )
    }

    /// Return the digest stored at leaf `index`, or `None` if the slot is unwritten.
    pub fn leaf_value(&self, index: u64, include_uncommitted: bool) -> Option<Field> {
        if index >= self.num_leaves(include_uncommitted) {
            return None;
        }
        Some(self.node(0, index, include_uncommitted))
    }

    /// Return the sibling path of leaf `index`. Unwritten slots within capacity have a path too.
    pub fn sibling_path(
        &self,
        index: u64,
        include_uncommitted: bool,
    ) -> Result<SiblingPath, Error> {
        if index >= self.capacity() {
            return Err(Error::IndexOutOfBounds(index));
        }
        Ok(self.path_from(0, index, include_uncommitted))
    }

    /// Return the sibling path of the subtree of height `subtree_height` containing the next
    /// available leaf index.
    ///
    /// This is the full sibling path of the next available leaf index without its first
    /// `subtree_height` entries.
    pub fn subtree_sibling_path(
        &self,
        subtree_height: u8,
        include_uncommitted: bool,
    ) -> Result<SiblingPath, Error> {
        if subtree_height > self.height {
            return Err(Error::InvalidSubtreeHeight(subtree_height));
        }
        let next = self.num_leaves(include_uncommitted);
        if next >= self.capacity() {
            return Err(Error::IndexOutOfBounds(next));
        }
        Ok(self.path_from(
            subtree_height as usize,
            next >> subtree_height,
            include_uncommitted,
        ))
    }

    fn path_from(&self, start: usize, index: u64, include_uncommitted: bool) -> SiblingPath {
        let siblings = (start..self.height as usize)
            .map(|level| {
                let sibling = (index >> (level - start)) ^ 1;
                self.node(level, sibling, include_uncommitted)
            })
            .collect();
        SiblingPath::new(siblings)
    }

    /// Stage `leaves` into consecutive slots starting at the next available leaf index.
    pub fn append_leaves(
        &mut self,
        hasher: &mut impl Hasher<H>,
        leaves: &[Field],
    ) -> Result<(), Error> {
        if leaves.is_empty() {
            return Ok(());
        }
        self.ensure_capacity(leaves.len() as u64)?;

        let start = self.staged_size;
        let mut dirty = BTreeSet::new();
        for (offset, leaf) in leaves.iter().enumerate() {
            let index = start + offset as u64;
            self.staged[0].insert(index, *leaf);
            dirty.insert(index);
        }
        self.staged_size += leaves.len() as u64;
        self.merkleize(hasher, dirty);
        debug!(start, count = leaves.len(), "staged appended leaves");

        Ok(())
    }

    /// Stage new digests for already written slots.
    ///
    /// Either every update is staged or, if any index is unwritten, none are.
    pub fn update_leaves(
        &mut self,
        hasher: &mut impl Hasher<H>,
        updates: &[(u64, Field)],
    ) -> Result<(), Error> {
        if let Some((index, _)) = updates.iter().find(|(index, _)| *index >= self.staged_size) {
            return Err(Error::IndexOutOfBounds(*index));
        }
        if updates.is_empty() {
            return Ok(());
        }

        let mut dirty = BTreeSet::new();
        for (index, leaf) in updates {
            self.staged[0].insert(*index, *leaf);
            dirty.insert(*index);
        }
        self.merkleize(hasher, dirty);
        debug!(count = updates.len(), "staged leaf updates");

        Ok(())
    }

    /// Recompute the staged ancestors of the `dirty` leaves, level by level.
    fn merkleize(&mut self, hasher: &mut impl Hasher<H>, mut dirty: BTreeSet<u64>) {
        for level in 0..self.height as usize {
            let parents: BTreeSet<u64> = dirty.iter().map(|index| index >> 1).collect();
            let digests: Vec<(u64, Field)> = match self.pool.clone() {
                Some(pool) if parents.len() >= MIN_TO_PARALLELIZE => pool.install(|| {
                    parents
                        .par_iter()
                        .map_init(H::new, |inner, parent| {
                            let mut hasher = Standard::new(inner);
                            (*parent, self.parent_digest(&mut hasher, level, *parent))
                        })
                        .collect()
                }),
                _ => parents
                    .iter()
                    .map(|parent| (*parent, self.parent_digest(hasher, level, *parent)))
                    .collect(),
            };
            self.staged[level + 1].extend(digests);
            dirty = parents;
        }
    }

    fn parent_digest(&self, hasher: &mut impl Hasher<H>, level: usize, parent: u64) -> Field {
        let left = self.node(level, parent << 1, true);
        let right = self.node(level, (parent << 1) | 1, true);
        hasher.node_digest(&left, &right)
    }

    /// Merge staged writes into the committed state and return the new snapshot.
    ///
    /// Committing with nothing staged returns the current snapshot.
    pub fn commit(&mut self) -> Snapshot {
        for (level, staged) in self.staged.iter_mut().enumerate() {
            let nodes = &mut self.nodes[level];
            for (index, digest) in std::mem::take(staged) {
                let index = index as usize;
                if index < nodes.len() {
                    nodes[index] = digest;
                } else {
                    // New nodes are staged contiguously after the committed ones.
                    debug_assert_eq!(index, nodes.len());
                    nodes.push(digest);
                }
            }
        }
        self.size = self.staged_size;
        let snapshot = self.snapshot(false);
        debug!(size = self.size, root = ?snapshot.root, "committed tree");
        snapshot
    }

    /// Discard all staged writes.
    pub fn rollback(&mut self) {
        for staged in self.staged.iter_mut() {
            staged.clear();
        }
        self.staged_size = self.size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, merkle::MembershipWitness};
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rollup_cryptography::{hash, Sha256};
    use rollup_macros::test_traced;
    use test_case::test_case;

    fn leaf(i: u64) -> Field {
        hash(&i.to_be_bytes())
    }

    fn empty_tree(hasher: &mut impl Hasher<Sha256>, height: u8) -> AppendOnlyTree<Sha256> {
        AppendOnlyTree::init(
            hasher,
            Config {
                height,
                leaves: Vec::new(),
                pool: None,
            },
        )
        .unwrap()
    }

    /// Compute the root of a tree of `height` holding `leaves` by brute force.
    fn reference_root(hasher: &mut impl Hasher<Sha256>, height: u8, leaves: &[Field]) -> Field {
        let mut level = leaves.to_vec();
        level.resize(1 << height, Field::ZERO);
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| hasher.node_digest(&pair[0], &pair[1]))
                .collect();
        }
        level[0]
    }

    #[test_case(0; "zero")]
    #[test_case(32; "too tall")]
    fn test_init_invalid_height(height: u8) {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let result = AppendOnlyTree::<Sha256>::init(
            &mut hasher,
            Config {
                height,
                leaves: Vec::new(),
                pool: None,
            },
        );
        assert!(matches!(result, Err(Error::InvalidHeight(h)) if h == height));
    }

    #[test]
    fn test_init_too_many_leaves() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let result = AppendOnlyTree::<Sha256>::init(
            &mut hasher,
            Config {
                height: 2,
                leaves: vec![Field::ZERO; 5],
                pool: None,
            },
        );
        assert!(matches!(
            result,
            Err(Error::CapacityExceeded {
                requested: 5,
                capacity: 4
            })
        ));
    }

    #[test]
    fn test_empty_tree() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let tree = empty_tree(&mut hasher, 4);
        let zeros = zero_digests(&mut hasher, 4);
        assert_eq!(tree.root(false), zeros[4]);
        assert_eq!(tree.root(true), zeros[4]);
        assert_eq!(tree.num_leaves(false), 0);
        assert_eq!(tree.leaf_value(0, true), None);
        assert!(!tree.is_dirty());
        assert_eq!(tree.snapshot(false), Snapshot::new(zeros[4], 0));
    }

    #[test_case(1, 2; "full height one")]
    #[test_case(3, 5; "partial")]
    #[test_case(4, 16; "full")]
    #[test_case(5, 1; "single")]
    fn test_append_matches_reference(height: u8, count: u64) {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let mut tree = empty_tree(&mut hasher, height);
        let leaves: Vec<Field> = (0..count).map(leaf).collect();
        tree.append_leaves(&mut hasher, &leaves).unwrap();

        let expected = reference_root(&mut hasher, height, &leaves);
        assert_eq!(tree.root(true), expected);
        assert_eq!(tree.num_leaves(true), count);

        // Committed view is untouched until commit.
        assert_eq!(tree.num_leaves(false), 0);
        assert_ne!(tree.root(false), expected);

        let snapshot = tree.commit();
        assert_eq!(snapshot, Snapshot::new(expected, count as u32));
        assert_eq!(tree.root(false), expected);
        assert!(!tree.is_dirty());
    }

    #[test]
    fn test_incremental_appends_match_bulk() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let leaves: Vec<Field> = (0..11).map(leaf).collect();

        let mut bulk = empty_tree(&mut hasher, 4);
        bulk.append_leaves(&mut hasher, &leaves).unwrap();
        bulk.commit();

        let mut incremental = empty_tree(&mut hasher, 4);
        for (i, chunk) in leaves.chunks(3).enumerate() {
            incremental.append_leaves(&mut hasher, chunk).unwrap();
            if i % 2 == 0 {
                incremental.commit();
            }
        }
        incremental.commit();
        assert_eq!(bulk.snapshot(false), incremental.snapshot(false));

        let restored = AppendOnlyTree::<Sha256>::init(
            &mut hasher,
            Config {
                height: 4,
                leaves,
                pool: None,
            },
        )
        .unwrap();
        assert_eq!(restored.snapshot(false), bulk.snapshot(false));
    }

    #[test]
    fn test_capacity_exceeded_stages_nothing() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let mut tree = empty_tree(&mut hasher, 2);
        tree.append_leaves(&mut hasher, &[leaf(0), leaf(1), leaf(2)])
            .unwrap();
        let root = tree.root(true);

        let result = tree.append_leaves(&mut hasher, &[leaf(3), leaf(4)]);
        assert!(matches!(
            result,
            Err(Error::CapacityExceeded {
                requested: 5,
                capacity: 4
            })
        ));
        assert_eq!(tree.root(true), root);
        assert_eq!(tree.num_leaves(true), 3);

        // Filling exactly to capacity is fine.
        tree.append_leaves(&mut hasher, &[leaf(3)]).unwrap();
        assert_eq!(tree.num_leaves(true), 4);
        assert!(matches!(
            tree.subtree_sibling_path(0, true),
            Err(Error::IndexOutOfBounds(4))
        ));
    }

    #[test]
    fn test_update_leaves() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let mut leaves: Vec<Field> = (0..6).map(leaf).collect();
        let mut tree = empty_tree(&mut hasher, 3);
        tree.append_leaves(&mut hasher, &leaves).unwrap();
        tree.commit();

        leaves[1] = leaf(100);
        leaves[4] = leaf(101);
        tree.update_leaves(&mut hasher, &[(1, leaves[1]), (4, leaves[4])])
            .unwrap();
        assert!(tree.is_dirty());
        assert_eq!(tree.num_leaves(true), 6);
        assert_eq!(tree.root(true), reference_root(&mut hasher, 3, &leaves));
        assert_eq!(tree.leaf_value(1, true), Some(leaf(100)));
        assert_eq!(tree.leaf_value(1, false), Some(leaf(1)));

        // Unwritten slots cannot be updated and nothing is staged on failure.
        let root = tree.root(true);
        let result = tree.update_leaves(&mut hasher, &[(2, leaf(7)), (6, leaf(8))]);
        assert!(matches!(result, Err(Error::IndexOutOfBounds(6))));
        assert_eq!(tree.root(true), root);
        assert_eq!(tree.leaf_value(2, true), Some(leaf(2)));
    }

    #[test]
    fn test_rollback() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let mut tree = empty_tree(&mut hasher, 3);
        tree.append_leaves(&mut hasher, &[leaf(0), leaf(1)]).unwrap();
        let committed = tree.commit();

        tree.append_leaves(&mut hasher, &[leaf(2)]).unwrap();
        tree.update_leaves(&mut hasher, &[(0, leaf(9))]).unwrap();
        assert!(tree.is_dirty());
        tree.rollback();
        assert!(!tree.is_dirty());
        assert_eq!(tree.snapshot(true), committed);
        assert_eq!(tree.leaf_value(2, true), None);
        assert_eq!(tree.leaf_value(0, true), Some(leaf(0)));

        // Commit with nothing staged returns the same snapshot.
        assert_eq!(tree.commit(), committed);
    }

    #[test]
    fn test_sibling_paths_round_trip() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let mut tree = empty_tree(&mut hasher, 4);
        let leaves: Vec<Field> = (0..7).map(leaf).collect();
        tree.append_leaves(&mut hasher, &leaves[..4]).unwrap();
        tree.commit();
        tree.append_leaves(&mut hasher, &leaves[4..]).unwrap();

        for include_uncommitted in [false, true] {
            let root = tree.root(include_uncommitted);
            for index in 0..tree.capacity() {
                let path = tree.sibling_path(index, include_uncommitted).unwrap();
                assert_eq!(path.len(), 4);
                let value = tree
                    .leaf_value(index, include_uncommitted)
                    .unwrap_or(Field::ZERO);
                let witness = MembershipWitness::new(index as u32, path);
                assert!(witness.verify(&mut hasher, value, &root));
            }
        }
        assert!(matches!(
            tree.sibling_path(16, true),
            Err(Error::IndexOutOfBounds(16))
        ));
    }

    #[test]
    fn test_subtree_sibling_path() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let mut tree = empty_tree(&mut hasher, 4);
        tree.append_leaves(&mut hasher, &(0..4).map(leaf).collect::<Vec<_>>())
            .unwrap();

        let full = tree.sibling_path(4, true).unwrap();
        let subtree = tree.subtree_sibling_path(2, true).unwrap();
        assert_eq!(subtree.as_slice(), &full.as_slice()[2..]);

        // Appending a subtree under that path yields the new root.
        let batch: Vec<Field> = (4..8).map(leaf).collect();
        let subtree_root = reference_root(&mut hasher, 2, &batch);
        tree.append_leaves(&mut hasher, &batch).unwrap();
        assert_eq!(
            subtree.root_from(&mut hasher, subtree_root, 1),
            tree.root(true)
        );

        assert_eq!(tree.subtree_sibling_path(4, true).unwrap().len(), 0);
        assert!(matches!(
            tree.subtree_sibling_path(5, true),
            Err(Error::InvalidSubtreeHeight(5))
        ));
    }

    #[test_traced]
    fn test_parallel_matches_serial() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let mut rng = StdRng::seed_from_u64(0);
        let leaves: Vec<Field> = (0..300).map(|_| Field::random(&mut rng)).collect();

        let mut serial = empty_tree(&mut hasher, 10);
        let mut parallel = AppendOnlyTree::<Sha256>::init(
            &mut hasher,
            Config {
                height: 10,
                leaves: Vec::new(),
                pool: Some(create_pool(4).unwrap()),
            },
        )
        .unwrap();

        for tree in [&mut serial, &mut parallel] {
            tree.append_leaves(&mut hasher, &leaves).unwrap();
        }
        assert_eq!(serial.root(true), parallel.root(true));

        let updates: Vec<(u64, Field)> = (0..50)
            .map(|_| (rng.gen_range(0..300), Field::random(&mut rng)))
            .collect();
        for tree in [&mut serial, &mut parallel] {
            tree.update_leaves(&mut hasher, &updates).unwrap();
        }
        assert_eq!(serial.commit(), parallel.commit());
    }

    #[test]
    fn test_reads_are_idempotent() {
        let mut hasher = Sha256::new();
        let mut hasher = Standard::new(&mut hasher);
        let mut tree = empty_tree(&mut hasher, 3);
        tree.append_leaves(&mut hasher, &[leaf(0), leaf(1), leaf(2)])
            .unwrap();
        let before = (tree.snapshot(true), tree.snapshot(false));
        for _ in 0..2 {
            tree.sibling_path(1, true).unwrap();
            tree.subtree_sibling_path(1, true).unwrap();
            tree.leaf_value(2, true);
        }
        assert_eq!((tree.snapshot(true), tree.snapshot(false)), before);
    }
}
