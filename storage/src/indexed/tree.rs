//! An indexed tree backed by an in-memory [AppendOnlyTree].
//!
//! Preimages are kept alongside the digests so low leaves can be read back, and an ordered index
//! from key to slot answers low leaf queries without walking the list.

use crate::{
    indexed::{
        pending::Pending, BatchInsertionResult, Error, IndexedLeaf, LeafPreimage,
        LowLeafWitnessData,
    },
    merkle::{self, hasher::Hasher, AppendOnlyTree, SiblingPath, Snapshot},
    ThreadPool,
};
use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};
use rollup_codec::Encode;
use rollup_cryptography::{Field, Hasher as CHasher};
use std::{cmp::Reverse, collections::BTreeMap};
use tracing::{debug, warn};

/// Configuration for initializing an [IndexedTree].
pub struct Config {
    /// The height of the underlying tree.
    pub height: u8,

    /// The number of slots reserved at initialization, including the sentinel at slot 0. Slots
    /// after the sentinel are empty. Reserving `2^h` slots keeps later batches of `2^h` leaves
    /// aligned to subtree boundaries.
    pub prefilled: u32,

    /// Optional thread pool to use for parallelizing rehashing.
    pub pool: Option<ThreadPool>,
}

/// Counters describing the work done by an [IndexedTree].
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// Keys added to the list.
    pub inserted: Counter,
    /// Inserted keys that were already present.
    pub updated: Counter,
    /// Calls to [IndexedTree::batch_insert] that staged changes.
    pub batches: Counter,
    /// Committed leaves, padding included.
    pub leaves: Gauge,
}

impl Metrics {
    /// Register all metrics with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "inserted",
            "Number of keys inserted into the list",
            self.inserted.clone(),
        );
        registry.register(
            "updated",
            "Number of inserted keys that were already present",
            self.updated.clone(),
        );
        registry.register(
            "batches",
            "Number of batch insertions",
            self.batches.clone(),
        );
        registry.register(
            "leaves",
            "Number of committed leaves",
            self.leaves.clone(),
        );
    }
}

/// The result of resolving every input of a call, before anything is staged.
struct Plan<L: IndexedLeaf> {
    pending: Pending<L>,
    witnesses: Vec<Option<LowLeafWitnessData<L>>>,
    inserted: u64,
    updated: u64,
}

/// Implementation of `IndexedTree`.
pub struct IndexedTree<L: IndexedLeaf, H: CHasher> {
    tree: AppendOnlyTree<H>,

    // Committed preimages by slot.
    preimages: Vec<LeafPreimage<L>>,

    // Staged preimages by slot, both rewrites of committed slots and appended ones.
    staged: BTreeMap<u32, LeafPreimage<L>>,

    // The lowest committed slot holding each key.
    keys: BTreeMap<Field, u32>,

    // The lowest staged slot holding each key that was appended since the last commit.
    staged_keys: BTreeMap<Field, u32>,

    metrics: Metrics,
}

impl<L: IndexedLeaf, H: CHasher> IndexedTree<L, H> {
    /// Return a tree holding only the sentinel and `cfg.prefilled - 1` empty slots, all committed.
    pub fn init(hasher: &mut impl Hasher<H>, cfg: Config) -> Result<Self, Error> {
        if cfg.prefilled == 0 {
            return Err(Error::InvalidConfig("prefilled must include the sentinel"));
        }
        let mut tree = AppendOnlyTree::init(
            hasher,
            merkle::Config {
                height: cfg.height,
                leaves: Vec::new(),
                pool: cfg.pool,
            },
        )?;
        tree.ensure_capacity(cfg.prefilled as u64)?;
        tree.append_leaves(hasher, &vec![Field::ZERO; cfg.prefilled as usize])?;
        tree.commit();

        let preimages = vec![LeafPreimage::empty(); cfg.prefilled as usize];
        Ok(Self::from_parts(tree, preimages))
    }

    /// Return a tree holding `preimages` as committed state.
    ///
    /// Fails with [Error::SnapshotMismatch] if the rebuilt tree does not match `snapshot`.
    pub fn restore(
        hasher: &mut impl Hasher<H>,
        cfg: Config,
        preimages: Vec<LeafPreimage<L>>,
        snapshot: Snapshot,
    ) -> Result<Self, Error> {
        match preimages.first() {
            Some(sentinel) if sentinel.key().is_zero() => {}
            _ => return Err(Error::InvalidConfig("slot 0 must hold the sentinel")),
        }
        if preimages.len() < cfg.prefilled as usize {
            return Err(Error::InvalidConfig("fewer preimages than prefilled slots"));
        }

        let leaves = preimages
            .iter()
            .map(|preimage| preimage.digest(hasher))
            .collect();
        let tree = AppendOnlyTree::init(
            hasher,
            merkle::Config {
                height: cfg.height,
                leaves,
                pool: cfg.pool,
            },
        )?;
        let found = tree.snapshot(false);
        if found != snapshot {
            warn!(expected = ?snapshot, ?found, "restored tree does not match snapshot");
            return Err(Error::SnapshotMismatch {
                expected: snapshot,
                found,
            });
        }
        debug!(leaves = preimages.len(), root = ?found.root, "restored tree");

        Ok(Self::from_parts(tree, preimages))
    }

    fn from_parts(tree: AppendOnlyTree<H>, preimages: Vec<LeafPreimage<L>>) -> Self {
        let mut keys = BTreeMap::new();
        for (slot, preimage) in preimages.iter().enumerate() {
            keys.entry(preimage.key()).or_insert(slot as u32);
        }
        let metrics = Metrics::default();
        metrics.leaves.set(preimages.len() as i64);

        Self {
            tree,
            preimages,
            staged: BTreeMap::new(),
            keys,
            staged_keys: BTreeMap::new(),
            metrics,
        }
    }

    pub fn height(&self) -> u8 {
        self.tree.height()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn root(&self, include_uncommitted: bool) -> Field {
        self.tree.root(include_uncommitted)
    }

    /// Return the number of written slots, which is also the next available leaf index.
    pub fn num_leaves(&self, include_uncommitted: bool) -> u32 {
        // Capacity is at most 2^MAX_HEIGHT, so the count fits.
        self.tree.num_leaves(include_uncommitted) as u32
    }

    pub fn snapshot(&self, include_uncommitted: bool) -> Snapshot {
        self.tree.snapshot(include_uncommitted)
    }

    pub fn is_dirty(&self) -> bool {
        self.tree.is_dirty()
    }

    pub fn sibling_path(
        &self,
        index: u32,
        include_uncommitted: bool,
    ) -> Result<SiblingPath, Error> {
        Ok(self.tree.sibling_path(index as u64, include_uncommitted)?)
    }

    /// Return the digest stored at `index`, or `None` if the slot is unwritten.
    pub fn leaf_value(&self, index: u32, include_uncommitted: bool) -> Option<Field> {
        self.tree.leaf_value(index as u64, include_uncommitted)
    }

    /// Return a copy of the preimage at `index`, or `None` if the slot is unwritten.
    pub fn get_latest_leaf_preimage_copy(
        &self,
        index: u32,
        include_uncommitted: bool,
    ) -> Option<LeafPreimage<L>> {
        if include_uncommitted {
            if let Some(preimage) = self.staged.get(&index) {
                return Some(preimage.clone());
            }
        }
        self.preimages.get(index as usize).cloned()
    }

    /// Return the slot of the leaf with the greatest key not above `key`, and whether that key is
    /// equal to `key`.
    ///
    /// When several slots hold the same key (empty slots all share the zero key with the sentinel),
    /// the lowest slot is returned.
    pub fn find_index_of_previous_key(
        &self,
        key: &Field,
        include_uncommitted: bool,
    ) -> Result<(u32, bool), Error> {
        let committed = self.keys.range(..=key).next_back();
        let staged = if include_uncommitted {
            self.staged_keys.range(..=key).next_back()
        } else {
            None
        };

        // Staged slots follow committed ones, so ties go to the committed slot.
        let (found, index) = match (committed, staged) {
            (Some(committed), Some(staged)) => {
                if staged.0 > committed.0 {
                    staged
                } else {
                    committed
                }
            }
            (Some(found), None) | (None, Some(found)) => found,
            (None, None) => return Err(Error::EmptyTree),
        };
        Ok((*index, found == key))
    }

    /// Read the preimage at `index` as seen by a call that has written `pending` so far.
    fn read(
        &self,
        pending: &Pending<L>,
        index: u32,
        include_uncommitted: bool,
    ) -> Result<LeafPreimage<L>, Error> {
        if let Some(preimage) = pending.get(index) {
            return Ok(preimage.clone());
        }
        self.get_latest_leaf_preimage_copy(index, include_uncommitted)
            .ok_or(Error::MissingLeaf(index))
    }

    /// Return the low leaf of `key` among both the tree and the keys inserted so far in the call.
    fn resolve_low_leaf(
        &self,
        pending: &Pending<L>,
        key: &Field,
        include_uncommitted: bool,
    ) -> Result<(u32, bool), Error> {
        let (index, present) = self.find_index_of_previous_key(key, include_uncommitted)?;
        if present {
            return Ok((index, true));
        }
        if let Some((pending_key, slot)) = pending.previous_key(key) {
            let tree_key = self.read(pending, index, include_uncommitted)?.key();
            if pending_key > tree_key {
                return Ok((slot, false));
            }
        }
        Ok((index, false))
    }

    /// Resolve every leaf in input order without staging anything.
    ///
    /// If `capture` is set, the pre-call preimage and sibling path of each low leaf that existed
    /// before the call is recorded at the input's position.
    fn plan(
        &self,
        leaves: &[L],
        include_uncommitted: bool,
        capture: bool,
    ) -> Result<Plan<L>, Error> {
        self.tree.ensure_capacity(leaves.len() as u64)?;

        let mut pending = Pending::new(self.num_leaves(true));
        let mut witnesses = Vec::with_capacity(leaves.len());
        let mut positions = BTreeMap::new();
        let mut inserted = 0;
        let mut updated = 0;
        for (position, leaf) in leaves.iter().enumerate() {
            if *leaf == L::empty() {
                pending.push(LeafPreimage::empty());
                witnesses.push(None);
                continue;
            }
            let key = leaf.key();
            if key.is_zero() {
                return Err(Error::ZeroKey(position));
            }
            if let Some(first) = positions.insert(key, position) {
                return Err(Error::DuplicateKey {
                    key,
                    first,
                    second: position,
                });
            }

            let (low_index, present) = self.resolve_low_leaf(&pending, &key, include_uncommitted)?;
            let low = self.read(&pending, low_index, include_uncommitted)?;
            if present {
                let merged = LeafPreimage::new(low.leaf.update(leaf), low.next_key, low.next_index);
                pending.set(low_index, merged);
                pending.push(LeafPreimage::empty());
                witnesses.push(None);
                updated += 1;
                continue;
            }

            let witness = if capture && !pending.is_new(low_index) {
                let leaf_preimage = self
                    .get_latest_leaf_preimage_copy(low_index, include_uncommitted)
                    .ok_or(Error::MissingLeaf(low_index))?;
                let sibling_path = self.tree.sibling_path(low_index as u64, include_uncommitted)?;
                Some(LowLeafWitnessData {
                    leaf_preimage,
                    sibling_path,
                    index: low_index,
                })
            } else {
                None
            };
            witnesses.push(witness);

            let slot = pending.next_slot();
            pending.set(low_index, LeafPreimage::new(low.leaf.clone(), key, slot));
            pending.push(LeafPreimage::new(leaf.clone(), low.next_key, low.next_index));
            inserted += 1;
        }

        Ok(Plan {
            pending,
            witnesses,
            inserted,
            updated,
        })
    }

    /// Stage rewrites of existing slots in a single update.
    fn stage_rewrites(
        &mut self,
        hasher: &mut impl Hasher<H>,
        rewrites: BTreeMap<u32, LeafPreimage<L>>,
    ) -> Result<(), Error> {
        let updates: Vec<(u64, Field)> = rewrites
            .iter()
            .map(|(index, preimage)| (*index as u64, preimage.digest(hasher)))
            .collect();
        self.tree.update_leaves(hasher, &updates)?;
        self.staged.extend(rewrites);
        Ok(())
    }

    /// Stage `appended` into consecutive slots from `start` in a single append.
    fn stage_appends(
        &mut self,
        hasher: &mut impl Hasher<H>,
        start: u32,
        appended: Vec<LeafPreimage<L>>,
    ) -> Result<(), Error> {
        let digests: Vec<Field> = appended
            .iter()
            .map(|preimage| preimage.digest(hasher))
            .collect();
        self.tree.append_leaves(hasher, &digests)?;
        for (offset, preimage) in appended.into_iter().enumerate() {
            let slot = start + offset as u32;
            if !preimage.is_empty() {
                self.staged_keys.entry(preimage.key()).or_insert(slot);
            }
            self.staged.insert(slot, preimage);
        }
        Ok(())
    }

    /// Insert `2^subtree_height` leaves and return the witnesses needed to prove the insertion.
    ///
    /// Leaves are resolved in input order, so a leaf may use one inserted earlier in the same call
    /// as its low leaf. Leaves whose key is already present update the existing leaf and leave
    /// their own slot empty, as do empty leaves.
    ///
    /// The next available slot must be a multiple of `2^subtree_height` so that the new leaves
    /// form a single subtree. Nothing is staged if an error is returned. The tree must have no
    /// staged changes unless `include_uncommitted` is set.
    pub fn batch_insert(
        &mut self,
        hasher: &mut impl Hasher<H>,
        leaves: &[L],
        subtree_height: u8,
        include_uncommitted: bool,
    ) -> Result<BatchInsertionResult<L>, Error> {
        if subtree_height > self.height() || leaves.len() != 1usize << subtree_height {
            return Err(Error::InvalidBatchShape {
                leaves: leaves.len(),
                subtree_height,
            });
        }
        if !include_uncommitted && self.is_dirty() {
            return Err(Error::UncommittedChanges);
        }
        let start = self.num_leaves(true);
        if start % (1u32 << subtree_height) != 0 {
            return Err(Error::MisalignedBatch {
                start,
                subtree_height,
            });
        }

        let Plan {
            pending,
            witnesses,
            inserted,
            updated,
        } = self.plan(leaves, include_uncommitted, true)?;
        let (_, rewrites, appended) = pending.into_parts();
        self.stage_rewrites(hasher, rewrites)?;
        let new_subtree_sibling_path = self.tree.subtree_sibling_path(subtree_height, true)?;
        self.stage_appends(hasher, start, appended)?;

        let mut order: Vec<usize> = (0..leaves.len()).collect();
        order.sort_by_key(|position| Reverse(leaves[*position].key()));
        let sorted_new_leaves = order
            .iter()
            .map(|position| leaves[*position].encode().freeze())
            .collect();
        let sorted_new_leaves_indexes = order.into_iter().map(|position| position as u32).collect();

        self.metrics.inserted.inc_by(inserted);
        self.metrics.updated.inc_by(updated);
        self.metrics.batches.inc();
        debug!(start, subtree_height, inserted, updated, "staged batch insertion");

        Ok(BatchInsertionResult {
            low_leaves_witness_data: witnesses,
            new_subtree_sibling_path,
            sorted_new_leaves,
            sorted_new_leaves_indexes,
        })
    }

    /// Insert `leaves` one after another without producing witnesses.
    ///
    /// Any number of leaves may be appended. Otherwise this behaves like
    /// [IndexedTree::batch_insert] with staged changes included.
    pub fn append_leaves(
        &mut self,
        hasher: &mut impl Hasher<H>,
        leaves: &[L],
    ) -> Result<(), Error> {
        if leaves.is_empty() {
            return Ok(());
        }
        let Plan {
            pending,
            inserted,
            updated,
            ..
        } = self.plan(leaves, true, false)?;
        let (start, rewrites, appended) = pending.into_parts();
        self.stage_rewrites(hasher, rewrites)?;
        self.stage_appends(hasher, start, appended)?;

        self.metrics.inserted.inc_by(inserted);
        self.metrics.updated.inc_by(updated);
        debug!(start, inserted, updated, "staged appended leaves");
        Ok(())
    }

    /// Merge staged changes into the committed state and return the new snapshot.
    pub fn commit(&mut self) -> Snapshot {
        let snapshot = self.tree.commit();
        for (slot, preimage) in std::mem::take(&mut self.staged) {
            let slot = slot as usize;
            if slot < self.preimages.len() {
                self.preimages[slot] = preimage;
            } else {
                self.preimages.push(preimage);
            }
        }
        for (key, slot) in std::mem::take(&mut self.staged_keys) {
            self.keys.entry(key).or_insert(slot);
        }
        self.metrics.leaves.set(self.preimages.len() as i64);
        snapshot
    }

    /// Discard all staged changes.
    pub fn rollback(&mut self) {
        self.tree.rollback();
        self.staged.clear();
        self.staged_keys.clear();
        debug!(leaves = self.preimages.len(), "rolled back staged changes");
    }
}
