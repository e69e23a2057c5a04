//! Authenticate rollup state with append-only and indexed Merkle trees.
//!
//! [merkle] provides a fixed-height tree that is only ever appended to. [indexed] layers a sorted
//! linked list over its leaves so that a key's absence can be proven with a single membership
//! witness, and inserts whole batches of keys while producing the witnesses a circuit needs to
//! replay the insertion. [rollup] arranges those witnesses into base rollup inputs.
//!
//! # Status
//!
//! `rollup-storage` is **ALPHA** software and is not yet recommended for production use. Developers
//! should expect breaking changes and occasional instability.

use rayon::{ThreadPool as RThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::Arc;

pub mod indexed;
pub mod merkle;
pub mod rollup;

/// A clone-able [rayon] thread pool shared by trees that parallelize hashing.
pub type ThreadPool = Arc<RThreadPool>;

/// Creates a [ThreadPool] with `concurrency` threads.
///
/// # Returns
/// A `Result` containing the configured pool or a [rayon::ThreadPoolBuildError] if the pool cannot
/// be built.
pub fn create_pool(concurrency: usize) -> Result<ThreadPool, ThreadPoolBuildError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .thread_name(|index| format!("rollup-storage-{index}"))
        .build()?;
    Ok(Arc::new(pool))
}
