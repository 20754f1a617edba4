//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

//! Fork-aware state environment.
//!
//! State is keyed by `(chain, key, context hash)` where the context hash names
//! a block, a slice, or one of the two sentinels. Reads resolve along the
//! ancestor chain of the block/slice tree ("look-through"); writes are staged
//! in an [`EnvContext`] and pushed to persistence under a target hash.
//! Confirmed contexts are merged into the flat `main_context` bucket by the
//! consolidation engine so that finalized reads are a point lookup.

mod block_tree;
pub use block_tree::{BlockTree, MAX_ANCESTOR_TRIES};

mod consolidation;

mod context;
pub use context::EnvContext;

mod error;
pub use error::StorageError;

pub mod kv;

pub mod models;

pub mod providers;

mod store;
pub use store::{EnvStore, LAST_CONSOLIDATED_KEY, MAX_BATCH_SIZE};
