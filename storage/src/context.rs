//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::sync::{Arc, RwLock, RwLockReadGuard};

use indexmap::IndexMap;
use log::*;
use tari_weave_common_types::{optional::Optional, BlockHeight, ContextHash};

use crate::{
    block_tree::BlockTree,
    error::StorageError,
    kv::KvBackend,
    models::{EnvRecord, EnvValue},
    store::EnvStore,
};

const LOG_TARGET: &str = "tari::weave::storage::env_context";

/// Transactional overlay for a single unit of execution (one transaction or
/// one simulation sub-scope) reading from `from_context_hash`.
///
/// Reads resolve through four tiers before touching the store (uncommitted
/// writes, committed writes, reads cached this transaction, reads promoted by
/// prior commits), and every store read is cached so a transaction observes
/// stable values. Writes only ever land in the staged tier until `commit`;
/// `push` persists the committed tier under a target hash in one atomic
/// batch.
pub struct EnvContext<TKv> {
    store: EnvStore<TKv>,
    tree: Arc<RwLock<BlockTree>>,
    chain: String,
    block_height: BlockHeight,
    from_context_hash: ContextHash,
    set_stage: IndexMap<String, EnvRecord>,
    set_main: IndexMap<String, EnvRecord>,
    get_stage: IndexMap<String, EnvRecord>,
    get_main: IndexMap<String, EnvRecord>,
    disposed: bool,
}

impl<TKv: KvBackend> EnvContext<TKv> {
    pub fn new(
        store: EnvStore<TKv>,
        tree: Arc<RwLock<BlockTree>>,
        chain: impl Into<String>,
        block_height: BlockHeight,
        from_context_hash: ContextHash,
    ) -> Self {
        Self {
            store,
            tree,
            chain: chain.into(),
            block_height,
            from_context_hash,
            set_stage: IndexMap::new(),
            set_main: IndexMap::new(),
            get_stage: IndexMap::new(),
            get_main: IndexMap::new(),
            disposed: false,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn block_height(&self) -> BlockHeight {
        self.block_height
    }

    pub fn from_context_hash(&self) -> &ContextHash {
        &self.from_context_hash
    }

    /// Number of staged (uncommitted) writes.
    pub fn pending_writes(&self) -> usize {
        self.set_stage.len()
    }

    /// Number of committed, not yet pushed writes.
    pub fn committed_writes(&self) -> usize {
        self.set_main.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// The value of `key` as this context observes it; absent and deleted
    /// keys read as the empty string.
    pub fn get(&mut self, key: &str) -> Result<String, StorageError> {
        let record = self.resolve(key)?;
        Ok(record.value.as_str().to_string())
    }

    pub fn has(&mut self, key: &str) -> Result<bool, StorageError> {
        let record = self.resolve(key)?;
        Ok(!record.value.is_tombstone())
    }

    /// Stages a write. Supersedes any earlier staged write of the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let record = EnvRecord::new(
            self.chain.clone(),
            key.clone(),
            self.from_context_hash.clone(),
            EnvValue::value(value),
        );
        self.set_stage.insert(key, record);
    }

    /// Stages a deletion. The tombstone shadows ancestor values for the rest
    /// of this context's life.
    pub fn delete(&mut self, key: impl Into<String>) {
        let key = key.into();
        let record = EnvRecord::tombstone(self.chain.clone(), key.clone(), self.from_context_hash.clone());
        self.set_stage.insert(key, record);
    }

    /// Promotes staged writes to the committed tier and staged reads to the
    /// promoted read tier. Last writer wins per key across repeated commits.
    /// No I/O.
    pub fn commit(&mut self) {
        for (key, record) in self.set_stage.drain(..) {
            self.set_main.insert(key, record);
        }
        for (key, record) in self.get_stage.drain(..) {
            self.get_main.insert(key, record);
        }
    }

    /// Drops the staged tiers, rolling back the current transaction while
    /// keeping everything committed so far.
    pub fn delete_commit(&mut self) {
        self.set_stage.clear();
        self.get_stage.clear();
    }

    /// Persists the committed tier under `to_context_hash` as one atomic
    /// batch, tombstones included. Fails without writing if any staged write
    /// is pending.
    pub fn push(&mut self, to_context_hash: &ContextHash) -> Result<(), StorageError> {
        if !self.set_stage.is_empty() {
            return Err(StorageError::ContextNotCommitted {
                pending: self.set_stage.len(),
            });
        }
        if self.set_main.is_empty() {
            return Ok(());
        }
        let records: Vec<EnvRecord> = self
            .set_main
            .values()
            .map(|record| record.clone().with_hash(to_context_hash.clone()))
            .collect();
        debug!(
            target: LOG_TARGET,
            "Pushing {} record(s) from context {} to {}",
            records.len(),
            self.from_context_hash,
            to_context_hash
        );
        self.store.save_many(&records)
    }

    /// Releases the context. Idempotent; touches no persistence.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.set_stage.clear();
        self.set_main.clear();
        self.get_stage.clear();
        self.get_main.clear();
        self.disposed = true;
    }

    /// Enumerates keys starting with `prefix + "-"` as this context observes
    /// them: the store's look-through listing overlaid with this context's
    /// committed and staged writes. Deleted keys are omitted.
    pub fn list(&mut self, prefix: &str) -> Result<Vec<(String, String)>, StorageError> {
        let base = {
            let tree = self.tree_read()?;
            self.store
                .get_slow_list(&tree, &self.chain, prefix, &self.from_context_hash)?
        };
        let wanted = format!("{prefix}-");
        let mut resolved: IndexMap<String, EnvValue> = IndexMap::new();
        for record in base {
            resolved.insert(record.key, record.value);
        }
        for record in self.set_main.values().chain(self.set_stage.values()) {
            if record.key.starts_with(&wanted) {
                resolved.insert(record.key.clone(), record.value.clone());
            }
        }
        Ok(resolved
            .into_iter()
            .filter(|(_, value)| !value.is_tombstone())
            .map(|(key, value)| (key, value.as_str().to_string()))
            .collect())
    }

    fn tree_read(&self) -> Result<RwLockReadGuard<'_, BlockTree>, StorageError> {
        self.tree.read().map_err(|_| StorageError::Lock("block tree"))
    }

    /// Four-tier resolution, falling back to the store. The resolved record
    /// is cached into the staged read tier so repeated reads inside one
    /// transaction stay stable; an absent key is cached as a tombstone.
    fn resolve(&mut self, key: &str) -> Result<EnvRecord, StorageError> {
        if let Some(record) = self.set_stage.get(key) {
            return Ok(record.clone());
        }
        if let Some(record) = self.set_main.get(key) {
            return Ok(record.clone());
        }
        if let Some(record) = self.get_stage.get(key) {
            return Ok(record.clone());
        }
        if let Some(record) = self.get_main.get(key) {
            return Ok(record.clone());
        }

        let fetched = if self.from_context_hash.is_main_context() {
            self.store.get_main_context(&self.chain, key).optional()?
        } else {
            let tree = self.tree_read()?;
            self.store
                .get_slow(&tree, &self.chain, key, &self.from_context_hash)?
        };
        let record = fetched
            .unwrap_or_else(|| EnvRecord::tombstone(self.chain.clone(), key, self.from_context_hash.clone()));
        self.get_stage.insert(key.to_string(), record.clone());
        Ok(record)
    }
}

impl<TKv> Drop for EnvContext<TKv> {
    fn drop(&mut self) {
        if !self.disposed && !self.set_stage.is_empty() {
            warn!(
                target: LOG_TARGET,
                "Context at {} dropped with {} staged write(s)",
                self.from_context_hash,
                self.set_stage.len()
            );
        }
    }
}
