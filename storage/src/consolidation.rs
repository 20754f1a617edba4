//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use log::*;
use tari_weave_common_types::{optional::Optional, ContextHash};

use crate::{
    block_tree::BlockTree,
    error::StorageError,
    kv::{KvBackend, ScanOptions},
    models::{EnvRecord, EnvValue},
    store::{EnvStore, LAST_CONSOLIDATED_KEY, MAX_BATCH_SIZE},
};

const LOG_TARGET: &str = "tari::weave::storage::consolidation";

impl<TKv: KvBackend> EnvStore<TKv> {
    /// The hash the main context was last consolidated to; the zero hash for
    /// a fresh store.
    pub fn last_consolidated_hash(&self, chain: &str) -> Result<ContextHash, StorageError> {
        let Some(record) = self.get_main_context(chain, LAST_CONSOLIDATED_KEY).optional()? else {
            return Ok(ContextHash::zero());
        };
        match &record.value {
            EnvValue::Value(value) => ContextHash::parse(value).map_err(|err| StorageError::CorruptRecord {
                kind: "last consolidated hash",
                details: err.to_string(),
            }),
            EnvValue::Tombstone => Ok(ContextHash::zero()),
        }
    }

    /// Advances the flat main-context bucket to equal the look-through view
    /// at `target`.
    ///
    /// Ancestors between the last consolidated hash and `target` are merged
    /// oldest first, so newer writes overwrite older ones exactly as the
    /// ancestor walk would resolve them. If `target` does not descend from
    /// the last consolidated hash (a reorg past it), the bucket is cleared
    /// and replayed from genesis. Consolidating to the zero hash clears the
    /// bucket.
    pub fn consolidate(&self, tree: &BlockTree, chain: &str, target: &ContextHash) -> Result<(), StorageError> {
        let last = self.last_consolidated_hash(chain)?;
        if last == *target {
            debug!(target: LOG_TARGET, "Main context of {chain} already at {target}");
            return Ok(());
        }

        let mut pending = Vec::new();
        let mut current = target.clone();
        loop {
            if current == last {
                break;
            }
            if current.is_zero() {
                info!(target: LOG_TARGET, "Clearing main context of {chain} (reorg past {last})");
                self.clear_main_context(chain)?;
                break;
            }
            pending.push(current.clone());
            current = tree.get_last_hash(&current)?;
        }

        for hash in pending.iter().rev() {
            let merged = self.merge_context(chain, hash, &ContextHash::main_context())?;
            debug!(target: LOG_TARGET, "Consolidated {merged} record(s) of {hash} into main context");
        }

        self.save(&EnvRecord::new(
            chain,
            LAST_CONSOLIDATED_KEY,
            ContextHash::main_context(),
            EnvValue::value(target.as_str()),
        ))?;
        info!(
            target: LOG_TARGET,
            "Main context of {chain} consolidated from {last} to {target} ({} context(s))",
            pending.len()
        );
        Ok(())
    }

    /// Bulk-copies every record stored under `from` to `to`, preserving
    /// tombstones. Idempotent. Returns the number of records copied.
    pub fn merge_context(&self, chain: &str, from: &ContextHash, to: &ContextHash) -> Result<usize, StorageError> {
        let mut offset = 0;
        loop {
            let page = self.find_by_chain_and_hash(chain, from, ScanOptions::page(MAX_BATCH_SIZE, offset))?;
            if page.is_empty() {
                break;
            }
            let fetched = page.len();
            let records: Vec<EnvRecord> = page.into_iter().map(|record| record.with_hash(to.clone())).collect();
            self.save_many(&records)?;
            offset += fetched;
            if fetched < MAX_BATCH_SIZE {
                break;
            }
        }
        Ok(offset)
    }

    /// Deletes the entire main-context bucket in bounded pages.
    pub fn clear_main_context(&self, chain: &str) -> Result<(), StorageError> {
        let main = ContextHash::main_context();
        loop {
            let removed = self.del_many(chain, &main, MAX_BATCH_SIZE)?;
            if removed == 0 {
                return Ok(());
            }
        }
    }
}
