//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::collections::HashMap;

use indexmap::IndexMap;
use log::*;
use tari_weave_common_types::{optional::Optional, ContextHash};

use crate::{
    block_tree::BlockTree,
    error::StorageError,
    kv::{KvBackend, KvEntry, ScanOptions, WriteOp},
    models::{EnvRecord, EnvValue},
};

const LOG_TARGET: &str = "tari::weave::storage::env_store";

/// Page size for bulk merge/clear operations.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Key of the record (in the main-context bucket) holding the hash the main
/// context was last consolidated to.
pub const LAST_CONSOLIDATED_KEY: &str = "config-last_hash";

const TABLE_PRIMARY: &str = "env";
const TABLE_BY_KEY: &str = "env-key";
const TABLE_BY_HASH: &str = "env-hash";
const SEPARATOR: char = '|';

/// Durable backing of `(chain, key, context hash) -> value`.
///
/// Every record is mirrored into three indices so that point lookups, "all
/// hashes of a key" and "all keys of a hash" are each a single prefix scan:
///
/// - `env|chain|hash|key`
/// - `env-key|chain|key|hash`
/// - `env-hash|chain|hash|key`
///
/// Writes touch all three atomically. Chain names and keys must not contain
/// the `|` separator.
#[derive(Debug, Clone, Default)]
pub struct EnvStore<TKv> {
    backend: TKv,
}

impl<TKv: KvBackend> EnvStore<TKv> {
    pub fn new(backend: TKv) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &TKv {
        &self.backend
    }

    pub fn save(&self, record: &EnvRecord) -> Result<(), StorageError> {
        self.save_many(std::slice::from_ref(record))
    }

    /// Persists records across all three indices in one atomic batch.
    pub fn save_many(&self, records: &[EnvRecord]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut ops = Vec::with_capacity(records.len() * 3);
        for record in records {
            let value = encode_value(&record.value)?;
            for key in record_keys(record)? {
                ops.push(WriteOp::put(key, value.clone()));
            }
        }
        trace!(target: LOG_TARGET, "Saving {} record(s)", records.len());
        self.backend.write_batch(ops)
    }

    pub fn del(&self, chain: &str, key: &str, hash: &ContextHash) -> Result<(), StorageError> {
        let record = EnvRecord::tombstone(chain, key, hash.clone());
        let ops = record_keys(&record)?.into_iter().map(WriteOp::delete).collect();
        self.backend.write_batch(ops)
    }

    /// Deletes up to `limit` records stored under `hash`, returning how many
    /// were removed. Callers loop until this returns 0.
    pub fn del_many(&self, chain: &str, hash: &ContextHash, limit: usize) -> Result<usize, StorageError> {
        let records = self.find_by_chain_and_hash(chain, hash, ScanOptions::limited(limit))?;
        if records.is_empty() {
            return Ok(0);
        }
        let mut ops = Vec::with_capacity(records.len() * 3);
        for record in &records {
            for key in record_keys(record)? {
                ops.push(WriteOp::delete(key));
            }
        }
        self.backend.write_batch(ops)?;
        Ok(records.len())
    }

    /// Point lookup of the record written under exactly `hash`, no ancestor
    /// resolution. Fails with `NotFound` when nothing was written there; call
    /// sites that expect absence use `.optional()`.
    pub fn get(&self, chain: &str, key: &str, hash: &ContextHash) -> Result<EnvRecord, StorageError> {
        let primary = compose_key(TABLE_PRIMARY, &[chain, hash.as_str(), key])?;
        let Some(bytes) = self.backend.get(&primary)? else {
            return Err(StorageError::NotFound {
                kind: "env record",
                key: format!("{chain}|{key}@{hash}"),
            });
        };
        Ok(EnvRecord::new(chain, key, hash.clone(), decode_value(&bytes)?))
    }

    /// Fast path for the flat consolidated view.
    pub fn get_main_context(&self, chain: &str, key: &str) -> Result<EnvRecord, StorageError> {
        self.get(chain, key, &ContextHash::main_context())
    }

    /// All records of `(chain, key)`, one per context hash.
    pub fn find_by_chain_and_key(&self, chain: &str, key: &str) -> Result<Vec<EnvRecord>, StorageError> {
        let prefix = compose_prefix(TABLE_BY_KEY, &[chain, key])?;
        let entries = self.backend.scan_prefix(&prefix, ScanOptions::default())?;
        entries
            .into_iter()
            .map(|entry| {
                let hash = ContextHash::parse(suffix_of(&entry, prefix.len())?)
                    .map_err(|err| corrupt_key(&entry, &err.to_string()))?;
                Ok(EnvRecord::new(chain, key, hash, decode_value(&entry.value)?))
            })
            .collect()
    }

    /// All records stored under `hash`, in key order.
    pub fn find_by_chain_and_hash(
        &self,
        chain: &str,
        hash: &ContextHash,
        options: ScanOptions,
    ) -> Result<Vec<EnvRecord>, StorageError> {
        let prefix = compose_prefix(TABLE_BY_HASH, &[chain, hash.as_str()])?;
        let entries = self.backend.scan_prefix(&prefix, options)?;
        entries
            .into_iter()
            .map(|entry| {
                let key = suffix_of(&entry, prefix.len())?.to_string();
                Ok(EnvRecord::new(chain, key, hash.clone(), decode_value(&entry.value)?))
            })
            .collect()
    }

    pub fn count_by_chain_and_hash(&self, chain: &str, hash: &ContextHash) -> Result<usize, StorageError> {
        let prefix = compose_prefix(TABLE_BY_HASH, &[chain, hash.as_str()])?;
        self.backend.count_prefix(&prefix)
    }

    /// Look-through read: the record for `key` nearest to `from` along the
    /// ancestor chain, with the zero-hash record as the final fallback.
    /// Tombstones are returned as records; callers decide how deletion reads.
    pub fn get_slow(
        &self,
        tree: &BlockTree,
        chain: &str,
        key: &str,
        from: &ContextHash,
    ) -> Result<Option<EnvRecord>, StorageError> {
        if from.is_main_context() {
            return self.get_main_context(chain, key).optional();
        }
        let records = self.find_by_chain_and_key(chain, key)?;
        if records.is_empty() {
            return Ok(None);
        }
        let by_hash: HashMap<&ContextHash, &EnvRecord> =
            records.iter().map(|record| (&record.hash, record)).collect();

        let mut current = from.clone();
        loop {
            if let Some(record) = by_hash.get(&current) {
                return Ok(Some((*record).clone()));
            }
            if current.is_zero() {
                return Ok(None);
            }
            current = tree.get_last_hash(&current)?;
        }
    }

    pub fn has_slow(
        &self,
        tree: &BlockTree,
        chain: &str,
        key: &str,
        from: &ContextHash,
    ) -> Result<bool, StorageError> {
        Ok(self
            .get_slow(tree, chain, key, from)?
            .is_some_and(|record| !record.value.is_tombstone()))
    }

    /// Look-through enumeration: all keys starting with `prefix + "-"`, each
    /// resolved to its record nearest to `from`. Keys whose nearest record is
    /// a tombstone are omitted; a deleted key must not reappear in listings.
    pub fn get_slow_list(
        &self,
        tree: &BlockTree,
        chain: &str,
        prefix: &str,
        from: &ContextHash,
    ) -> Result<Vec<EnvRecord>, StorageError> {
        let ancestors = if from.is_main_context() {
            vec![ContextHash::main_context()]
        } else {
            let mut list = tree.get_block_list(from)?;
            list.reverse();
            list
        };
        let depth_of: HashMap<&ContextHash, usize> =
            ancestors.iter().enumerate().map(|(depth, hash)| (hash, depth)).collect();

        let scan_prefix = compose_prefix_open(TABLE_BY_KEY, chain, &format!("{prefix}-"))?;
        let entries = self.backend.scan_prefix(&scan_prefix, ScanOptions::default())?;

        let base = compose_prefix(TABLE_BY_KEY, &[chain])?;
        let mut nearest: IndexMap<String, (usize, EnvRecord)> = IndexMap::new();
        for entry in entries {
            let remainder = suffix_of(&entry, base.len())?;
            let Some((key, hash_str)) = remainder.rsplit_once(SEPARATOR) else {
                return Err(corrupt_key(&entry, "missing separator"));
            };
            let hash = ContextHash::parse(hash_str).map_err(|err| corrupt_key(&entry, &err.to_string()))?;
            let Some(&depth) = depth_of.get(&hash) else {
                // Written on another fork; invisible from this context
                continue;
            };
            let nearer = nearest.get(key).map_or(true, |(best_depth, _)| depth < *best_depth);
            if nearer {
                let record = EnvRecord::new(chain, key, hash, decode_value(&entry.value)?);
                nearest.insert(key.to_string(), (depth, record));
            }
        }

        Ok(nearest
            .into_values()
            .map(|(_, record)| record)
            .filter(|record| !record.value.is_tombstone())
            .collect())
    }
}

fn encode_value(value: &EnvValue) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|source| StorageError::Codec {
        kind: "env value",
        source,
    })
}

fn decode_value(bytes: &[u8]) -> Result<EnvValue, StorageError> {
    serde_json::from_slice(bytes).map_err(|source| StorageError::Codec {
        kind: "env value",
        source,
    })
}

fn check_part(part: &str) -> Result<&str, StorageError> {
    if part.contains(SEPARATOR) {
        return Err(StorageError::CorruptRecord {
            kind: "env key",
            details: format!("'{part}' contains the reserved separator"),
        });
    }
    Ok(part)
}

fn compose_key(table: &str, parts: &[&str]) -> Result<Vec<u8>, StorageError> {
    let mut key = String::from(table);
    for part in parts {
        key.push(SEPARATOR);
        key.push_str(check_part(part)?);
    }
    Ok(key.into_bytes())
}

/// A scan prefix covering all entries below `parts`, i.e. terminated with the
/// separator.
fn compose_prefix(table: &str, parts: &[&str]) -> Result<Vec<u8>, StorageError> {
    let mut key = compose_key(table, parts)?;
    key.push(SEPARATOR as u8);
    Ok(key)
}

/// A scan prefix whose final component is itself a prefix (not terminated).
fn compose_prefix_open(table: &str, chain: &str, key_prefix: &str) -> Result<Vec<u8>, StorageError> {
    let mut key = compose_prefix(table, &[chain])?;
    key.extend_from_slice(check_part(key_prefix)?.as_bytes());
    Ok(key)
}

fn record_keys(record: &EnvRecord) -> Result<[Vec<u8>; 3], StorageError> {
    let chain = record.chain.as_str();
    let key = record.key.as_str();
    let hash = record.hash.as_str();
    Ok([
        compose_key(TABLE_PRIMARY, &[chain, hash, key])?,
        compose_key(TABLE_BY_KEY, &[chain, key, hash])?,
        compose_key(TABLE_BY_HASH, &[chain, hash, key])?,
    ])
}

fn suffix_of(entry: &KvEntry, prefix_len: usize) -> Result<&str, StorageError> {
    let suffix = entry
        .key
        .get(prefix_len..)
        .ok_or_else(|| corrupt_key(entry, "shorter than its prefix"))?;
    std::str::from_utf8(suffix).map_err(|_| corrupt_key(entry, "not utf-8"))
}

fn corrupt_key(entry: &KvEntry, details: &str) -> StorageError {
    StorageError::CorruptRecord {
        kind: "env index key",
        details: format!("{}: {details}", String::from_utf8_lossy(&entry.key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKvBackend;

    fn hash(seed: u8) -> ContextHash {
        ContextHash::from_hash_bytes([seed; 32])
    }

    fn store() -> EnvStore<MemoryKvBackend> {
        EnvStore::new(MemoryKvBackend::new())
    }

    #[test]
    fn save_mirrors_all_indices() {
        let store = store();
        let record = EnvRecord::new("main", "v1", hash(1), EnvValue::value("A"));
        store.save(&record).unwrap();

        assert_eq!(store.get("main", "v1", &hash(1)).unwrap(), record);
        assert_eq!(store.find_by_chain_and_key("main", "v1").unwrap(), vec![record.clone()]);
        assert_eq!(
            store
                .find_by_chain_and_hash("main", &hash(1), ScanOptions::default())
                .unwrap(),
            vec![record]
        );

        store.del("main", "v1", &hash(1)).unwrap();
        assert!(store.get("main", "v1", &hash(1)).optional().unwrap().is_none());
        assert!(store.find_by_chain_and_key("main", "v1").unwrap().is_empty());
        assert_eq!(store.count_by_chain_and_hash("main", &hash(1)).unwrap(), 0);
    }

    #[test]
    fn keys_do_not_collide_on_prefixes() {
        let store = store();
        store
            .save_many(&[
                EnvRecord::new("main", "v1", hash(1), EnvValue::value("one")),
                EnvRecord::new("main", "v10", hash(1), EnvValue::value("ten")),
            ])
            .unwrap();
        let records = store.find_by_chain_and_key("main", "v1").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, EnvValue::value("one"));
    }

    #[test]
    fn tombstones_are_stored_not_absent() {
        let store = store();
        store.save(&EnvRecord::tombstone("main", "v1", hash(1))).unwrap();
        let record = store.get("main", "v1", &hash(1)).unwrap();
        assert!(record.value.is_tombstone());
        assert_eq!(record.value.as_str(), "");
    }

    #[test]
    fn del_many_pages_through_a_bucket() {
        let store = store();
        let records: Vec<_> = (0..25)
            .map(|i| EnvRecord::new("main", format!("key-{i:03}"), hash(7), EnvValue::value("x")))
            .collect();
        store.save_many(&records).unwrap();

        let mut total = 0;
        loop {
            let removed = store.del_many("main", &hash(7), 10).unwrap();
            if removed == 0 {
                break;
            }
            assert!(removed <= 10);
            total += removed;
        }
        assert_eq!(total, 25);
        assert_eq!(store.count_by_chain_and_hash("main", &hash(7)).unwrap(), 0);
    }

    #[test]
    fn separator_in_keys_is_refused() {
        let store = store();
        let err = store
            .save(&EnvRecord::new("main", "bad|key", hash(1), EnvValue::value("x")))
            .unwrap_err();
        assert!(matches!(err, StorageError::CorruptRecord { .. }));
    }
}
