//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use serde::{Deserialize, Serialize};
use tari_weave_common_types::ContextHash;

use crate::{
    error::StorageError,
    kv::{KvBackend, ScanOptions, WriteOp},
    providers::{from_json, table_key, table_prefix, to_json},
};

const TABLE_TXS: &str = "txs";
const TABLE_TXS_MEMPOOL: &str = "txs-mempool";

/// Wall-clock window after which a transaction still sitting in the mempool
/// is considered stale and may be failed by the sweeper.
pub const MEMPOOL_TX_TIMEOUT_SECS: u64 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Mempool,
    Included,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfo {
    pub hash: ContextHash,
    pub status: TxStatus,
    /// UNIX seconds at admission.
    pub created_at: u64,
    /// Opaque signed transaction payload, owned by the execution layer.
    pub payload: String,
}

impl TxInfo {
    pub fn new(hash: ContextHash, payload: impl Into<String>, created_at: u64) -> Self {
        Self {
            hash,
            status: TxStatus::Mempool,
            created_at,
            payload: payload.into(),
        }
    }

    pub fn is_stale(&self, now: u64) -> bool {
        self.status == TxStatus::Mempool && now.saturating_sub(self.created_at) > MEMPOOL_TX_TIMEOUT_SECS
    }
}

/// Persists transactions in their sibling table. Mempool membership is a
/// separate index maintained alongside status changes, so the sweeper and
/// minting never scan the full table.
#[derive(Debug, Clone)]
pub struct TransactionProvider<TKv> {
    backend: TKv,
}

impl<TKv: KvBackend> TransactionProvider<TKv> {
    pub fn new(backend: TKv) -> Self {
        Self { backend }
    }

    pub fn save_transaction(&self, chain: &str, info: &TxInfo) -> Result<(), StorageError> {
        let hash = info.hash.as_str();
        let mut ops = vec![WriteOp::put(
            table_key(TABLE_TXS, &[chain, hash]),
            to_json("tx info", info)?,
        )];
        let mempool_key = table_key(TABLE_TXS_MEMPOOL, &[chain, hash]);
        if info.status == TxStatus::Mempool {
            ops.push(WriteOp::put(mempool_key, hash));
        } else {
            ops.push(WriteOp::delete(mempool_key));
        }
        self.backend.write_batch(ops)
    }

    pub fn get_transaction(&self, chain: &str, hash: &ContextHash) -> Result<TxInfo, StorageError> {
        let Some(bytes) = self.backend.get(&table_key(TABLE_TXS, &[chain, hash.as_str()]))? else {
            return Err(StorageError::NotFound {
                kind: "tx info",
                key: hash.as_str().to_string(),
            });
        };
        from_json("tx info", &bytes)
    }

    pub fn set_status(&self, chain: &str, hash: &ContextHash, status: TxStatus) -> Result<(), StorageError> {
        let mut info = self.get_transaction(chain, hash)?;
        info.status = status;
        self.save_transaction(chain, &info)
    }

    pub fn mempool(&self, chain: &str) -> Result<Vec<TxInfo>, StorageError> {
        let prefix = table_prefix(TABLE_TXS_MEMPOOL, &[chain]);
        let entries = self.backend.scan_prefix(&prefix, ScanOptions::default())?;
        entries
            .into_iter()
            .map(|entry| {
                let hash = String::from_utf8(entry.value).map_err(|_| StorageError::CorruptRecord {
                    kind: "mempool index",
                    details: "hash is not utf-8".to_string(),
                })?;
                let hash = ContextHash::parse(&hash).map_err(|err| StorageError::CorruptRecord {
                    kind: "mempool index",
                    details: err.to_string(),
                })?;
                self.get_transaction(chain, &hash)
            })
            .collect()
    }

    pub fn count_transactions(&self, chain: &str) -> Result<usize, StorageError> {
        self.backend.count_prefix(&table_prefix(TABLE_TXS, &[chain]))
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::OsRng, RngCore};

    use super::*;
    use crate::kv::memory::MemoryKvBackend;

    fn random_hash() -> ContextHash {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        ContextHash::from_hash_bytes(bytes)
    }

    #[test]
    fn mempool_index_follows_status() {
        let provider = TransactionProvider::new(MemoryKvBackend::new());
        let tx = TxInfo::new(random_hash(), "{}", 1_000);
        provider.save_transaction("main", &tx).unwrap();
        assert_eq!(provider.mempool("main").unwrap().len(), 1);

        provider.set_status("main", &tx.hash, TxStatus::Included).unwrap();
        assert!(provider.mempool("main").unwrap().is_empty());
        assert_eq!(
            provider.get_transaction("main", &tx.hash).unwrap().status,
            TxStatus::Included
        );
        assert_eq!(provider.count_transactions("main").unwrap(), 1);
    }

    #[test]
    fn staleness_window_applies_to_mempool_only() {
        let tx = TxInfo::new(random_hash(), "{}", 1_000);
        assert!(!tx.is_stale(1_000 + MEMPOOL_TX_TIMEOUT_SECS));
        assert!(tx.is_stale(1_001 + MEMPOOL_TX_TIMEOUT_SECS));

        let mut confirmed = tx;
        confirmed.status = TxStatus::Confirmed;
        assert!(!confirmed.is_stale(u64::MAX));
    }
}
