//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use serde::{Deserialize, Serialize};
use tari_weave_common_types::{BlockHeight, ContextHash};

use crate::{
    error::StorageError,
    kv::{KvBackend, ScanOptions, WriteOp},
    models::SliceNode,
    providers::{from_json, table_key, table_prefix, to_json},
};

const TABLE_SLICES: &str = "slices";
const TABLE_SLICES_BY_BLOCK_HEIGHT: &str = "slices-height";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceInfo {
    pub slice: SliceNode,
    /// Hashes of the transactions batched in this slice.
    pub transactions: Vec<ContextHash>,
}

/// Persists slice metadata in its sibling table, indexed by target block
/// height so sync can fetch everything competing for one interval.
#[derive(Debug, Clone)]
pub struct SliceProvider<TKv> {
    backend: TKv,
}

impl<TKv: KvBackend> SliceProvider<TKv> {
    pub fn new(backend: TKv) -> Self {
        Self { backend }
    }

    pub fn save_slice(&self, chain: &str, info: &SliceInfo) -> Result<(), StorageError> {
        let hash = info.slice.hash().as_str();
        let block_height = padded_height(info.slice.block_height());
        self.backend.write_batch(vec![
            WriteOp::put(table_key(TABLE_SLICES, &[chain, hash]), to_json("slice info", info)?),
            WriteOp::put(
                table_key(TABLE_SLICES_BY_BLOCK_HEIGHT, &[chain, &block_height, hash]),
                hash,
            ),
        ])
    }

    pub fn get_slice(&self, chain: &str, hash: &ContextHash) -> Result<SliceInfo, StorageError> {
        let Some(bytes) = self.backend.get(&table_key(TABLE_SLICES, &[chain, hash.as_str()]))? else {
            return Err(StorageError::NotFound {
                kind: "slice info",
                key: hash.as_str().to_string(),
            });
        };
        from_json("slice info", &bytes)
    }

    pub fn get_slices_at_block_height(
        &self,
        chain: &str,
        block_height: BlockHeight,
    ) -> Result<Vec<SliceInfo>, StorageError> {
        let prefix = table_prefix(TABLE_SLICES_BY_BLOCK_HEIGHT, &[chain, &padded_height(block_height)]);
        let entries = self.backend.scan_prefix(&prefix, ScanOptions::default())?;
        entries
            .into_iter()
            .map(|entry| {
                let hash = String::from_utf8(entry.value).map_err(|_| StorageError::CorruptRecord {
                    kind: "slice height index",
                    details: "hash is not utf-8".to_string(),
                })?;
                let hash = ContextHash::parse(&hash).map_err(|err| StorageError::CorruptRecord {
                    kind: "slice height index",
                    details: err.to_string(),
                })?;
                self.get_slice(chain, &hash)
            })
            .collect()
    }

    pub fn count_slices(&self, chain: &str) -> Result<usize, StorageError> {
        self.backend.count_prefix(&table_prefix(TABLE_SLICES, &[chain]))
    }
}

fn padded_height(height: BlockHeight) -> String {
    format!("{:020}", height.as_u64())
}

#[cfg(test)]
mod tests {
    use tari_weave_common_types::optional::Optional;

    use super::*;
    use crate::kv::memory::MemoryKvBackend;

    fn hash(seed: u8) -> ContextHash {
        ContextHash::from_hash_bytes([seed; 32])
    }

    #[test]
    fn slices_are_indexed_by_block_height() {
        let provider = SliceProvider::new(MemoryKvBackend::new());
        let info = SliceInfo {
            slice: SliceNode::new(hash(10), "alice", 0, BlockHeight(3), 2, false),
            transactions: vec![hash(70), hash(71)],
        };
        provider.save_slice("main", &info).unwrap();

        assert_eq!(provider.get_slice("main", &hash(10)).unwrap(), info);
        assert!(provider.get_slice("main", &hash(11)).optional().unwrap().is_none());
        let found = provider.get_slices_at_block_height("main", BlockHeight(3)).unwrap();
        assert_eq!(found, vec![info]);
        assert!(provider
            .get_slices_at_block_height("main", BlockHeight(4))
            .unwrap()
            .is_empty());
    }
}
