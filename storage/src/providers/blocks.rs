//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use serde::{Deserialize, Serialize};
use tari_weave_common_types::{BlockHeight, ContextHash};

use crate::{
    error::StorageError,
    kv::{KvBackend, ScanOptions, WriteOp},
    models::BlockNode,
    providers::{from_json, table_key, table_prefix, to_json},
};

const TABLE_BLOCKS: &str = "blocks";
const TABLE_BLOCKS_BY_HEIGHT: &str = "blocks-height";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub block: BlockNode,
    /// Hashes of the slices this block contains, in execution order.
    pub slices: Vec<ContextHash>,
}

/// Persists block metadata in its sibling table, with a by-height index for
/// range queries.
#[derive(Debug, Clone)]
pub struct BlockProvider<TKv> {
    backend: TKv,
}

impl<TKv: KvBackend> BlockProvider<TKv> {
    pub fn new(backend: TKv) -> Self {
        Self { backend }
    }

    pub fn save_block(&self, chain: &str, info: &BlockInfo) -> Result<(), StorageError> {
        let hash = info.block.hash().as_str();
        let height = padded_height(info.block.height());
        self.backend.write_batch(vec![
            WriteOp::put(table_key(TABLE_BLOCKS, &[chain, hash]), to_json("block info", info)?),
            WriteOp::put(table_key(TABLE_BLOCKS_BY_HEIGHT, &[chain, &height, hash]), hash),
        ])
    }

    pub fn get_block(&self, chain: &str, hash: &ContextHash) -> Result<BlockInfo, StorageError> {
        let Some(bytes) = self.backend.get(&table_key(TABLE_BLOCKS, &[chain, hash.as_str()]))? else {
            return Err(StorageError::NotFound {
                kind: "block info",
                key: hash.as_str().to_string(),
            });
        };
        from_json("block info", &bytes)
    }

    pub fn get_blocks_at_height(&self, chain: &str, height: BlockHeight) -> Result<Vec<BlockInfo>, StorageError> {
        let prefix = table_prefix(TABLE_BLOCKS_BY_HEIGHT, &[chain, &padded_height(height)]);
        let entries = self.backend.scan_prefix(&prefix, ScanOptions::default())?;
        entries
            .into_iter()
            .map(|entry| {
                let hash = String::from_utf8(entry.value).map_err(|_| StorageError::CorruptRecord {
                    kind: "block height index",
                    details: "hash is not utf-8".to_string(),
                })?;
                let hash = ContextHash::parse(&hash).map_err(|err| StorageError::CorruptRecord {
                    kind: "block height index",
                    details: err.to_string(),
                })?;
                self.get_block(chain, &hash)
            })
            .collect()
    }

    pub fn count_blocks(&self, chain: &str) -> Result<usize, StorageError> {
        self.backend.count_prefix(&table_prefix(TABLE_BLOCKS, &[chain]))
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
    fn save_and_load_round() {
        let provider = BlockProvider::new(MemoryKvBackend::new());
        let info = BlockInfo {
            block: BlockNode::new(hash(2), BlockHeight(2), hash(1)),
            slices: vec![hash(10), hash(11)],
        };
        provider.save_block("main", &info).unwrap();

        assert_eq!(provider.get_block("main", &hash(2)).unwrap(), info);
        assert!(provider.get_block("main", &hash(3)).optional().unwrap().is_none());
        assert_eq!(provider.count_blocks("main").unwrap(), 1);
    }

    #[test]
    fn height_index_finds_forks() {
        let provider = BlockProvider::new(MemoryKvBackend::new());
        for seed in [2u8, 3] {
            provider
                .save_block("main", &BlockInfo {
                    block: BlockNode::new(hash(seed), BlockHeight(2), hash(1)),
                    slices: vec![],
                })
                .unwrap();
        }
        provider
            .save_block("main", &BlockInfo {
                block: BlockNode::new(hash(4), BlockHeight(12), hash(3)),
                slices: vec![],
            })
            .unwrap();

        let at_two = provider.get_blocks_at_height("main", BlockHeight(2)).unwrap();
        assert_eq!(at_two.len(), 2);
        // Padded keys keep numeric order: height 12 does not shadow height 2
        let at_twelve = provider.get_blocks_at_height("main", BlockHeight(12)).unwrap();
        assert_eq!(at_twelve.len(), 1);
        assert_eq!(at_twelve[0].block.hash(), &hash(4));
    }
}
