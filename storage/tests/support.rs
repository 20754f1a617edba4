//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::sync::{Arc, RwLock};

use tari_weave_common_types::{optional::Optional, BlockHeight, ContextHash};
use tari_weave_storage::{
    kv::{memory::MemoryKvBackend, KvBackend, KvEntry, ScanOptions},
    models::{BlockNode, SliceNode},
    BlockTree,
    EnvContext,
    EnvStore,
};

pub const CHAIN: &str = "testnet";

pub fn hash(seed: u8) -> ContextHash {
    ContextHash::from_hash_bytes([seed; 32])
}

pub struct EnvTester {
    pub store: EnvStore<MemoryKvBackend>,
    pub tree: Arc<RwLock<BlockTree>>,
}

impl EnvTester {
    pub fn new() -> Self {
        Self {
            store: EnvStore::new(MemoryKvBackend::new()),
            tree: Arc::new(RwLock::new(BlockTree::new(CHAIN))),
        }
    }

    /// Blocks `b0..b{count-1}` linearly linked from the zero hash, all mined,
    /// with `hash(i)` naming block `b{i}`.
    pub fn with_linear_blocks(count: u8) -> Self {
        let tester = Self::new();
        {
            let mut tree = tester.tree.write().unwrap();
            tree.set_new_zero_block(BlockNode::genesis(hash(0))).unwrap();
            for seed in 1..count {
                tree.add_block(BlockNode::new(hash(seed), BlockHeight(seed as u64), hash(seed - 1)))
                    .unwrap();
            }
            for seed in 0..count {
                tree.set_mined_block(&hash(seed)).unwrap();
            }
        }
        tester
    }

    pub fn add_block(&self, seed: u8, height: u64, parent_seed: u8) {
        self.tree
            .write()
            .unwrap()
            .add_block(BlockNode::new(hash(seed), BlockHeight(height), hash(parent_seed)))
            .unwrap();
    }

    pub fn add_slice(&self, seed: u8, producer: &str, height: u64, block_height: u64, count: u64, is_end: bool) {
        self.tree
            .write()
            .unwrap()
            .add_slice(SliceNode::new(
                hash(seed),
                producer,
                height,
                BlockHeight(block_height),
                count,
                is_end,
            ))
            .unwrap();
    }

    pub fn mine(&self, seed: u8) {
        self.tree.write().unwrap().set_mined_block(&hash(seed)).unwrap();
    }

    pub fn context_at(&self, from: ContextHash) -> EnvContext<MemoryKvBackend> {
        let block_height = self
            .tree
            .read()
            .unwrap()
            .get_block(&from)
            .map(|block| block.height())
            .unwrap_or_default();
        EnvContext::new(self.store.clone(), self.tree.clone(), CHAIN, block_height, from)
    }

    /// Opens a context at `hash(seed)`, stages `key = value`, commits, pushes
    /// to the same hash and disposes. The common "execute then persist"
    /// sequence of the callers.
    pub fn push_value(&self, seed: u8, key: &str, value: &str) {
        let mut ctx = self.context_at(hash(seed));
        ctx.set(key, value);
        ctx.commit();
        ctx.push(&hash(seed)).unwrap();
        ctx.dispose();
    }

    pub fn push_delete(&self, seed: u8, key: &str) {
        let mut ctx = self.context_at(hash(seed));
        ctx.delete(key);
        ctx.commit();
        ctx.push(&hash(seed)).unwrap();
        ctx.dispose();
    }

    /// Look-through read resolved from `hash(seed)`; absent and deleted read
    /// as the empty string.
    pub fn get_slow(&self, seed: u8, key: &str) -> String {
        let tree = self.tree.read().unwrap();
        self.store
            .get_slow(&tree, CHAIN, key, &hash(seed))
            .unwrap()
            .map(|record| record.value.as_str().to_string())
            .unwrap_or_default()
    }

    pub fn has_slow(&self, seed: u8, key: &str) -> bool {
        let tree = self.tree.read().unwrap();
        self.store.has_slow(&tree, CHAIN, key, &hash(seed)).unwrap()
    }

    pub fn consolidate(&self, target: &ContextHash) {
        let tree = self.tree.read().unwrap();
        self.store.consolidate(&tree, CHAIN, target).unwrap();
    }

    pub fn main_context_value(&self, key: &str) -> String {
        self.store
            .get_main_context(CHAIN, key)
            .optional()
            .unwrap()
            .map(|record| record.value.as_str().to_string())
            .unwrap_or_default()
    }

    /// Every key-value pair in the backend, for byte-equality assertions.
    pub fn dump(&self) -> Vec<KvEntry> {
        self.store.backend().scan_prefix(b"", ScanOptions::default()).unwrap()
    }
}
