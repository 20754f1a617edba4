//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::collections::{BTreeMap, HashMap};

use log::*;
use tari_weave_common_types::{BlockHeight, ContextHash};

use crate::{
    error::StorageError,
    models::{BlockNode, SliceNode},
};

const LOG_TARGET: &str = "tari::weave::storage::block_tree";

/// Upper bound on ancestor-fetch retries before a caller gives up on a block
/// or slice permanently. A tunable, not a protocol constant.
pub const MAX_ANCESTOR_TRIES: u32 = 100;

/// In-memory index of known blocks and slices for one chain.
///
/// Children reference parents by hash; there are no cycles because a parent
/// must already be present when its child is inserted. The tree also tracks
/// the mined representative per height, which anchors height-0 slices during
/// ancestor walks.
#[derive(Debug, Clone, Default)]
pub struct BlockTree {
    chain: String,
    blocks: HashMap<ContextHash, BlockNode>,
    slices: HashMap<ContextHash, SliceNode>,
    /// Slice hashes per target block height, in insertion order. Insertion
    /// order breaks transaction-count ties.
    slices_by_block_height: BTreeMap<u64, Vec<ContextHash>>,
    mined_by_height: HashMap<u64, ContextHash>,
    current_mined: Option<ContextHash>,
    zero_block: Option<ContextHash>,
    best_slice: Option<SliceNode>,
    tries: HashMap<ContextHash, u32>,
}

impl BlockTree {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            ..Default::default()
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Installs the genesis block. Fails with `DuplicateGenesis` if a
    /// different zero block is already set; the chain identity is fixed by
    /// its genesis.
    pub fn set_new_zero_block(&mut self, block: BlockNode) -> Result<(), StorageError> {
        if !block.last_context_hash().is_zero() {
            return Err(StorageError::InvalidParent {
                hash: block.hash().clone(),
                parent: block.last_context_hash().clone(),
            });
        }
        if let Some(existing) = &self.zero_block {
            if existing != block.hash() {
                return Err(StorageError::DuplicateGenesis {
                    existing: existing.clone(),
                    candidate: block.hash().clone(),
                });
            }
            return Ok(());
        }
        info!(target: LOG_TARGET, "New zero block {} for chain {}", block.hash(), self.chain);
        self.zero_block = Some(block.hash().clone());
        self.mined_by_height.insert(block.height().as_u64(), block.hash().clone());
        self.current_mined.get_or_insert_with(|| block.hash().clone());
        self.blocks.insert(block.hash().clone(), block);
        Ok(())
    }

    pub fn zero_block(&self) -> Option<&BlockNode> {
        self.zero_block.as_ref().and_then(|hash| self.blocks.get(hash))
    }

    /// Inserts a block. Duplicates are a no-op; a block whose
    /// `last_context_hash` names neither a known block, a known slice nor the
    /// zero hash is refused with `InvalidParent`.
    pub fn add_block(&mut self, block: BlockNode) -> Result<(), StorageError> {
        if self.blocks.contains_key(block.hash()) {
            return Ok(());
        }
        let parent = block.last_context_hash();
        if !parent.is_zero() && !self.blocks.contains_key(parent) && !self.slices.contains_key(parent) {
            return Err(StorageError::InvalidParent {
                hash: block.hash().clone(),
                parent: parent.clone(),
            });
        }
        debug!(target: LOG_TARGET, "Add block {}", block);
        self.blocks.insert(block.hash().clone(), block);
        Ok(())
    }

    /// Inserts a slice. Idempotent on hash.
    pub fn add_slice(&mut self, slice: SliceNode) -> Result<(), StorageError> {
        if self.slices.contains_key(slice.hash()) {
            return Ok(());
        }
        if slice.block_height().is_zero() {
            return Err(StorageError::InvalidSlice {
                hash: slice.hash().clone(),
                details: "block height 0 is reserved for the zero block".to_string(),
            });
        }
        debug!(target: LOG_TARGET, "Add slice {}", slice);
        self.slices_by_block_height
            .entry(slice.block_height().as_u64())
            .or_default()
            .push(slice.hash().clone());
        self.slices.insert(slice.hash().clone(), slice);
        Ok(())
    }

    /// Records `hash` as the mined representative at its height. The current
    /// mined head only advances; moving it to a greater height drops the
    /// cached best slice.
    pub fn set_mined_block(&mut self, hash: &ContextHash) -> Result<(), StorageError> {
        let block = self
            .blocks
            .get(hash)
            .ok_or_else(|| StorageError::ContextHashNotFound { hash: hash.clone() })?;
        let height = block.height().as_u64();
        self.mined_by_height.insert(height, hash.clone());

        let current_height = self
            .current_mined
            .as_ref()
            .and_then(|current| self.blocks.get(current))
            .map(|current| current.height().as_u64());
        match current_height {
            Some(current_height) if height < current_height => {},
            Some(current_height) if height == current_height => {
                self.current_mined = Some(hash.clone());
            },
            _ => {
                info!(target: LOG_TARGET, "Mined head of {} moves to {} at height {}", self.chain, hash, height);
                self.current_mined = Some(hash.clone());
                self.best_slice = None;
            },
        }
        Ok(())
    }

    pub fn current_mined_block(&self) -> Option<&BlockNode> {
        self.current_mined.as_ref().and_then(|hash| self.blocks.get(hash))
    }

    pub fn mined_block_at(&self, height: BlockHeight) -> Option<&BlockNode> {
        self.mined_by_height
            .get(&height.as_u64())
            .and_then(|hash| self.blocks.get(hash))
    }

    pub fn get_block(&self, hash: &ContextHash) -> Option<&BlockNode> {
        self.blocks.get(hash)
    }

    pub fn get_slice(&self, hash: &ContextHash) -> Option<&SliceNode> {
        self.slices.get(hash)
    }

    pub fn contains(&self, hash: &ContextHash) -> bool {
        self.blocks.contains_key(hash) || self.slices.contains_key(hash)
    }

    pub fn best_slice(&self) -> Option<&SliceNode> {
        self.best_slice.as_ref()
    }

    pub fn set_best_slice(&mut self, slice: SliceNode) {
        self.best_slice = Some(slice);
    }

    /// Removes a block from the tree, e.g. after it is orphaned beyond
    /// recovery. Mined bookkeeping pointing at it is dropped.
    pub fn del_block(&mut self, hash: &ContextHash) {
        if self.blocks.remove(hash).is_none() {
            return;
        }
        self.mined_by_height.retain(|_, mined| mined != hash);
        if self.current_mined.as_ref() == Some(hash) {
            self.current_mined = None;
        }
        if self.zero_block.as_ref() == Some(hash) {
            self.zero_block = None;
        }
        self.tries.remove(hash);
        debug!(target: LOG_TARGET, "Removed block {hash}");
    }

    /// Increments and returns the ancestor-fetch retry counter for a node.
    /// Callers typically fail the node permanently past
    /// [`MAX_ANCESTOR_TRIES`].
    pub fn record_try(&mut self, hash: &ContextHash) -> u32 {
        let tries = self.tries.entry(hash.clone()).or_insert(0);
        *tries += 1;
        *tries
    }

    /// Resolves the context a node reads through:
    /// - a block reads through its `last_context_hash`;
    /// - a height-0 slice reads through the mined block one height below its
    ///   target;
    /// - a higher slice reads through its best predecessor slice (same
    ///   producer and target, one height below, greatest transaction count).
    pub fn get_last_hash(&self, context_hash: &ContextHash) -> Result<ContextHash, StorageError> {
        if let Some(block) = self.blocks.get(context_hash) {
            return Ok(block.last_context_hash().clone());
        }
        if let Some(slice) = self.slices.get(context_hash) {
            if slice.height() == 0 {
                let Some(prev_height) = slice.block_height().checked_prev() else {
                    return Ok(ContextHash::zero());
                };
                return self
                    .mined_by_height
                    .get(&prev_height.as_u64())
                    .cloned()
                    .ok_or_else(|| StorageError::ContextHashNotFound {
                        hash: context_hash.clone(),
                    });
            }
            return self
                .best_predecessor(slice)
                .map(|prev| prev.hash().clone())
                .ok_or_else(|| StorageError::SliceAncestorMissing {
                    hash: context_hash.clone(),
                    height: slice.height() - 1,
                });
        }
        Err(StorageError::ContextHashNotFound {
            hash: context_hash.clone(),
        })
    }

    /// The full ancestor chain of `hash`, oldest first: `[ZERO, ..., hash]`.
    pub fn get_block_list(&self, hash: &ContextHash) -> Result<Vec<ContextHash>, StorageError> {
        let mut chain = Vec::new();
        let mut current = hash.clone();
        loop {
            let done = current.is_zero();
            chain.push(current.clone());
            if done {
                break;
            }
            current = self.get_last_hash(&current)?;
        }
        chain.reverse();
        Ok(chain)
    }

    /// The slice sequence `s0 ... s` leading to slice `s`, oldest first. Empty
    /// if any predecessor is missing. If an earlier slice already closes the
    /// sequence (`is_end`), the sequence is cut there.
    pub fn get_slice_list(&self, hash: &ContextHash) -> Result<Vec<SliceNode>, StorageError> {
        let slice = self
            .slices
            .get(hash)
            .ok_or_else(|| StorageError::ContextHashNotFound { hash: hash.clone() })?;

        let mut sequence = vec![slice.clone()];
        let mut current = slice;
        while current.height() > 0 {
            match self.best_predecessor(current) {
                Some(prev) => {
                    sequence.push(prev.clone());
                    current = prev;
                },
                None => {
                    debug!(
                        target: LOG_TARGET,
                        "Slice {} is missing its height {} predecessor",
                        hash,
                        current.height() - 1
                    );
                    return Ok(Vec::new());
                },
            }
        }
        sequence.reverse();
        if let Some(end_at) = sequence.iter().position(|slice| slice.is_end()) {
            sequence.truncate(end_at + 1);
        }
        Ok(sequence)
    }

    /// The best slice sequence of `producer` targeting `block_height`: walks
    /// heights from 0 picking the slice with the greatest transaction count,
    /// preferring a closing slice when one exists (which terminates the
    /// walk). Empty when the producer has no height-0 slice.
    pub fn get_best_slice(&self, producer: &str, block_height: BlockHeight) -> Vec<SliceNode> {
        let mut sequence = Vec::new();
        let Some(hashes) = self.slices_by_block_height.get(&block_height.as_u64()) else {
            return sequence;
        };

        let mut height = 0u64;
        loop {
            let mut best: Option<&SliceNode> = None;
            for hash in hashes {
                let slice = &self.slices[hash];
                if slice.producer() != producer || slice.height() != height {
                    continue;
                }
                let better = match best {
                    Some(current) => {
                        (slice.is_end() && !current.is_end()) ||
                            (slice.is_end() == current.is_end() &&
                                slice.transactions_count() > current.transactions_count())
                    },
                    None => true,
                };
                if better {
                    best = Some(slice);
                }
            }
            match best {
                Some(slice) => {
                    let is_end = slice.is_end();
                    sequence.push(slice.clone());
                    if is_end {
                        break;
                    }
                    height += 1;
                },
                None => break,
            }
        }
        sequence
    }

    fn best_predecessor(&self, slice: &SliceNode) -> Option<&SliceNode> {
        debug_assert!(slice.height() > 0);
        let hashes = self.slices_by_block_height.get(&slice.block_height().as_u64())?;
        let mut best: Option<&SliceNode> = None;
        for hash in hashes {
            let candidate = &self.slices[hash];
            if candidate.producer() != slice.producer() ||
                candidate.block_height() != slice.block_height() ||
                candidate.height() != slice.height() - 1
            {
                continue;
            }
            if best.map_or(true, |current| candidate.transactions_count() > current.transactions_count()) {
                best = Some(candidate);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(seed: u8) -> ContextHash {
        ContextHash::from_hash_bytes([seed; 32])
    }

    fn block(seed: u8, height: u64, parent: ContextHash) -> BlockNode {
        BlockNode::new(hash(seed), BlockHeight(height), parent)
    }

    fn tree_with_blocks(count: u8) -> BlockTree {
        let mut tree = BlockTree::new("testnet");
        tree.set_new_zero_block(BlockNode::genesis(hash(0))).unwrap();
        for seed in 1..count {
            tree.add_block(block(seed, seed as u64, hash(seed - 1))).unwrap();
        }
        tree
    }

    #[test]
    fn it_refuses_unknown_parents() {
        let mut tree = tree_with_blocks(2);
        let err = tree.add_block(block(9, 2, hash(42))).unwrap_err();
        assert!(matches!(err, StorageError::InvalidParent { .. }));
        assert!(!tree.contains(&hash(9)));
    }

    #[test]
    fn duplicate_blocks_are_a_no_op() {
        let mut tree = tree_with_blocks(2);
        tree.add_block(block(1, 1, hash(0))).unwrap();
        // A conflicting parent under an existing hash is ignored, not applied
        tree.add_block(block(1, 1, hash(42))).unwrap();
        assert_eq!(tree.get_last_hash(&hash(1)).unwrap(), hash(0));
    }

    #[test]
    fn it_refuses_a_second_genesis() {
        let mut tree = tree_with_blocks(1);
        tree.set_new_zero_block(BlockNode::genesis(hash(0))).unwrap();
        let err = tree.set_new_zero_block(BlockNode::genesis(hash(7))).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateGenesis { .. }));
    }

    #[test]
    fn block_list_walks_to_zero() {
        let tree = tree_with_blocks(4);
        let list = tree.get_block_list(&hash(3)).unwrap();
        assert_eq!(list, vec![ContextHash::zero(), hash(0), hash(1), hash(2), hash(3)]);
    }

    #[test]
    fn last_hash_of_height_zero_slice_is_the_mined_parent() {
        let mut tree = tree_with_blocks(2);
        tree.set_mined_block(&hash(1)).unwrap();
        tree.add_slice(SliceNode::new(hash(10), "alice", 0, BlockHeight(2), 1, false))
            .unwrap();
        assert_eq!(tree.get_last_hash(&hash(10)).unwrap(), hash(1));
    }

    #[test]
    fn slice_predecessor_prefers_greatest_transaction_count() {
        let mut tree = tree_with_blocks(2);
        tree.set_mined_block(&hash(1)).unwrap();
        tree.add_slice(SliceNode::new(hash(10), "alice", 0, BlockHeight(2), 2, false))
            .unwrap();
        // A rewrite of the same logical slice with more transactions
        tree.add_slice(SliceNode::new(hash(11), "alice", 0, BlockHeight(2), 5, false))
            .unwrap();
        tree.add_slice(SliceNode::new(hash(12), "alice", 1, BlockHeight(2), 6, false))
            .unwrap();
        assert_eq!(tree.get_last_hash(&hash(12)).unwrap(), hash(11));
        assert!(matches!(
            tree.get_last_hash(&hash(13)),
            Err(StorageError::ContextHashNotFound { .. })
        ));
    }

    #[test]
    fn missing_predecessor_fails_fast() {
        let mut tree = tree_with_blocks(2);
        tree.add_slice(SliceNode::new(hash(20), "bob", 3, BlockHeight(2), 1, false))
            .unwrap();
        let err = tree.get_last_hash(&hash(20)).unwrap_err();
        assert!(matches!(err, StorageError::SliceAncestorMissing { height: 2, .. }));
        assert!(tree.get_slice_list(&hash(20)).unwrap().is_empty());
    }

    #[test]
    fn slice_list_is_truncated_at_an_end_slice() {
        let mut tree = tree_with_blocks(2);
        tree.set_mined_block(&hash(1)).unwrap();
        tree.add_slice(SliceNode::new(hash(30), "carol", 0, BlockHeight(2), 1, false))
            .unwrap();
        tree.add_slice(SliceNode::new(hash(31), "carol", 1, BlockHeight(2), 2, true))
            .unwrap();
        tree.add_slice(SliceNode::new(hash(32), "carol", 2, BlockHeight(2), 3, false))
            .unwrap();

        let list = tree.get_slice_list(&hash(32)).unwrap();
        assert_eq!(
            list.iter().map(|slice| slice.hash().clone()).collect::<Vec<_>>(),
            vec![hash(30), hash(31)]
        );
    }

    #[test]
    fn best_slice_prefers_end_and_stops_there() {
        let mut tree = tree_with_blocks(2);
        tree.set_mined_block(&hash(1)).unwrap();
        tree.add_slice(SliceNode::new(hash(40), "dan", 0, BlockHeight(2), 4, false))
            .unwrap();
        tree.add_slice(SliceNode::new(hash(41), "dan", 0, BlockHeight(2), 3, true))
            .unwrap();
        tree.add_slice(SliceNode::new(hash(42), "dan", 1, BlockHeight(2), 9, false))
            .unwrap();

        let best = tree.get_best_slice("dan", BlockHeight(2));
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].hash(), &hash(41));

        assert!(tree.get_best_slice("nobody", BlockHeight(2)).is_empty());
    }

    #[test]
    fn best_slice_walks_heights_until_a_gap() {
        let mut tree = tree_with_blocks(2);
        tree.set_mined_block(&hash(1)).unwrap();
        tree.add_slice(SliceNode::new(hash(50), "erin", 0, BlockHeight(2), 1, false))
            .unwrap();
        tree.add_slice(SliceNode::new(hash(51), "erin", 1, BlockHeight(2), 2, false))
            .unwrap();
        tree.add_slice(SliceNode::new(hash(53), "erin", 3, BlockHeight(2), 4, false))
            .unwrap();

        let best = tree.get_best_slice("erin", BlockHeight(2));
        assert_eq!(
            best.iter().map(|slice| slice.hash().clone()).collect::<Vec<_>>(),
            vec![hash(50), hash(51)]
        );
    }

    #[test]
    fn mined_head_advances_monotonically_and_resets_best_slice() {
        let mut tree = tree_with_blocks(3);
        tree.set_mined_block(&hash(1)).unwrap();
        tree.set_best_slice(SliceNode::new(hash(60), "alice", 0, BlockHeight(2), 1, false));

        tree.set_mined_block(&hash(2)).unwrap();
        assert!(tree.best_slice().is_none());
        assert_eq!(tree.current_mined_block().unwrap().hash(), &hash(2));

        // A lower height updates the representative but not the head
        tree.set_mined_block(&hash(1)).unwrap();
        assert_eq!(tree.current_mined_block().unwrap().hash(), &hash(2));
        assert_eq!(tree.mined_block_at(BlockHeight(1)).unwrap().hash(), &hash(1));
    }

    #[test]
    fn record_try_counts_up() {
        let mut tree = tree_with_blocks(1);
        assert_eq!(tree.record_try(&hash(9)), 1);
        assert_eq!(tree.record_try(&hash(9)), 2);
        assert_eq!(tree.record_try(&hash(8)), 1);
    }
}
