//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tari_weave_common_types::{BlockHeight, ContextHash};

/// A pre-block batch of transactions emitted by one producer between mined
/// blocks. Slices form per-producer chains within a block interval: height 0
/// follows the mined block at `block_height - 1`, height `n` follows the
/// producer's height `n - 1` slice. A producer may rewrite the same logical
/// slice under a new hash with a higher `transactions_count`; an `is_end`
/// slice closes the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceNode {
    hash: ContextHash,
    producer: String,
    height: u64,
    block_height: BlockHeight,
    transactions_count: u64,
    is_end: bool,
}

impl SliceNode {
    pub fn new(
        hash: ContextHash,
        producer: impl Into<String>,
        height: u64,
        block_height: BlockHeight,
        transactions_count: u64,
        is_end: bool,
    ) -> Self {
        Self {
            hash,
            producer: producer.into(),
            height,
            block_height,
            transactions_count,
            is_end,
        }
    }

    pub fn hash(&self) -> &ContextHash {
        &self.hash
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn block_height(&self) -> BlockHeight {
        self.block_height
    }

    pub fn transactions_count(&self) -> u64 {
        self.transactions_count
    }

    pub fn is_end(&self) -> bool {
        self.is_end
    }
}

impl Display for SliceNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {} at {}/{}, {} tx{}]",
            self.hash,
            self.producer,
            self.height,
            self.block_height,
            self.transactions_count,
            if self.is_end { ", end" } else { "" }
        )
    }
}
