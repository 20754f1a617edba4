//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tari_weave_common_types::{BlockHeight, ContextHash};

/// A node in the block tree. `last_context_hash` is the context this block
/// executes on top of: the parent block's hash, the closing slice's hash, or
/// the zero hash for genesis. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockNode {
    hash: ContextHash,
    height: BlockHeight,
    last_context_hash: ContextHash,
}

impl BlockNode {
    pub fn new(hash: ContextHash, height: BlockHeight, last_context_hash: ContextHash) -> Self {
        Self {
            hash,
            height,
            last_context_hash,
        }
    }

    pub fn genesis(hash: ContextHash) -> Self {
        Self {
            hash,
            height: BlockHeight::zero(),
            last_context_hash: ContextHash::zero(),
        }
    }

    pub fn hash(&self) -> &ContextHash {
        &self.hash
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn last_context_hash(&self) -> &ContextHash {
        &self.last_context_hash
    }

    pub fn is_genesis(&self) -> bool {
        self.last_context_hash.is_zero()
    }
}

impl Display for BlockNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, parent: {}]", self.hash, self.height, self.last_context_hash)
    }
}
