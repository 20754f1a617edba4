//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::error::Error;

use tari_weave_common_types::{optional::IsNotFoundError, ContextHash};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Context hash not found in tree: {hash}")]
    ContextHashNotFound { hash: ContextHash },
    #[error("Slice {hash} has no predecessor at height {height}")]
    SliceAncestorMissing { hash: ContextHash, height: u64 },
    #[error("Context has {pending} uncommitted write(s)")]
    ContextNotCommitted { pending: usize },
    #[error("Zero block is already {existing}, refusing {candidate}")]
    DuplicateGenesis {
        existing: ContextHash,
        candidate: ContextHash,
    },
    #[error("Parent {parent} of {hash} is not a known block, slice or the zero hash")]
    InvalidParent { hash: ContextHash, parent: ContextHash },
    #[error("Slice {hash} rejected: {details}")]
    InvalidSlice { hash: ContextHash, details: String },
    #[error("KV backend error during {operation}: {source}")]
    KvBackend {
        operation: &'static str,
        source: anyhow::Error,
    },
    #[error("Failed to decode stored {kind}: {source}")]
    Codec {
        kind: &'static str,
        source: serde_json::Error,
    },
    #[error("Corrupt {kind} record: {details}")]
    CorruptRecord { kind: &'static str, details: String },
    #[error("{kind} not found with key {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("Insufficient funds: {address} holds {balance}, needs {amount}")]
    InsufficientFunds {
        address: String,
        balance: u128,
        amount: u128,
    },
    #[error("Lock poisoned in {0}")]
    Lock(&'static str),
}

impl StorageError {
    pub fn backend<E: Error + Send + Sync + 'static>(operation: &'static str, err: E) -> Self {
        Self::KvBackend {
            operation,
            source: err.into(),
        }
    }
}

impl IsNotFoundError for StorageError {
    fn is_not_found_error(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
