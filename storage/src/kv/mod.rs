//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

pub mod memory;

use crate::error::StorageError;

/// One entry of an atomic multi-key write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl WriteOp {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::Delete { key: key.into() }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub limit: Option<usize>,
    pub offset: usize,
    pub reverse: bool,
}

impl ScanOptions {
    pub fn limited(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset,
            reverse: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Ordered key-value backend contract. Implementations must provide
/// lexicographic key ordering for prefix scans and atomicity across the keys
/// of a single `write_batch` call. All operations return errors rather than
/// partial success.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError>;

    /// Entries whose key starts with `prefix`, ordered by key. `reverse`
    /// inverts the order; `offset`/`limit` apply after ordering.
    fn scan_prefix(&self, prefix: &[u8], options: ScanOptions) -> Result<Vec<KvEntry>, StorageError>;

    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StorageError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.write_batch(vec![WriteOp::put(key, value)])
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.write_batch(vec![WriteOp::delete(key)])
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }
}
