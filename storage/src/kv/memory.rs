//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    error::StorageError,
    kv::{KvBackend, KvEntry, ScanOptions, WriteOp},
};

type InnerKvMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory [`KvBackend`] over a shared ordered map. Used by tests and
/// light deployments that do not need durability.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvBackend {
    state: Arc<RwLock<InnerKvMap>>,
}

impl MemoryKvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, InnerKvMap>, StorageError> {
        self.state.read().map_err(|_| StorageError::Lock("memory kv"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, InnerKvMap>, StorageError> {
        self.state.write().map_err(|_| StorageError::Lock("memory kv"))
    }

    fn prefixed<'a>(guard: &'a InnerKvMap, prefix: &'a [u8]) -> impl Iterator<Item = (&'a Vec<u8>, &'a Vec<u8>)> {
        guard
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(key, _)| key.starts_with(prefix))
    }
}

impl KvBackend for MemoryKvBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut guard = self.write()?;
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    guard.insert(key, value);
                },
                WriteOp::Delete { key } => {
                    guard.remove(&key);
                },
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8], options: ScanOptions) -> Result<Vec<KvEntry>, StorageError> {
        let guard = self.read()?;
        let mut entries: Vec<KvEntry> = Self::prefixed(&guard, prefix)
            .map(|(key, value)| KvEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        if options.reverse {
            entries.reverse();
        }
        let entries = entries
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(entries)
    }

    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StorageError> {
        let guard = self.read()?;
        Ok(Self::prefixed(&guard, prefix).count())
    }
}
