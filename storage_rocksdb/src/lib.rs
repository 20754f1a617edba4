//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use tari_weave_storage::{
    kv::{KvBackend, KvEntry, ScanOptions, WriteOp},
    StorageError,
};

/// Durable [`KvBackend`] over a RocksDB database. RocksDB keeps keys in
/// lexicographic order, which gives prefix scans directly; `write_batch` maps
/// onto a RocksDB `WriteBatch` for multi-key atomicity.
#[derive(Clone)]
pub struct RocksDbKvBackend {
    db: Arc<DB>,
    path: PathBuf,
}

impl RocksDbKvBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref()).map_err(|err| StorageError::backend("open", err))?;
        Ok(Self {
            db: Arc::new(db),
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entries_with_prefix(&self, prefix: &[u8], reverse: bool) -> Result<Vec<KvEntry>, StorageError> {
        if reverse {
            // Start at the last key of the prefix range and walk backwards.
            match prefix_upper_bound(prefix) {
                Some(upper) => collect_prefixed(
                    self.db.iterator(IteratorMode::From(&upper, Direction::Reverse)),
                    prefix,
                    true,
                ),
                None => collect_prefixed(self.db.iterator(IteratorMode::End), prefix, true),
            }
        } else {
            collect_prefixed(
                self.db.iterator(IteratorMode::From(prefix, Direction::Forward)),
                prefix,
                false,
            )
        }
    }
}

impl fmt::Debug for RocksDbKvBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RocksDbKvBackend").field("path", &self.path).finish()
    }
}

impl KvBackend for RocksDbKvBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db.get(key).map_err(|err| StorageError::backend("get", err))
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                WriteOp::Put { key, value } => batch.put(key, value),
                WriteOp::Delete { key } => batch.delete(key),
            }
        }
        self.db
            .write(batch)
            .map_err(|err| StorageError::backend("write_batch", err))
    }

    fn scan_prefix(&self, prefix: &[u8], options: ScanOptions) -> Result<Vec<KvEntry>, StorageError> {
        let entries = self.entries_with_prefix(prefix, options.reverse)?;
        Ok(entries
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect())
    }

    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StorageError> {
        Ok(self.entries_with_prefix(prefix, false)?.len())
    }
}

fn collect_prefixed<I>(iter: I, prefix: &[u8], reverse: bool) -> Result<Vec<KvEntry>, StorageError>
where I: Iterator<Item = Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>> {
    let mut entries = Vec::new();
    for item in iter {
        let (key, value) = item.map_err(|err| StorageError::backend("scan", err))?;
        if key.starts_with(prefix) {
            entries.push(KvEntry {
                key: key.into_vec(),
                value: value.into_vec(),
            });
        } else if reverse && entries.is_empty() && key.as_ref() > prefix {
            // The reverse start key can sit just past the prefix range
            continue;
        } else {
            break;
        }
    }
    Ok(entries)
}

/// The smallest key strictly greater than every key with this prefix, if one
/// exists (an all-0xff prefix has none).
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return Some(upper);
        }
        upper.pop();
    }
    None
}
