//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

//! Thin domain facades over the environment core. Each provider owns a
//! sibling table (blocks, slices, transactions) or a key namespace routed
//! through a context (configs, wallets, votes), encoding domain values as
//! JSON or plain strings.

mod blocks;
pub use blocks::{BlockInfo, BlockProvider};

pub mod configs;

mod slices;
pub use slices::{SliceInfo, SliceProvider};

mod transactions;
pub use transactions::{TransactionProvider, TxInfo, TxStatus, MEMPOOL_TX_TIMEOUT_SECS};

pub mod votes;

pub mod wallets;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StorageError;

const SEPARATOR: char = '|';

pub(crate) fn table_key(table: &str, parts: &[&str]) -> Vec<u8> {
    let mut key = String::from(table);
    for part in parts {
        key.push(SEPARATOR);
        key.push_str(part);
    }
    key.into_bytes()
}

pub(crate) fn table_prefix(table: &str, parts: &[&str]) -> Vec<u8> {
    let mut key = table_key(table, parts);
    key.push(SEPARATOR as u8);
    key
}

pub(crate) fn to_json<T: Serialize>(kind: &'static str, value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|source| StorageError::Codec { kind, source })
}

pub(crate) fn from_json<T: DeserializeOwned>(kind: &'static str, bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|source| StorageError::Codec { kind, source })
}
