//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

//! Chain configuration values under the `config-` key namespace, read and
//! written through a context so they version with the fork they belong to.

use crate::{context::EnvContext, error::StorageError, kv::KvBackend};

fn config_key(name: &str) -> String {
    format!("config-{name}")
}

pub fn get_config<TKv: KvBackend>(ctx: &mut EnvContext<TKv>, name: &str) -> Result<String, StorageError> {
    ctx.get(&config_key(name))
}

pub fn set_config<TKv: KvBackend>(ctx: &mut EnvContext<TKv>, name: &str, value: impl Into<String>) {
    ctx.set(config_key(name), value);
}

pub fn del_config<TKv: KvBackend>(ctx: &mut EnvContext<TKv>, name: &str) {
    ctx.delete(config_key(name));
}

/// A numeric config value; absent reads as `None`.
pub fn get_config_u64<TKv: KvBackend>(ctx: &mut EnvContext<TKv>, name: &str) -> Result<Option<u64>, StorageError> {
    let value = ctx.get(&config_key(name))?;
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| StorageError::CorruptRecord {
            kind: "config value",
            details: format!("'{value}' of {name} is not a u64"),
        })
}
