//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

//! Validator votes as ordinary environment writes under the `vote-` key
//! namespace, so vote visibility follows context semantics like any other
//! state.

use tari_weave_common_types::ContextHash;

use crate::{context::EnvContext, error::StorageError, kv::KvBackend};

const IN_FAVOR: &str = "1";
const AGAINST: &str = "0";

fn vote_key(block_hash: &ContextHash, validator: &str) -> String {
    format!("vote-{block_hash}-{validator}")
}

pub fn record_vote<TKv: KvBackend>(
    ctx: &mut EnvContext<TKv>,
    block_hash: &ContextHash,
    validator: &str,
    in_favor: bool,
) {
    ctx.set(vote_key(block_hash, validator), if in_favor { IN_FAVOR } else { AGAINST });
}

pub fn get_vote<TKv: KvBackend>(
    ctx: &mut EnvContext<TKv>,
    block_hash: &ContextHash,
    validator: &str,
) -> Result<Option<bool>, StorageError> {
    let value = ctx.get(&vote_key(block_hash, validator))?;
    match value.as_str() {
        "" => Ok(None),
        IN_FAVOR => Ok(Some(true)),
        _ => Ok(Some(false)),
    }
}

/// Counts `(in_favor, against)` votes for a block as observed from this
/// context.
pub fn count_votes<TKv: KvBackend>(
    ctx: &mut EnvContext<TKv>,
    block_hash: &ContextHash,
) -> Result<(u64, u64), StorageError> {
    let votes = ctx.list(&format!("vote-{block_hash}"))?;
    let mut in_favor = 0;
    let mut against = 0;
    for (_, value) in votes {
        if value == IN_FAVOR {
            in_favor += 1;
        } else {
            against += 1;
        }
    }
    Ok((in_favor, against))
}
