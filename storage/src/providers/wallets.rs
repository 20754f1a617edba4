//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

//! Wallet balances under the `wallet-` key namespace. Balances are decimal
//! strings; an address that was never written holds zero.

use crate::{context::EnvContext, error::StorageError, kv::KvBackend};

fn wallet_key(address: &str) -> String {
    format!("wallet-{address}")
}

pub fn balance_of<TKv: KvBackend>(ctx: &mut EnvContext<TKv>, address: &str) -> Result<String, StorageError> {
    let value = ctx.get(&wallet_key(address))?;
    if value.is_empty() {
        return Ok("0".to_string());
    }
    Ok(value)
}

pub fn balance_of_u128<TKv: KvBackend>(ctx: &mut EnvContext<TKv>, address: &str) -> Result<u128, StorageError> {
    let value = balance_of(ctx, address)?;
    value.parse().map_err(|_| StorageError::CorruptRecord {
        kind: "wallet balance",
        details: format!("'{value}' of {address} is not a u128"),
    })
}

pub fn set_balance<TKv: KvBackend>(ctx: &mut EnvContext<TKv>, address: &str, amount: u128) {
    ctx.set(wallet_key(address), amount.to_string());
}

/// Moves `amount` between two addresses, staging both writes. Fails without
/// staging anything if funds are insufficient.
pub fn transfer<TKv: KvBackend>(
    ctx: &mut EnvContext<TKv>,
    from: &str,
    to: &str,
    amount: u128,
) -> Result<(), StorageError> {
    if from == to {
        return Ok(());
    }
    let from_balance = balance_of_u128(ctx, from)?;
    let to_balance = balance_of_u128(ctx, to)?;
    let remaining = from_balance
        .checked_sub(amount)
        .ok_or_else(|| StorageError::InsufficientFunds {
            address: from.to_string(),
            balance: from_balance,
            amount,
        })?;
    set_balance(ctx, from, remaining);
    set_balance(ctx, to, to_balance.saturating_add(amount));
    Ok(())
}
