//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// Reserved context hash naming the flat consolidated view. Never a valid
/// block or slice hash.
pub const MAIN_CONTEXT_LITERAL: &str = "main_context";

const ZERO_HASH_HEX: &str = "0000000000000000000000000000000000000000000000000000000000000000";
const HASH_HEX_LENGTH: usize = 64;

/// The addressing key under which a set of environment records is stored.
///
/// Three shapes coexist: a 64-character lowercase hex block/slice hash, the
/// all-zeroes sentinel that terminates every ancestor chain, and the
/// `main_context` literal. Construction is validated; any `ContextHash` value
/// is safe to embed verbatim in persisted keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContextHash(String);

impl ContextHash {
    pub fn zero() -> Self {
        Self(ZERO_HASH_HEX.to_string())
    }

    pub fn main_context() -> Self {
        Self(MAIN_CONTEXT_LITERAL.to_string())
    }

    /// Parses a 64-character lowercase hex hash. Sentinel literals other than
    /// the zero hash are rejected here; use [`ContextHash::parse`] to accept
    /// the full context-hash alphabet.
    pub fn from_hex(hex_str: &str) -> Result<Self, ContextHashError> {
        if hex_str.len() != HASH_HEX_LENGTH {
            return Err(ContextHashError::InvalidLength { len: hex_str.len() });
        }
        if let Some(ch) = hex_str
            .chars()
            .find(|ch| !matches!(ch, '0'..='9' | 'a'..='f'))
        {
            return Err(ContextHashError::InvalidCharacter { ch });
        }
        Ok(Self(hex_str.to_string()))
    }

    /// Accepts any of the three context-hash shapes.
    pub fn parse(s: &str) -> Result<Self, ContextHashError> {
        if s == MAIN_CONTEXT_LITERAL {
            return Ok(Self::main_context());
        }
        Self::from_hex(s)
    }

    pub fn from_hash_bytes(bytes: [u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ZERO_HASH_HEX
    }

    pub fn is_main_context(&self) -> bool {
        self.0 == MAIN_CONTEXT_LITERAL
    }

    /// True for hashes that can name a node in the block/slice tree, i.e.
    /// neither of the two sentinels.
    pub fn is_tree_hash(&self) -> bool {
        !self.is_zero() && !self.is_main_context()
    }
}

impl TryFrom<String> for ContextHash {
    type Error = ContextHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContextHash> for String {
    fn from(hash: ContextHash) -> Self {
        hash.0
    }
}

impl FromStr for ContextHash {
    type Err = ContextHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ContextHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for ContextHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextHashError {
    #[error("Invalid context hash length {len}, expected {HASH_HEX_LENGTH}")]
    InvalidLength { len: usize },
    #[error("Invalid context hash character '{ch}', expected lowercase hex")]
    InvalidCharacter { ch: char },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_accepts_all_three_shapes() {
        let hash = ContextHash::parse(&"ab".repeat(32)).unwrap();
        assert!(hash.is_tree_hash());

        let zero = ContextHash::parse(ZERO_HASH_HEX).unwrap();
        assert!(zero.is_zero());
        assert_eq!(zero, ContextHash::zero());

        let main = ContextHash::parse("main_context").unwrap();
        assert!(main.is_main_context());
    }

    #[test]
    fn it_rejects_malformed_hashes() {
        ContextHash::parse("abc123").unwrap_err();
        ContextHash::parse(&"AB".repeat(32)).unwrap_err();
        ContextHash::parse(&"zz".repeat(32)).unwrap_err();
        ContextHash::from_hex("main_context").unwrap_err();
    }

    #[test]
    fn it_validates_on_deserialize() {
        let hash: ContextHash = serde_json::from_str("\"main_context\"").unwrap();
        assert!(hash.is_main_context());
        serde_json::from_str::<ContextHash>("\"not-a-hash\"").unwrap_err();
    }
}
