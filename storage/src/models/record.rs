//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tari_weave_common_types::ContextHash;

/// A stored environment value. A tombstone is a first-class marker meaning
/// "key explicitly deleted at this context hash" and must never be conflated
/// with key absence: a tombstone shadows ancestor values during look-through,
/// absence falls through to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EnvValue {
    Value(String),
    Tombstone,
}

impl EnvValue {
    pub fn value(value: impl Into<String>) -> Self {
        Self::Value(value.into())
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone)
    }

    /// The readable form: tombstones read as the empty string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Value(value) => value,
            Self::Tombstone => "",
        }
    }
}

/// One versioned entry of the environment: the value of `key` on `chain` as
/// written under `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvRecord {
    pub chain: String,
    pub key: String,
    pub hash: ContextHash,
    pub value: EnvValue,
}

impl EnvRecord {
    pub fn new(chain: impl Into<String>, key: impl Into<String>, hash: ContextHash, value: EnvValue) -> Self {
        Self {
            chain: chain.into(),
            key: key.into(),
            hash,
            value,
        }
    }

    pub fn tombstone(chain: impl Into<String>, key: impl Into<String>, hash: ContextHash) -> Self {
        Self::new(chain, key, hash, EnvValue::Tombstone)
    }

    pub fn with_hash(mut self, hash: ContextHash) -> Self {
        self.hash = hash;
        self
    }
}

impl Display for EnvRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            EnvValue::Value(value) => write!(f, "{}|{}@{} = {}", self.chain, self.key, self.hash, value),
            EnvValue::Tombstone => write!(f, "{}|{}@{} = <deleted>", self.chain, self.key, self.hash),
        }
    }
}
