//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

mod block_height;
pub use block_height::BlockHeight;

mod context_hash;
pub use context_hash::{ContextHash, ContextHashError, MAIN_CONTEXT_LITERAL};

pub mod optional;
