//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

mod block;
pub use block::BlockNode;

mod record;
pub use record::{EnvRecord, EnvValue};

mod slice;
pub use slice::SliceNode;
