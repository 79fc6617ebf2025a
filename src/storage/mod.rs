// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Key-value backends: the [`KvBackend`](traits::KvBackend) contract plus
//! Redis and in-process implementations.

pub mod memory;
pub mod redis;
pub mod traits;
