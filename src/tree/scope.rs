// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Optimistic-lock scope for one logical request.
//!
//! A [`WatchScope`] remembers which paths have been watched on the backend
//! session. The first access to a path through a scope issues `WATCH`;
//! later accesses reuse it. Committing a transaction releases every watch
//! on the session, so the scope is disarmed after each commit, applied or
//! not.
//!
//! ```rust
//! # use blob_tree::{BlobTree, PathKey};
//! # async fn example() -> Result<(), blob_tree::StorageError> {
//! let tree = BlobTree::in_memory();
//! let mut scope = tree.scope();
//! let blob = tree.blob(&PathKey::parse("/notes/todo.txt")?)?;
//!
//! if !blob.exists(&mut scope).await? {      // WATCH /notes/todo.txt
//!     blob.set_bytes(&mut scope, b"milk").await?; // MULTI … EXEC
//! }
//! assert_eq!(scope.armed_count(), 0);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use tracing::trace;

use crate::path::PathKey;
use crate::storage::traits::{KvBackend, StorageError};

#[derive(Debug, Default)]
pub struct WatchScope {
    /// (namespace, key) pairs watched on the session
    armed: BTreeSet<(u32, String)>,
}

impl WatchScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` is watched in any namespace.
    pub fn is_armed(&self, path: &PathKey) -> bool {
        let key = path.to_string();
        self.armed.iter().any(|(_, armed)| *armed == key)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Watch `path` in the session's current namespace unless this scope
    /// already did.
    pub(crate) async fn arm(&mut self, backend: &dyn KvBackend, path: &PathKey) -> Result<(), StorageError> {
        let entry = (backend.selected_namespace(), path.to_string());
        if self.armed.contains(&entry) {
            return Ok(());
        }
        backend.watch(&entry.1).await?;
        trace!(namespace = entry.0, path = %entry.1, "Watch armed");
        self.armed.insert(entry);
        Ok(())
    }

    /// The backend dropped its watches (a commit happened).
    pub(crate) fn disarm(&mut self) {
        self.armed.clear();
    }

    /// Drop all watches on the session without committing anything.
    pub async fn reset(&mut self, backend: &dyn KvBackend) -> Result<(), StorageError> {
        self.disarm();
        backend.unwatch().await
    }
}
