// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Directory-like groupings.
//!
//! A container's listing is the hash stored under its own key: absolute
//! child path → `"true"` (child container) or `"false"` (child blob). The
//! hash is written by [`Blob::set_data`](super::Blob::set_data); containers
//! never write their own listing.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::blob::CONTAINER_FLAG;
use super::scope::WatchScope;
use crate::metrics::OperationTimer;
use crate::path::PathKey;
use crate::storage::traits::{KvBackend, StorageError};

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Path relative to the container, e.g. `c.txt` or `b/`
    pub name: String,
    pub is_container: bool,
}

/// Handle to a container, borrowed from a [`BlobTree`](super::BlobTree) session.
pub struct Container<'a> {
    path: PathKey,
    backend: &'a dyn KvBackend,
}

impl<'a> Container<'a> {
    pub(crate) fn new(path: PathKey, backend: &'a dyn KvBackend) -> Result<Self, StorageError> {
        if !path.is_container() {
            return Err(StorageError::InvalidOperation(format!(
                "'{}' is a blob path, not a container",
                path
            )));
        }
        Ok(Self { path, backend })
    }

    pub fn path(&self) -> &PathKey {
        &self.path
    }

    /// Whether the container's listing is stored. An empty container has no
    /// listing, so this is false for it even while its parent lists it.
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn exists(&self) -> Result<bool, StorageError> {
        let timer = OperationTimer::start("container", "exists");
        timer.finish(self.backend.exists(&self.path.to_string()).await)
    }

    /// Direct children, in no particular order.
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn get_members(&self) -> Result<Vec<Member>, StorageError> {
        let timer = OperationTimer::start("container", "get_members");
        timer.finish(self.read_members().await)
    }

    async fn read_members(&self) -> Result<Vec<Member>, StorageError> {
        let prefix = self.path.to_string();
        let fields = self.backend.hash_get_all(&prefix).await?;

        let members = fields
            .into_iter()
            .map(|(child, flag)| {
                let name = match child.strip_prefix(&prefix) {
                    Some(rest) => rest.to_string(),
                    None => {
                        warn!(container = %prefix, child = %child, "Listing entry outside container");
                        child.clone()
                    }
                };
                Member { name, is_container: flag == CONTAINER_FLAG }
            })
            .collect();
        Ok(members)
    }

    /// Delete an empty container and unlink it from its parent, in one
    /// transaction guarded by a watch on the container's listing.
    ///
    /// Fails with [`StorageError::ContainerNotEmpty`] if it still has
    /// members, after releasing the session's watches; subtrees are never
    /// removed recursively. A blob created inside
    /// the container between the check and the commit turns the commit into
    /// a [`StorageError::TransactionConflict`].
    #[instrument(skip(self, scope), fields(path = %self.path))]
    pub async fn delete(&self, scope: &mut WatchScope) -> Result<(), StorageError> {
        let timer = OperationTimer::start("container", "delete");
        timer.finish(self.delete_inner(scope).await)
    }

    async fn delete_inner(&self, scope: &mut WatchScope) -> Result<(), StorageError> {
        scope.arm(self.backend, &self.path).await?;
        let key = self.path.to_string();

        if !self.backend.hash_get_all(&key).await?.is_empty() {
            // No commit follows, so release the watch explicitly.
            scope.reset(self.backend).await?;
            return Err(StorageError::ContainerNotEmpty { path: key });
        }

        let mut txn = self.backend.transaction();
        txn.del(key.clone());
        if let Ok(parent) = self.path.to_parent() {
            txn.hash_delete_field(parent.to_string(), key.clone());
        }

        let result = self.backend.commit(txn).await;
        scope.disarm();
        match result {
            Ok(()) => {
                debug!(path = %key, "Container deleted");
                Ok(())
            }
            Err(StorageError::TransactionConflict { .. }) => {
                Err(StorageError::TransactionConflict { path: key })
            }
            Err(e) => Err(e),
        }
    }
}
