// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Leaf documents.
//!
//! A blob is one scalar key holding raw bytes. Its membership in the tree
//! lives in the parent container's hash, and both are always written in the
//! same transaction, guarded by a watch on the blob key.

use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument};

use super::scope::WatchScope;
use crate::metrics::{self, OperationTimer};
use crate::path::PathKey;
use crate::storage::traits::{KvBackend, StorageError, Transaction};

/// Byte stream returned by [`Blob::get_data`].
pub type BlobReader = Cursor<Vec<u8>>;

/// Flag stored in a parent hash for a child container.
pub(crate) const CONTAINER_FLAG: &str = "true";
/// Flag stored in a parent hash for a child blob.
pub(crate) const BLOB_FLAG: &str = "false";

/// Handle to a blob, borrowed from a [`BlobTree`](super::BlobTree) session.
pub struct Blob<'a> {
    path: PathKey,
    backend: &'a dyn KvBackend,
}

impl<'a> Blob<'a> {
    pub(crate) fn new(path: PathKey, backend: &'a dyn KvBackend) -> Result<Self, StorageError> {
        if path.is_container() {
            return Err(StorageError::InvalidOperation(format!(
                "'{}' is a container path, not a blob",
                path
            )));
        }
        Ok(Self { path, backend })
    }

    pub fn path(&self) -> &PathKey {
        &self.path
    }

    /// Whether the blob is stored. Arms the watch on first use.
    #[instrument(skip(self, scope), fields(path = %self.path))]
    pub async fn exists(&self, scope: &mut WatchScope) -> Result<bool, StorageError> {
        let timer = OperationTimer::start("blob", "exists");
        timer.finish(self.exists_inner(scope).await)
    }

    async fn exists_inner(&self, scope: &mut WatchScope) -> Result<bool, StorageError> {
        scope.arm(self.backend, &self.path).await?;
        self.backend.exists(&self.path.to_string()).await
    }

    /// Read the blob as a byte stream, `None` if it is absent.
    #[instrument(skip(self, scope), fields(path = %self.path))]
    pub async fn get_data(&self, scope: &mut WatchScope) -> Result<Option<BlobReader>, StorageError> {
        let timer = OperationTimer::start("blob", "get_data");
        let result = self.read(scope).await.map(|data| data.map(Cursor::new));
        timer.finish(result)
    }

    /// Read the whole blob into memory, `None` if it is absent.
    pub async fn get_bytes(&self, scope: &mut WatchScope) -> Result<Option<Vec<u8>>, StorageError> {
        let timer = OperationTimer::start("blob", "get_data");
        timer.finish(self.read(scope).await)
    }

    async fn read(&self, scope: &mut WatchScope) -> Result<Option<Vec<u8>>, StorageError> {
        scope.arm(self.backend, &self.path).await?;
        self.backend.get(&self.path.to_string()).await
    }

    /// Drain `reader` and store it as the blob's content, registering the
    /// blob in its parent and every missing ancestor container on the way
    /// up to the root (`mkdir -p`).
    ///
    /// Fails with [`StorageError::TransactionConflict`] if the blob changed
    /// since this scope first watched it; nothing is written in that case.
    #[instrument(skip(self, scope, reader), fields(path = %self.path))]
    pub async fn set_data<R>(&self, scope: &mut WatchScope, mut reader: R) -> Result<(), StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let timer = OperationTimer::start("blob", "set_data");
        let result = async {
            scope.arm(self.backend, &self.path).await?;
            let mut value = Vec::new();
            reader.read_to_end(&mut value).await?;
            self.write(scope, value).await
        }
        .await;
        timer.finish(result)
    }

    /// [`set_data`](Self::set_data) from an in-memory buffer.
    pub async fn set_bytes(&self, scope: &mut WatchScope, data: &[u8]) -> Result<(), StorageError> {
        self.set_data(scope, data).await
    }

    async fn write(&self, scope: &mut WatchScope, value: Vec<u8>) -> Result<(), StorageError> {
        metrics::record_blob_bytes(value.len());
        let key = self.path.to_string();

        let mut txn = self.backend.transaction();
        txn.set(key.clone(), value);

        // Parent gets "false" for the blob, every level above gets "true"
        // for the container below it.
        let mut child = self.path.clone();
        for ancestor in self.path.ancestors() {
            let flag = if child.is_container() { CONTAINER_FLAG } else { BLOB_FLAG };
            txn.hash_set_field(ancestor.to_string(), child.to_string(), flag);
            child = ancestor;
        }

        metrics::record_transaction_size(txn.len());
        self.commit(scope, txn).await?;
        debug!(path = %key, "Blob written");
        Ok(())
    }

    /// Remove the blob and its entry in the parent container. Ancestors
    /// above the parent, and the parent itself, are left in place.
    #[instrument(skip(self, scope), fields(path = %self.path))]
    pub async fn delete(&self, scope: &mut WatchScope) -> Result<(), StorageError> {
        let timer = OperationTimer::start("blob", "delete");
        let result = async {
            scope.arm(self.backend, &self.path).await?;
            let key = self.path.to_string();
            let parent = self.path.to_parent()?;

            let mut txn = self.backend.transaction();
            txn.del(key.clone()).hash_delete_field(parent.to_string(), key);
            self.commit(scope, txn).await
        }
        .await;
        timer.finish(result)
    }

    async fn commit(&self, scope: &mut WatchScope, txn: Transaction) -> Result<(), StorageError> {
        let result = self.backend.commit(txn).await;
        // EXEC releases every watch on the session, applied or not.
        scope.disarm();
        result.map_err(|e| match e {
            StorageError::TransactionConflict { .. } => {
                StorageError::TransactionConflict { path: self.path.to_string() }
            }
            other => other,
        })
    }
}
