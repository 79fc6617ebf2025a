// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The blob tree facade.
//!
//! A [`BlobTree`] owns one backend session. [`Blob`] and [`Container`]
//! handles borrow it, so the borrow checker guarantees none of them outlives
//! [`BlobTree::shutdown`].

mod blob;
mod container;
mod scope;

pub use blob::{Blob, BlobReader};
pub use container::{Container, Member};
pub use scope::WatchScope;

use tracing::{info, instrument};

use crate::config::BlobTreeConfig;
use crate::path::PathKey;
use crate::storage::memory::MemoryBackend;
use crate::storage::redis::RedisBackend;
use crate::storage::traits::{KvBackend, StorageError};

pub struct BlobTree {
    backend: Box<dyn KvBackend>,
}

impl BlobTree {
    /// Wrap an already open backend session.
    pub fn new(backend: impl KvBackend + 'static) -> Self {
        Self { backend: Box::new(backend) }
    }

    /// Connect to Redis as described by `config`, selecting the configured
    /// namespace if any.
    #[instrument(skip(config), fields(namespace = ?config.namespace))]
    pub async fn connect(config: &BlobTreeConfig) -> Result<Self, StorageError> {
        let backend = RedisBackend::with_prefix(
            &config.redis_url,
            config.key_prefix.as_deref(),
            &config.retry_config(),
        )
        .await?;
        let tree = Self::new(backend);
        if let Some(namespace) = config.namespace {
            tree.select_namespace(namespace).await?;
        }
        info!("Blob tree connected");
        Ok(tree)
    }

    /// A tree over a private in-process store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    pub fn backend(&self) -> &dyn KvBackend {
        self.backend.as_ref()
    }

    /// A fresh optimistic-lock scope for one logical request.
    #[must_use]
    pub fn scope(&self) -> WatchScope {
        WatchScope::new()
    }

    /// Handle to the blob at `path`. Fails for container paths.
    pub fn blob(&self, path: &PathKey) -> Result<Blob<'_>, StorageError> {
        Blob::new(path.clone(), self.backend.as_ref())
    }

    /// Handle to the container at `path`. Fails for blob paths.
    pub fn container(&self, path: &PathKey) -> Result<Container<'_>, StorageError> {
        Container::new(path.clone(), self.backend.as_ref())
    }

    pub async fn select_namespace(&self, index: u32) -> Result<(), StorageError> {
        self.backend.select_namespace(index).await
    }

    /// Wipe the selected namespace.
    pub async fn flush_all(&self) -> Result<(), StorageError> {
        self.backend.flush_all().await
    }

    /// Close the session.
    pub async fn shutdown(self) -> Result<(), StorageError> {
        self.backend.close().await?;
        info!("Blob tree shut down");
        Ok(())
    }
}
