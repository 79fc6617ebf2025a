// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis key-value backend.
//!
//! Blobs are Redis STRINGs, containers are Redis HASHes:
//!
//! ```text
//! /a/b/c.txt  STRING  <raw bytes>
//! /a/b/       HASH    { "/a/b/c.txt": "false" }
//! /a/         HASH    { "/a/b/": "true" }
//! /           HASH    { "/a/": "true" }
//! ```
//!
//! Transactions map onto `WATCH` / `MULTI` / `EXEC`. Watches belong to a
//! connection, so each [`RedisBackend`] owns exactly one multiplexed
//! connection and never reconnects behind the caller's back: a silent
//! reconnect would drop the watches and let a stale transaction apply.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{cmd, pipe, AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, instrument, warn};

use super::traits::{KvBackend, StorageError, Transaction, TxOp};
use crate::resilience::retry::{retry, RetryConfig};

pub struct RedisBackend {
    connection: Mutex<Option<MultiplexedConnection>>,
    /// Optional key prefix for namespacing (e.g., "pod:" → "pod:/a/b.txt")
    prefix: String,
    /// Database index last selected on the connection
    namespace: AtomicU32,
}

impl RedisBackend {
    /// Connect without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None, &RetryConfig::startup()).await
    }

    /// Connect with an optional key prefix.
    ///
    /// The prefix is prepended to every key (never to hash fields), so
    /// several trees can share one Redis database.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use blob_tree::storage::redis::RedisBackend;
    /// # use blob_tree::RetryConfig;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let backend = RedisBackend::with_prefix(
    ///     "redis://localhost",
    ///     Some("pod:"),
    ///     &RetryConfig::startup(),
    /// ).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(
        connection_string: &str,
        prefix: Option<&str>,
        retry_config: &RetryConfig,
    ) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::BackendUnavailable(e.to_string()))?;

        // Only connecting is retried; individual commands never are.
        let client = &client;
        let connection = retry("redis_connect", retry_config, || async move {
            client.get_multiplexed_async_connection().await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::BackendUnavailable(e.to_string()))?;

        info!(prefix = prefix.unwrap_or(""), "Connected to Redis");

        Ok(Self {
            connection: Mutex::new(Some(connection)),
            prefix: prefix.unwrap_or("").to_string(),
            namespace: AtomicU32::new(0),
        })
    }

    /// Apply the prefix to a key.
    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Clone the connection handle out of the lock; clones share the same
    /// underlying socket and therefore the same watch set.
    fn connection(&self) -> Result<MultiplexedConnection, StorageError> {
        self.connection
            .lock()
            .clone()
            .ok_or_else(|| StorageError::BackendUnavailable("session closed".to_string()))
    }
}

fn backend_err(context: &str, e: redis::RedisError) -> StorageError {
    if e.kind() == redis::ErrorKind::TypeError || e.code() == Some("WRONGTYPE") {
        return StorageError::WrongType { key: context.to_string() };
    }
    StorageError::BackendUnavailable(format!("{}: {}", context, e))
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection()?;
        let key = self.prefixed_key(key);
        conn.exists(&key).await.map_err(|e| backend_err(&key, e))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut conn = self.connection()?;
        let key = self.prefixed_key(key);
        conn.get(&key).await.map_err(|e| backend_err(&key, e))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let key = self.prefixed_key(key);
        conn.set(&key, value).await.map_err(|e| backend_err(&key, e))
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let key = self.prefixed_key(key);
        conn.del(&key).await.map_err(|e| backend_err(&key, e))
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let key = self.prefixed_key(key);
        conn.hset(&key, field, value).await.map_err(|e| backend_err(&key, e))
    }

    async fn hash_delete_field(&self, key: &str, field: &str) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let key = self.prefixed_key(key);
        conn.hdel(&key, field).await.map_err(|e| backend_err(&key, e))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        let mut conn = self.connection()?;
        let key = self.prefixed_key(key);
        conn.hgetall(&key).await.map_err(|e| backend_err(&key, e))
    }

    async fn watch(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let key = self.prefixed_key(key);
        cmd("WATCH")
            .arg(&key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| backend_err(&key, e))
    }

    async fn unwatch(&self) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        cmd("UNWATCH")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| backend_err("UNWATCH", e))
    }

    /// `MULTI` … `EXEC`. A nil `EXEC` reply means a watched key changed and
    /// nothing was applied.
    #[instrument(skip(self, txn), fields(ops = txn.len()))]
    async fn commit(&self, txn: Transaction) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let mut pipeline = pipe();
        pipeline.atomic();

        for op in txn.ops() {
            let key = self.prefixed_key(op.key());
            match op {
                TxOp::Set { value, .. } => {
                    pipeline.set(&key, value.as_slice());
                }
                TxOp::Del { .. } => {
                    pipeline.del(&key);
                }
                TxOp::HashSetField { field, value, .. } => {
                    pipeline.hset(&key, field, value);
                }
                TxOp::HashDeleteField { field, .. } => {
                    pipeline.hdel(&key, field);
                }
            }
        }

        let applied: Option<Vec<redis::Value>> = pipeline
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("EXEC", e))?;

        match applied {
            Some(replies) => {
                // EXEC does not roll back: commands before and after a failed
                // one are applied.
                if let Some(redis::Value::ServerError(err)) = replies
                    .iter()
                    .find(|reply| matches!(reply, redis::Value::ServerError(_)))
                {
                    warn!(error = ?err, "Transaction partially applied");
                    return Err(StorageError::BackendUnavailable(format!("EXEC: {:?}", err)));
                }
                debug!(replies = replies.len(), "Transaction applied");
                Ok(())
            }
            None => {
                let path = txn
                    .ops()
                    .first()
                    .map(|op| op.key().to_string())
                    .unwrap_or_default();
                warn!(path = %path, "EXEC aborted: watched key changed");
                Err(StorageError::TransactionConflict { path })
            }
        }
    }

    async fn select_namespace(&self, index: u32) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        cmd("SELECT")
            .arg(index)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| backend_err("SELECT", e))?;
        self.namespace.store(index, Ordering::SeqCst);
        Ok(())
    }

    fn selected_namespace(&self) -> u32 {
        self.namespace.load(Ordering::SeqCst)
    }

    async fn flush_all(&self) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| backend_err("FLUSHDB", e))
    }

    async fn close(&self) -> Result<(), StorageError> {
        // Dropping the last handle closes the socket.
        if self.connection.lock().take().is_some() {
            info!("Redis session closed");
        }
        Ok(())
    }
}
