// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Item not found")]
    NotFound,
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Transaction conflict on '{path}': a watched key changed before commit")]
    TransactionConflict { path: String },
    #[error("Wrong type for key '{key}'")]
    WrongType { key: String },
    #[error("Container '{path}' is not empty")]
    ContainerNotEmpty { path: String },
    #[error("Failed to read blob input: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True when a commit was rejected because a watched key changed.
    /// Callers own the retry policy for this outcome.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::TransactionConflict { .. })
    }
}

/// A single command staged inside a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOp {
    Set { key: String, value: Vec<u8> },
    Del { key: String },
    HashSetField { key: String, field: String, value: String },
    HashDeleteField { key: String, field: String },
}

impl TxOp {
    /// The key this command writes to.
    pub fn key(&self) -> &str {
        match self {
            TxOp::Set { key, .. }
            | TxOp::Del { key }
            | TxOp::HashSetField { key, .. }
            | TxOp::HashDeleteField { key, .. } => key,
        }
    }
}

/// Batched command builder. Nothing runs until it is handed to
/// [`KvBackend::commit`], which applies every staged command or none.
#[derive(Debug, Default, Clone)]
pub struct Transaction {
    ops: Vec<TxOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(TxOp::Set { key: key.into(), value: value.into() });
        self
    }

    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(TxOp::Del { key: key.into() });
        self
    }

    pub fn hash_set_field(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.ops.push(TxOp::HashSetField {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn hash_delete_field(&mut self, key: impl Into<String>, field: impl Into<String>) -> &mut Self {
        self.ops.push(TxOp::HashDeleteField { key: key.into(), field: field.into() });
        self
    }

    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// One session against a transactional key-value store.
///
/// Watches are session state: [`watch`](KvBackend::watch) observes a key
/// for this session only, and the next [`commit`](KvBackend::commit) on the
/// same session fails with [`StorageError::TransactionConflict`] if any
/// watched key was written in between, by anyone. Every commit clears the
/// session's watches whether it applied or not.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    async fn del(&self, key: &str) -> Result<(), StorageError>;

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError>;
    async fn hash_delete_field(&self, key: &str, field: &str) -> Result<(), StorageError>;
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError>;

    async fn watch(&self, key: &str) -> Result<(), StorageError>;
    async fn unwatch(&self) -> Result<(), StorageError>;

    /// Start an empty transaction for this session.
    fn transaction(&self) -> Transaction {
        Transaction::new()
    }

    /// Apply all staged commands atomically, or none of them if a watched
    /// key changed.
    async fn commit(&self, txn: Transaction) -> Result<(), StorageError>;

    async fn select_namespace(&self, index: u32) -> Result<(), StorageError>;

    /// Namespace the session currently operates in. Watches are bound to it.
    fn selected_namespace(&self) -> u32;

    /// Wipe every key in the currently selected namespace.
    async fn flush_all(&self) -> Result<(), StorageError>;

    async fn close(&self) -> Result<(), StorageError>;
}
