// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process key-value backend with Redis transaction semantics.
//!
//! A [`MemoryStore`] holds the data (numbered namespaces, like Redis
//! databases). Each [`MemoryBackend`] obtained from [`MemoryStore::session`]
//! behaves like one Redis connection: it has its own selected namespace and
//! its own watch set.
//!
//! Watches are implemented with per-key versions: every write stamps the
//! key with the next value of a store-wide clock, a watch remembers the
//! stamp it saw, and commit refuses to apply if any remembered stamp is
//! stale.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::traits::{KvBackend, StorageError, Transaction, TxOp};

#[derive(Debug, Clone)]
enum Entry {
    Scalar(Vec<u8>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Scalar,
    Hash,
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    /// Last write stamp per key. Kept after deletion so a delete followed by
    /// a re-create still invalidates an older watch.
    versions: HashMap<String, u64>,
}

impl Keyspace {
    fn kind(&self, key: &str) -> Option<Kind> {
        self.entries.get(key).map(|e| match e {
            Entry::Scalar(_) => Kind::Scalar,
            Entry::Hash(_) => Kind::Hash,
        })
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    namespaces: HashMap<u32, Keyspace>,
    clock: u64,
}

impl StoreInner {
    fn touch(&mut self, namespace: u32, key: &str) {
        self.clock += 1;
        let stamp = self.clock;
        self.namespaces
            .entry(namespace)
            .or_default()
            .versions
            .insert(key.to_string(), stamp);
    }

    fn keyspace(&self, namespace: u32) -> Option<&Keyspace> {
        self.namespaces.get(&namespace)
    }

    fn keyspace_mut(&mut self, namespace: u32) -> &mut Keyspace {
        self.namespaces.entry(namespace).or_default()
    }

    fn apply(&mut self, namespace: u32, op: &TxOp) -> Result<(), StorageError> {
        match op {
            TxOp::Set { key, value } => {
                self.keyspace_mut(namespace)
                    .entries
                    .insert(key.clone(), Entry::Scalar(value.clone()));
                self.touch(namespace, key);
            }
            TxOp::Del { key } => {
                if self.keyspace_mut(namespace).entries.remove(key).is_some() {
                    self.touch(namespace, key);
                }
            }
            TxOp::HashSetField { key, field, value } => {
                let ks = self.keyspace_mut(namespace);
                match ks.entries.entry(key.clone()).or_insert_with(|| Entry::Hash(HashMap::new())) {
                    Entry::Hash(fields) => {
                        fields.insert(field.clone(), value.clone());
                    }
                    Entry::Scalar(_) => return Err(StorageError::WrongType { key: key.clone() }),
                }
                self.touch(namespace, key);
            }
            TxOp::HashDeleteField { key, field } => {
                let ks = self.keyspace_mut(namespace);
                let removed = match ks.entries.get_mut(key) {
                    None => false,
                    Some(Entry::Scalar(_)) => return Err(StorageError::WrongType { key: key.clone() }),
                    Some(Entry::Hash(fields)) => {
                        let removed = fields.remove(field).is_some();
                        // A hash with no fields does not exist.
                        if fields.is_empty() {
                            ks.entries.remove(key);
                        }
                        removed
                    }
                };
                if removed {
                    self.touch(namespace, key);
                }
            }
        }
        Ok(())
    }

    /// Type-check a batch against the keyspace as it would evolve, so a
    /// commit either applies fully or not at all.
    fn check_types(&self, namespace: u32, ops: &[TxOp]) -> Result<(), StorageError> {
        let empty = Keyspace::default();
        let ks = self.keyspace(namespace).unwrap_or(&empty);
        let mut overlay: HashMap<&str, Option<Kind>> = HashMap::new();

        for op in ops {
            let key = op.key();
            let current = overlay.get(key).copied().unwrap_or_else(|| ks.kind(key));
            let next = match op {
                TxOp::Set { .. } => Some(Kind::Scalar),
                TxOp::Del { .. } => None,
                TxOp::HashSetField { .. } | TxOp::HashDeleteField { .. } => {
                    if current == Some(Kind::Scalar) {
                        return Err(StorageError::WrongType { key: key.to_string() });
                    }
                    match op {
                        TxOp::HashSetField { .. } => Some(Kind::Hash),
                        _ => current,
                    }
                }
            };
            overlay.insert(key, next);
        }
        Ok(())
    }
}

/// Shared in-process data for any number of [`MemoryBackend`] sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session (the in-process analogue of a connection).
    #[must_use]
    pub fn session(&self) -> MemoryBackend {
        MemoryBackend {
            store: self.inner.clone(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Number of keys in a namespace
    #[must_use]
    pub fn len(&self, namespace: u32) -> usize {
        self.inner
            .lock()
            .keyspace(namespace)
            .map_or(0, |ks| ks.entries.len())
    }

    /// Check if a namespace holds no keys
    #[must_use]
    pub fn is_empty(&self, namespace: u32) -> bool {
        self.len(namespace) == 0
    }
}

#[derive(Debug, Default)]
struct SessionState {
    namespace: u32,
    /// (namespace, key) -> version observed when the watch was issued
    watched: HashMap<(u32, String), u64>,
    closed: bool,
}

/// One session over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryBackend {
    store: Arc<Mutex<StoreInner>>,
    state: Mutex<SessionState>,
}

impl MemoryBackend {
    /// Convenience: a session over a fresh, private store.
    #[must_use]
    pub fn new() -> Self {
        MemoryStore::new().session()
    }

    fn namespace(&self) -> Result<u32, StorageError> {
        let state = self.state.lock();
        if state.closed {
            return Err(StorageError::BackendUnavailable("session closed".to_string()));
        }
        Ok(state.namespace)
    }

    fn write(&self, op: TxOp) -> Result<(), StorageError> {
        let ns = self.namespace()?;
        let mut store = self.store.lock();
        store.check_types(ns, std::slice::from_ref(&op))?;
        store.apply(ns, &op)
    }

    /// Keys currently watched by this session
    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.state.lock().watched.len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let ns = self.namespace()?;
        let store = self.store.lock();
        Ok(store
            .keyspace(ns)
            .is_some_and(|ks| ks.entries.contains_key(key)))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let ns = self.namespace()?;
        let store = self.store.lock();
        match store.keyspace(ns).and_then(|ks| ks.entries.get(key)) {
            None => Ok(None),
            Some(Entry::Scalar(bytes)) => Ok(Some(bytes.clone())),
            Some(Entry::Hash(_)) => Err(StorageError::WrongType { key: key.to_string() }),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.write(TxOp::Set { key: key.to_string(), value: value.to_vec() })
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        self.write(TxOp::Del { key: key.to_string() })
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        self.write(TxOp::HashSetField {
            key: key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        })
    }

    async fn hash_delete_field(&self, key: &str, field: &str) -> Result<(), StorageError> {
        self.write(TxOp::HashDeleteField { key: key.to_string(), field: field.to_string() })
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        let ns = self.namespace()?;
        let store = self.store.lock();
        match store.keyspace(ns).and_then(|ks| ks.entries.get(key)) {
            None => Ok(HashMap::new()),
            Some(Entry::Hash(fields)) => Ok(fields.clone()),
            Some(Entry::Scalar(_)) => Err(StorageError::WrongType { key: key.to_string() }),
        }
    }

    async fn watch(&self, key: &str) -> Result<(), StorageError> {
        let ns = self.namespace()?;
        let version = self.store.lock().keyspace(ns).map_or(0, |ks| ks.version(key));
        self.state.lock().watched.insert((ns, key.to_string()), version);
        Ok(())
    }

    async fn unwatch(&self) -> Result<(), StorageError> {
        self.namespace()?;
        self.state.lock().watched.clear();
        Ok(())
    }

    async fn commit(&self, txn: Transaction) -> Result<(), StorageError> {
        let ns = self.namespace()?;
        let watched = std::mem::take(&mut self.state.lock().watched);

        let mut store = self.store.lock();
        let stale = watched.iter().find(|((wns, key), seen)| {
            store.keyspace(*wns).map_or(0, |ks| ks.version(key)) != **seen
        });
        if let Some(((_, key), _)) = stale {
            debug!(key = %key, "Watched key changed, discarding transaction");
            return Err(StorageError::TransactionConflict { path: key.clone() });
        }

        store.check_types(ns, txn.ops())?;
        for op in txn.ops() {
            store.apply(ns, op)?;
        }
        Ok(())
    }

    async fn select_namespace(&self, index: u32) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(StorageError::BackendUnavailable("session closed".to_string()));
        }
        state.namespace = index;
        Ok(())
    }

    fn selected_namespace(&self) -> u32 {
        self.state.lock().namespace
    }

    async fn flush_all(&self) -> Result<(), StorageError> {
        let ns = self.namespace()?;
        let mut store = self.store.lock();
        let keys: Vec<String> = store
            .keyspace(ns)
            .map(|ks| ks.entries.keys().cloned().collect())
            .unwrap_or_default();
        for key in &keys {
            store.touch(ns, key);
        }
        store.keyspace_mut(ns).entries.clear();
        debug!(namespace = ns, keys = keys.len(), "Flushed namespace");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.closed = true;
        state.watched.clear();
        Ok(())
    }
}
