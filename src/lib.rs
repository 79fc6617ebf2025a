//! # Blob Tree
//!
//! A hierarchical storage layer of blobs (leaf documents) inside containers
//! (directories), built on a flat key-value store, with optimistic locking
//! against lost updates.
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         BlobTree                            │
//! │  • Owns one backend session                                 │
//! │  • Hands out Blob / Container handles bound to a PathKey    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!            WatchScope (per request: which keys are WATCHed)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        KvBackend                            │
//! │  • exists / get / set / del                                 │
//! │  • hash set / delete / get-all                              │
//! │  • watch → transaction → commit (or TransactionConflict)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              RedisBackend  ──┴──  MemoryBackend
//! ```
//!
//! Persisted layout: one STRING per blob (`/a/b/c.txt` → bytes) and one HASH
//! per container (`/a/b/` → `{"/a/b/c.txt": "false"}`). Writing a blob
//! registers it in its parent and every ancestor up to `/` in the same
//! transaction.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blob_tree::{BlobTree, BlobTreeConfig, PathKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), blob_tree::StorageError> {
//!     let config = BlobTreeConfig {
//!         redis_url: "redis://localhost:6379".into(),
//!         ..Default::default()
//!     };
//!     let tree = BlobTree::connect(&config).await?;
//!
//!     let mut scope = tree.scope();
//!     let blob = tree.blob(&PathKey::parse("/a/b/c.txt")?)?;
//!     blob.set_bytes(&mut scope, b"hello").await?;
//!
//!     for member in tree.container(&PathKey::parse("/a/")?)?.get_members().await? {
//!         println!("{} (container: {})", member.name, member.is_container);
//!     }
//!
//!     tree.shutdown().await
//! }
//! ```
//!
//! ## Concurrency
//!
//! Watches are per session. A conflicting write between the first access
//! through a [`WatchScope`] and the commit makes the commit fail with
//! [`StorageError::TransactionConflict`]; nothing is retried here.
//!
//! ## Modules
//!
//! - [`path`]: canonical [`PathKey`]s
//! - [`storage`]: the [`KvBackend`] contract, Redis and in-memory backends
//! - [`tree`]: [`BlobTree`], [`Blob`], [`Container`], [`WatchScope`]
//! - [`resilience`]: connection retry
//! - [`metrics`]: operation counters and latencies

pub mod config;
pub mod path;
pub mod storage;
pub mod tree;
pub mod resilience;
pub mod metrics;

pub use config::BlobTreeConfig;
pub use path::PathKey;
pub use storage::memory::{MemoryBackend, MemoryStore};
pub use storage::redis::RedisBackend;
pub use storage::traits::{KvBackend, StorageError, Transaction, TxOp};
pub use tree::{Blob, BlobReader, BlobTree, Container, Member, WatchScope};
pub use resilience::retry::RetryConfig;
