// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for a blob tree session.
//!
//! # Example
//!
//! ```
//! use blob_tree::BlobTreeConfig;
//!
//! // Minimal config (uses defaults)
//! let config = BlobTreeConfig::default();
//! assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
//!
//! // Full config
//! let config = BlobTreeConfig {
//!     redis_url: "redis://localhost:6379".into(),
//!     namespace: Some(2),
//!     key_prefix: Some("pod:".into()),
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

use crate::resilience::retry::RetryConfig;

/// Configuration for connecting a [`BlobTree`](crate::BlobTree) to Redis.
#[derive(Debug, Clone, Deserialize)]
pub struct BlobTreeConfig {
    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Database index selected right after connecting
    #[serde(default)]
    pub namespace: Option<u32>,

    /// Prefix prepended to every key (not to hash fields)
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Connection attempts before giving up (default: 5)
    #[serde(default = "default_connect_max_retries")]
    pub connect_max_retries: usize,
}

fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_connect_max_retries() -> usize { 5 }

impl Default for BlobTreeConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            namespace: None,
            key_prefix: None,
            connect_max_retries: default_connect_max_retries(),
        }
    }
}

impl BlobTreeConfig {
    /// Backoff schedule for the initial connection.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        match self.connect_max_retries {
            0 | 1 => RetryConfig::no_retry(),
            n => RetryConfig::with_max_retries(n),
        }
    }
}
