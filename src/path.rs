// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Canonical hierarchical paths.
//!
//! A path is a list of segments under the root `/`. Container paths end in
//! a slash, blob paths do not:
//!
//! ```text
//! /                 root container
//! /a/b/             container
//! /a/b/c.txt        blob
//! ```
//!
//! The hierarchy is derived from the string alone; the key-value store only
//! ever sees the canonical form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::storage::traits::StorageError;

/// A canonical path into the blob tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathKey {
    segments: Vec<String>,
    container: bool,
}

fn validate_segment(segment: &str) -> Result<(), StorageError> {
    if segment.is_empty() {
        return Err(StorageError::InvalidPath("empty path segment".to_string()));
    }
    if segment.contains('/') {
        return Err(StorageError::InvalidPath(format!("segment '{}' contains '/'", segment)));
    }
    if segment == "." || segment == ".." {
        return Err(StorageError::InvalidPath(format!("relative segment '{}'", segment)));
    }
    Ok(())
}

impl PathKey {
    /// The root container `/`.
    #[must_use]
    pub fn root() -> Self {
        Self { segments: Vec::new(), container: true }
    }

    /// Parse a canonical path string.
    ///
    /// `/a/b/` is a container, `/a/b` a blob, `/` the root.
    pub fn parse(path: &str) -> Result<Self, StorageError> {
        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| StorageError::InvalidPath(format!("'{}' is not absolute", path)))?;
        if rest.is_empty() {
            return Ok(Self::root());
        }

        let (body, container) = match rest.strip_suffix('/') {
            Some(body) => (body, true),
            None => (rest, false),
        };
        Self::from_segments(body.split('/'), container)
    }

    /// Build a path from its segments. An empty segment list is only valid
    /// for the root container.
    pub fn from_segments<I, S>(segments: I, is_container: bool) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            validate_segment(segment)?;
        }
        if segments.is_empty() && !is_container {
            return Err(StorageError::InvalidPath("the root is a container".to_string()));
        }
        Ok(Self { segments, container: is_container })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_container(&self) -> bool {
        self.container
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The container one level up.
    pub fn to_parent(&self) -> Result<PathKey, StorageError> {
        match self.segments.split_last() {
            Some((_, parent)) => Ok(Self { segments: parent.to_vec(), container: true }),
            None => Err(StorageError::InvalidOperation("the root has no parent".to_string())),
        }
    }

    /// Every ancestor container, nearest first, ending with the root.
    /// Empty for the root itself.
    ///
    /// `/a/b/c.txt` -> `[/a/b/, /a/, /]`
    pub fn ancestors(&self) -> Vec<PathKey> {
        (0..self.segments.len())
            .rev()
            .map(|depth| Self { segments: self.segments[..depth].to_vec(), container: true })
            .collect()
    }

    /// A blob directly inside this container.
    pub fn child_blob(&self, name: &str) -> Result<PathKey, StorageError> {
        self.child(name, false)
    }

    /// A container directly inside this container.
    pub fn child_container(&self, name: &str) -> Result<PathKey, StorageError> {
        self.child(name, true)
    }

    fn child(&self, name: &str, container: bool) -> Result<PathKey, StorageError> {
        if !self.container {
            return Err(StorageError::InvalidOperation(format!("'{}' is not a container", self)));
        }
        validate_segment(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments, container })
    }

    /// The member name of this path inside `container`, e.g. `b/` for
    /// `/a/b/` in `/a/`. `None` when `container` is not the direct parent.
    pub fn relative_to(&self, container: &PathKey) -> Option<String> {
        match self.to_parent() {
            Ok(parent) if &parent == container => {
                let full = self.to_string();
                full.strip_prefix(&container.to_string()).map(str::to_string)
            }
            _ => None,
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/")?;
        f.write_str(&self.segments.join("/"))?;
        if self.container && !self.segments.is_empty() {
            f.write_str("/")?;
        }
        Ok(())
    }
}

impl FromStr for PathKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathKey {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PathKey> for String {
    fn from(path: PathKey) -> Self {
        path.to_string()
    }
}
