//! Tree semantics against the in-process backend.
//!
//! These run without Docker and cover the observable contract: ancestor
//! registration, existence, round-trips, optimistic locking across sessions,
//! and delete behavior.
//!
//! ```bash
//! cargo test --test tree_semantics
//! ```

use std::collections::HashMap;

use tokio::io::AsyncReadExt;

use blob_tree::{BlobTree, Member, MemoryStore, PathKey, StorageError};

fn p(s: &str) -> PathKey {
    PathKey::parse(s).unwrap()
}

async fn members(tree: &BlobTree, path: &str) -> HashMap<String, bool> {
    tree.container(&p(path))
        .unwrap()
        .get_members()
        .await
        .unwrap()
        .into_iter()
        .map(|Member { name, is_container }| (name, is_container))
        .collect()
}

// =============================================================================
// Ancestor registration
// =============================================================================

#[tokio::test]
async fn example_nested_blob() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();

    tree.blob(&p("/a/b/c.txt"))
        .unwrap()
        .set_bytes(&mut scope, b"hello")
        .await
        .unwrap();

    assert_eq!(members(&tree, "/").await.get("a/"), Some(&true));
    assert_eq!(members(&tree, "/a/").await.get("b/"), Some(&true));
    assert_eq!(members(&tree, "/a/b/").await.get("c.txt"), Some(&false));

    let data = tree.blob(&p("/a/b/c.txt")).unwrap().get_bytes(&mut scope).await.unwrap();
    assert_eq!(data.as_deref(), Some(&b"hello"[..]));
}

#[tokio::test]
async fn every_ancestor_lists_next_lower_path() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();
    let path = p("/one/two/three/four/leaf.bin");
    tree.blob(&path).unwrap().set_bytes(&mut scope, b"x").await.unwrap();

    let mut child = path.clone();
    for ancestor in path.ancestors() {
        let listing = members(&tree, &ancestor.to_string()).await;
        let name = child.relative_to(&ancestor).unwrap();
        assert_eq!(listing.get(&name), Some(&child.is_container()), "in {}", ancestor);
        assert_eq!(listing.len(), 1);
        child = ancestor;
    }
}

#[tokio::test]
async fn siblings_share_ancestors() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();
    for path in ["/docs/a.txt", "/docs/b.txt", "/docs/img/c.png"] {
        tree.blob(&p(path)).unwrap().set_bytes(&mut scope, b"x").await.unwrap();
    }

    let docs = members(&tree, "/docs/").await;
    assert_eq!(docs.len(), 3);
    assert_eq!(docs.get("a.txt"), Some(&false));
    assert_eq!(docs.get("img/"), Some(&true));
    assert_eq!(members(&tree, "/").await.len(), 1);
}

#[tokio::test]
async fn top_level_blob_is_listed_in_root() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();
    tree.blob(&p("/readme")).unwrap().set_bytes(&mut scope, b"x").await.unwrap();

    assert_eq!(members(&tree, "/").await.get("readme"), Some(&false));
}

// =============================================================================
// Existence and round-trip
// =============================================================================

#[tokio::test]
async fn exists_lifecycle() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();
    let blob = tree.blob(&p("/x/y")).unwrap();

    assert!(!blob.exists(&mut scope).await.unwrap());
    blob.set_bytes(&mut scope, b"1").await.unwrap();
    assert!(blob.exists(&mut scope).await.unwrap());
    blob.delete(&mut scope).await.unwrap();
    assert!(!blob.exists(&mut scope).await.unwrap());
}

#[tokio::test]
async fn binary_content_roundtrip_via_stream() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();
    let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

    let blob = tree.blob(&p("/bin/data")).unwrap();
    blob.set_data(&mut scope, &content[..]).await.unwrap();

    let mut reader = blob.get_data(&mut scope).await.unwrap().unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, content);
}

#[tokio::test]
async fn absent_blob_reads_none() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();
    let blob = tree.blob(&p("/nothing/here")).unwrap();
    assert!(blob.get_data(&mut scope).await.unwrap().is_none());
}

#[tokio::test]
async fn overwrite_replaces_content() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();
    let blob = tree.blob(&p("/f")).unwrap();
    blob.set_bytes(&mut scope, b"first").await.unwrap();
    blob.set_bytes(&mut scope, b"second").await.unwrap();

    assert_eq!(blob.get_bytes(&mut scope).await.unwrap(), Some(b"second".to_vec()));
}

// =============================================================================
// Optimistic locking
// =============================================================================

#[tokio::test]
async fn watched_blob_conflicts_after_foreign_write() {
    let store = MemoryStore::new();
    let tree_a = BlobTree::new(store.session());
    let tree_b = BlobTree::new(store.session());
    let path = p("/shared/doc.txt");

    let mut scope_a = tree_a.scope();
    let blob_a = tree_a.blob(&path).unwrap();
    assert!(!blob_a.exists(&mut scope_a).await.unwrap());

    tree_b
        .blob(&path)
        .unwrap()
        .set_bytes(&mut tree_b.scope(), b"from b")
        .await
        .unwrap();

    let err = blob_a.set_bytes(&mut scope_a, b"from a").await.unwrap_err();
    assert!(err.is_conflict());

    // B's write survives untouched
    let data = tree_a.blob(&path).unwrap().get_bytes(&mut tree_a.scope()).await.unwrap();
    assert_eq!(data, Some(b"from b".to_vec()));
}

#[tokio::test]
async fn conflicting_delete_is_rejected() {
    let store = MemoryStore::new();
    let tree_a = BlobTree::new(store.session());
    let tree_b = BlobTree::new(store.session());
    let path = p("/shared/doc.txt");
    tree_b.blob(&path).unwrap().set_bytes(&mut tree_b.scope(), b"v1").await.unwrap();

    let mut scope_a = tree_a.scope();
    let blob_a = tree_a.blob(&path).unwrap();
    assert_eq!(blob_a.get_bytes(&mut scope_a).await.unwrap(), Some(b"v1".to_vec()));

    tree_b.blob(&path).unwrap().set_bytes(&mut tree_b.scope(), b"v2").await.unwrap();

    assert!(blob_a.delete(&mut scope_a).await.unwrap_err().is_conflict());
    assert!(blob_a.exists(&mut tree_a.scope()).await.unwrap());
}

#[tokio::test]
async fn retry_after_conflict_succeeds_with_fresh_scope() {
    let store = MemoryStore::new();
    let tree_a = BlobTree::new(store.session());
    let tree_b = BlobTree::new(store.session());
    let path = p("/counter");

    let mut scope = tree_a.scope();
    let blob = tree_a.blob(&path).unwrap();
    blob.exists(&mut scope).await.unwrap();
    tree_b.blob(&path).unwrap().set_bytes(&mut tree_b.scope(), b"1").await.unwrap();
    assert!(blob.set_bytes(&mut scope, b"1").await.unwrap_err().is_conflict());

    // The failed commit released the watch; re-read and write again
    let mut scope = tree_a.scope();
    let current = blob.get_bytes(&mut scope).await.unwrap().unwrap();
    assert_eq!(current, b"1");
    blob.set_bytes(&mut scope, b"2").await.unwrap();
    assert_eq!(blob.get_bytes(&mut tree_a.scope()).await.unwrap(), Some(b"2".to_vec()));
}

#[tokio::test]
async fn unwatched_write_is_last_writer_wins() {
    let store = MemoryStore::new();
    let tree_a = BlobTree::new(store.session());
    let tree_b = BlobTree::new(store.session());
    let path = p("/lww");

    tree_b.blob(&path).unwrap().set_bytes(&mut tree_b.scope(), b"b").await.unwrap();
    // set_data arms its own watch immediately before the commit
    tree_a.blob(&path).unwrap().set_bytes(&mut tree_a.scope(), b"a").await.unwrap();

    let data = tree_b.blob(&path).unwrap().get_bytes(&mut tree_b.scope()).await.unwrap();
    assert_eq!(data, Some(b"a".to_vec()));
}

#[tokio::test]
async fn scope_watch_on_other_path_interferes() {
    let store = MemoryStore::new();
    let tree_a = BlobTree::new(store.session());
    let tree_b = BlobTree::new(store.session());

    let mut scope = tree_a.scope();
    tree_a.blob(&p("/one")).unwrap().exists(&mut scope).await.unwrap();
    tree_b.blob(&p("/one")).unwrap().set_bytes(&mut tree_b.scope(), b"x").await.unwrap();

    // The same scope still carries the watch on /one
    let err = tree_a
        .blob(&p("/two"))
        .unwrap()
        .set_bytes(&mut scope, b"y")
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn scope_reset_drops_stale_watch() {
    let store = MemoryStore::new();
    let tree_a = BlobTree::new(store.session());
    let tree_b = BlobTree::new(store.session());
    let path = p("/doc");

    let mut scope = tree_a.scope();
    let blob = tree_a.blob(&path).unwrap();
    blob.exists(&mut scope).await.unwrap();
    tree_b.blob(&path).unwrap().set_bytes(&mut tree_b.scope(), b"b").await.unwrap();

    scope.reset(tree_a.backend()).await.unwrap();
    blob.set_bytes(&mut scope, b"a").await.unwrap();
}

#[tokio::test]
async fn scope_watches_same_path_again_after_namespace_switch() {
    let store = MemoryStore::new();
    let tree_a = BlobTree::new(store.session());
    let tree_b = BlobTree::new(store.session());
    let path = p("/doc");

    let mut scope = tree_a.scope();
    let blob = tree_a.blob(&path).unwrap();
    assert!(!blob.exists(&mut scope).await.unwrap());

    tree_a.select_namespace(1).await.unwrap();
    assert!(!blob.exists(&mut scope).await.unwrap());

    tree_b.select_namespace(1).await.unwrap();
    tree_b.blob(&path).unwrap().set_bytes(&mut tree_b.scope(), b"from b").await.unwrap();

    assert!(blob.set_bytes(&mut scope, b"from a").await.unwrap_err().is_conflict());
    assert_eq!(
        blob.get_bytes(&mut tree_a.scope()).await.unwrap(),
        Some(b"from b".to_vec())
    );
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn blob_delete_unlinks_only_from_parent() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();
    tree.blob(&p("/a/b/c.txt")).unwrap().set_bytes(&mut scope, b"x").await.unwrap();

    tree.blob(&p("/a/b/c.txt")).unwrap().delete(&mut scope).await.unwrap();

    assert!(members(&tree, "/a/b/").await.is_empty());
    assert_eq!(members(&tree, "/a/").await.get("b/"), Some(&true));
    assert_eq!(members(&tree, "/").await.get("a/"), Some(&true));
    // The emptied parent has no listing left, but is still listed above
    assert!(!tree.container(&p("/a/b/")).unwrap().exists().await.unwrap());
}

#[tokio::test]
async fn container_delete_requires_empty() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();
    tree.blob(&p("/a/b/c.txt")).unwrap().set_bytes(&mut scope, b"x").await.unwrap();

    let err = tree.container(&p("/a/")).unwrap().delete(&mut scope).await.unwrap_err();
    assert!(matches!(err, StorageError::ContainerNotEmpty { ref path } if path == "/a/"));
}

#[tokio::test]
async fn refused_container_delete_leaves_no_watch_behind() {
    let store = MemoryStore::new();
    let tree_a = BlobTree::new(store.session());
    let tree_b = BlobTree::new(store.session());
    tree_a.blob(&p("/d/x")).unwrap().set_bytes(&mut tree_a.scope(), b"x").await.unwrap();

    let mut scope = tree_a.scope();
    let err = tree_a.container(&p("/d/")).unwrap().delete(&mut scope).await.unwrap_err();
    assert!(matches!(err, StorageError::ContainerNotEmpty { .. }));
    assert_eq!(scope.armed_count(), 0);

    // A foreign write to the refused container must not leak into an
    // unrelated commit on the same session
    tree_b.blob(&p("/d/y")).unwrap().set_bytes(&mut tree_b.scope(), b"y").await.unwrap();
    tree_a.blob(&p("/other")).unwrap().set_bytes(&mut tree_a.scope(), b"o").await.unwrap();

    assert_eq!(members(&tree_a, "/").await.get("other"), Some(&false));
}

#[tokio::test]
async fn emptied_container_can_be_removed_bottom_up() {
    let tree = BlobTree::in_memory();
    let mut scope = tree.scope();
    tree.blob(&p("/a/b/c.txt")).unwrap().set_bytes(&mut scope, b"x").await.unwrap();

    tree.blob(&p("/a/b/c.txt")).unwrap().delete(&mut scope).await.unwrap();
    tree.container(&p("/a/b/")).unwrap().delete(&mut scope).await.unwrap();
    assert!(members(&tree, "/a/").await.is_empty());
    tree.container(&p("/a/")).unwrap().delete(&mut scope).await.unwrap();

    assert!(members(&tree, "/").await.is_empty());
}

#[tokio::test]
async fn container_delete_conflicts_with_stale_scope() {
    let store = MemoryStore::new();
    let tree_a = BlobTree::new(store.session());
    let tree_b = BlobTree::new(store.session());

    let mut scope = tree_a.scope();
    tree_a.blob(&p("/seen")).unwrap().exists(&mut scope).await.unwrap();
    tree_b.blob(&p("/seen")).unwrap().set_bytes(&mut tree_b.scope(), b"x").await.unwrap();

    let err = tree_a.container(&p("/empty/")).unwrap().delete(&mut scope).await.unwrap_err();
    assert!(matches!(err, StorageError::TransactionConflict { ref path } if path == "/empty/"));
    assert_eq!(scope.armed_count(), 0);
}

#[tokio::test]
async fn container_delete_refuses_concurrently_populated_container() {
    let store = MemoryStore::new();
    let tree_a = BlobTree::new(store.session());
    let tree_b = BlobTree::new(store.session());
    let container = tree_a.container(&p("/inbox/")).unwrap();

    tree_b.blob(&p("/inbox/new")).unwrap().set_bytes(&mut tree_b.scope(), b"x").await.unwrap();

    assert!(matches!(
        container.delete(&mut tree_a.scope()).await,
        Err(StorageError::ContainerNotEmpty { .. })
    ));
    assert_eq!(members(&tree_a, "/").await.get("inbox/"), Some(&true));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn namespaces_isolate_trees() {
    let store = MemoryStore::new();
    let tree = BlobTree::new(store.session());
    let mut scope = tree.scope();
    tree.blob(&p("/a")).unwrap().set_bytes(&mut scope, b"ns0").await.unwrap();

    tree.select_namespace(1).await.unwrap();
    assert!(!tree.blob(&p("/a")).unwrap().exists(&mut scope).await.unwrap());
    tree.flush_all().await.unwrap();

    tree.select_namespace(0).await.unwrap();
    assert_eq!(
        tree.blob(&p("/a")).unwrap().get_bytes(&mut scope).await.unwrap(),
        Some(b"ns0".to_vec())
    );
}

#[tokio::test]
async fn operations_after_shutdown_fail() {
    let store = MemoryStore::new();
    let session = store.session();
    let tree = BlobTree::new(store.session());
    tree.shutdown().await.unwrap();

    // A fresh tree on the same store still works
    let tree = BlobTree::new(session);
    let mut scope = tree.scope();
    tree.blob(&p("/a")).unwrap().set_bytes(&mut scope, b"x").await.unwrap();

    tree.backend().close().await.unwrap();
    let err = tree.blob(&p("/a")).unwrap().exists(&mut scope).await.unwrap_err();
    assert!(matches!(err, StorageError::BackendUnavailable(_)));
}
