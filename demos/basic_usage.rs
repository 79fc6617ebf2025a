// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic blob-tree usage example.
//!
//! Demonstrates:
//! 1. Opening a tree (Redis if `REDIS_URL` is set, in-memory otherwise)
//! 2. Writing blobs with implicit ancestor containers
//! 3. Listing container members
//! 4. Reading a blob back as a stream
//! 5. A lost-update conflict between two sessions
//! 6. Deleting and clean shutdown
//! 7. Displaying captured metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! REDIS_URL=redis://localhost:6379 cargo run --example basic_usage
//! ```

use blob_tree::{BlobTree, BlobTreeConfig, MemoryStore, PathKey};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tokio::io::AsyncReadExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures everything for the final dump)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             blob-tree: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Open the tree
    // ─────────────────────────────────────────────────────────────────────────
    let store = MemoryStore::new();
    let (tree, other) = match std::env::var("REDIS_URL") {
        Ok(url) => {
            println!("📦 Connecting to {}...", url);
            let config = BlobTreeConfig {
                redis_url: url,
                key_prefix: Some("demo:".into()),
                ..Default::default()
            };
            let tree = BlobTree::connect(&config).await?;
            tree.flush_all().await?;
            (tree, BlobTree::connect(&config).await?)
        }
        Err(_) => {
            println!("📦 REDIS_URL not set, using the in-memory backend");
            (BlobTree::new(store.session()), BlobTree::new(store.session()))
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Write a few blobs
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Writing blobs...");
    let entries: [(&str, &[u8]); 4] = [
        ("/a/b/c.txt", b"hello"),
        ("/a/b/d.txt", b"world"),
        ("/a/notes.md", b"# notes"),
        ("/readme", b"top level"),
    ];

    let mut scope = tree.scope();
    for (path, data) in entries {
        tree.blob(&PathKey::parse(path)?)?.set_bytes(&mut scope, data).await?;
        println!("   └─ {} ({} bytes)", path, data.len());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. List containers
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📂 Listing containers...");
    for path in ["/", "/a/", "/a/b/"] {
        let mut members = tree.container(&PathKey::parse(path)?)?.get_members().await?;
        members.sort_by(|x, y| x.name.cmp(&y.name));
        println!("   {}", path);
        for member in members {
            let icon = if member.is_container { "📁" } else { "📄" };
            println!("   │  └─ {} {}", icon, member.name);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Stream a blob back
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📥 Reading /a/b/c.txt...");
    let blob = tree.blob(&PathKey::parse("/a/b/c.txt")?)?;
    if let Some(mut reader) = blob.get_data(&mut tree.scope()).await? {
        let mut text = String::new();
        reader.read_to_string(&mut text).await?;
        println!("   └─ {:?}", text);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Lost-update protection
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔒 Two sessions updating the same blob...");
    let mut scope = tree.scope();
    let current = blob.get_bytes(&mut scope).await?;
    println!("   ├─ session A read {:?}", current.as_deref().map(String::from_utf8_lossy));

    other
        .blob(blob.path())?
        .set_bytes(&mut other.scope(), b"written by B")
        .await?;
    println!("   ├─ session B wrote in between");

    match blob.set_bytes(&mut scope, b"written by A").await {
        Err(e) if e.is_conflict() => println!("   └─ ✅ session A rejected: {}", e),
        Err(e) => return Err(e.into()),
        Ok(()) => println!("   └─ ⚠️  session A was not rejected"),
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Delete and shut down
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🗑️  Deleting /a/b/c.txt and /a/b/d.txt...");
    let mut scope = tree.scope();
    for path in ["/a/b/c.txt", "/a/b/d.txt"] {
        tree.blob(&PathKey::parse(path)?)?.delete(&mut scope).await?;
    }
    tree.container(&PathKey::parse("/a/b/")?)?.delete(&mut scope).await?;
    let remaining = tree.container(&PathKey::parse("/a/")?)?.get_members().await?;
    println!("   └─ /a/ now holds {} member(s)", remaining.len());

    other.shutdown().await?;
    tree.shutdown().await?;
    println!("\n👋 Shut down");

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    Ok(())
}

/// Dump all captured metrics
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(_) => {}
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let max = samples.iter().map(|v| v.into_inner()).fold(f64::NEG_INFINITY, f64::max);
                histograms.push((name, label_str, count, sum, max));
            }
        }
    }

    counters.sort();
    histograms.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }

    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, sum, max) in &histograms {
            println!("      └─ {}{} count={} sum={:.4} max={:.4}", name, labels, count, sum, max);
        }
    }

    if counters.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
