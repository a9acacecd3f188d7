//! Automatic collection tests
//!
//! Creating a snapshot schedules a collection on the Tokio blocking pool once
//! the live generation has run more than `collect_min_gen_delta` past the
//! last floor. Nothing is scheduled when auto-collect is off, below the
//! threshold, or without a runtime.

mod common;

use std::sync::Arc;
use std::time::Duration;

use nucache::content::NodeId;
use nucache::service::PublishedSnapshotService;
use nucache::source::MemoryContentSource;
use nucache::writer::{ChangeKind, ContentChange};
use tempfile::TempDir;

use common::{published, service_with};

const EDITS: usize = 4;

/// A started service whose live generation is `EDITS` generations past the
/// one the startup rebuild committed.
fn edited_service(
    dir: &TempDir,
    auto_collect: bool,
    min_gen_delta: u64,
) -> PublishedSnapshotService {
    let source = Arc::new(MemoryContentSource::from_nodes([
        published(1, &[], "home"),
        published(2, &[1], "about"),
    ]));
    let service = service_with(dir, source.clone(), |config| {
        config.auto_collect = auto_collect;
        config.collect_min_gen_delta = min_gen_delta;
    });
    service.load_on_startup().unwrap();

    for i in 0..EDITS {
        source.upsert(published(2, &[1], &format!("about v{}", i)));
        let report = service
            .notify(&[ContentChange::new(NodeId::new(2), ChangeKind::Save)])
            .unwrap();
        assert!(report.committed);
    }
    service
}

async fn wait_for_collections(service: &PublishedSnapshotService, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.metrics().collections < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("background collection did not run");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshot_past_threshold_collects_in_background() {
    let dir = TempDir::new().unwrap();
    let service = edited_service(&dir, true, 2);
    let before = service.status();
    assert!(before.entry_count > before.node_count);

    let snapshot = service.create_snapshot(false);
    let pinned = snapshot.generation();
    drop(snapshot);
    wait_for_collections(&service, 1).await;

    let after = service.status();
    assert_eq!(after.last_floor, pinned);
    assert_eq!(after.entry_count, after.node_count);
    assert_eq!(service.metrics().collections, 1);

    // The floor caught up, so the next snapshot schedules nothing.
    drop(service.create_snapshot(false));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.metrics().collections, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disabled_auto_collect_schedules_nothing() {
    let dir = TempDir::new().unwrap();
    let service = edited_service(&dir, false, 2);
    let before = service.status();

    drop(service.create_snapshot(false));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(service.metrics().collections, 0);
    let after = service.status();
    assert_eq!(after.last_floor, before.last_floor);
    assert_eq!(after.entry_count, before.entry_count);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_below_threshold_schedules_nothing() {
    let dir = TempDir::new().unwrap();
    let service = edited_service(&dir, true, 100);

    drop(service.create_snapshot(false));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(service.metrics().collections, 0);
}

#[test]
fn test_without_runtime_snapshot_does_not_collect() {
    let dir = TempDir::new().unwrap();
    let service = edited_service(&dir, true, 2);
    let before = service.status();

    let snapshot = service.create_snapshot(false);
    assert_eq!(snapshot.generation(), before.live_generation);
    drop(snapshot);

    assert_eq!(service.metrics().collections, 0);
    assert_eq!(service.status().entry_count, before.entry_count);

    // An explicit collection still works.
    let report = service.collect();
    assert_eq!(report.floor, before.live_generation);
    assert_eq!(service.status().entry_count, before.node_count);
}
