// Async consumers: `changes()` streams and the version watch.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_stream::StreamExt;

use watchmap_core::{Change, ObservableStore, StoreConfig};

#[tokio::test]
async fn stream_yields_changes_in_commit_order() {
    let store: ObservableStore<&'static str, u32> = ObservableStore::new();
    let mut changes = store.changes();

    store.put("a", 1);
    store.put("a", 2);
    store.remove("a");
    store.remove("a");

    assert_eq!(
        changes.changed().await,
        Some(Change::AddedOrUpdated { key: "a", value: 1 })
    );
    assert_eq!(
        changes.changed().await,
        Some(Change::AddedOrUpdated { key: "a", value: 2 })
    );
    assert_eq!(
        changes.changed().await,
        Some(Change::Removed { key: "a", value: 2 })
    );
}

#[tokio::test]
async fn stream_ends_when_store_is_dropped() {
    let store: ObservableStore<u8, u8> = ObservableStore::new();
    let changes = store.changes();

    store.put(1, 1);
    drop(store);

    let collected: Vec<_> = changes.collect().await;
    assert_eq!(collected, vec![Change::AddedOrUpdated { key: 1, value: 1 }]);
}

#[tokio::test]
async fn stream_does_not_replay_earlier_changes() {
    let store: ObservableStore<u8, u8> = ObservableStore::new();
    store.put(1, 1);

    let mut changes = store.changes();
    store.put(2, 2);

    assert_eq!(
        changes.next().await,
        Some(Change::AddedOrUpdated { key: 2, value: 2 })
    );
}

#[tokio::test]
async fn lagging_stream_skips_oldest_changes() {
    let store: ObservableStore<u8, u8> = ObservableStore::with_config(StoreConfig {
        change_buffer: 2,
        ..StoreConfig::named("lagging")
    });
    let mut changes = store.changes();

    for i in 0..5 {
        store.put(i, i);
    }

    // Only the newest `change_buffer` entries survive.
    assert_eq!(
        changes.next().await,
        Some(Change::AddedOrUpdated { key: 3, value: 3 })
    );
    assert_eq!(
        changes.next().await,
        Some(Change::AddedOrUpdated { key: 4, value: 4 })
    );
}

#[tokio::test]
async fn clear_streams_every_removed_entry() {
    let store: ObservableStore<u8, u8> = [(1, 10), (2, 20)].into_iter().collect();
    let mut changes = store.changes();

    assert_eq!(store.clear(), 2);

    let mut removed = vec![
        changes.next().await.unwrap(),
        changes.next().await.unwrap(),
    ];
    removed.sort_by_key(|c| *c.key());
    assert_eq!(
        removed,
        vec![
            Change::Removed { key: 1, value: 10 },
            Change::Removed { key: 2, value: 20 },
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn version_watch_observes_mutations_from_other_threads() {
    let store: ObservableStore<u8, u8> = ObservableStore::new();
    let mut version = store.watch_version();
    assert_eq!(*version.borrow(), 0);

    let writer = store.clone();
    let task = tokio::task::spawn_blocking(move || {
        writer.put(1, 1);
        writer.put(2, 2);
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while *version.borrow_and_update() < 2 {
            version.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    task.await.unwrap();
    assert_eq!(store.version(), 2);
}

#[test]
fn stream_is_usable_from_tokio_test_block_on() {
    let store: ObservableStore<u8, u8> = ObservableStore::new();
    let mut changes = store.changes();
    store.remove(&9);
    store.put(9, 9);

    let next = tokio_test::block_on(changes.changed());
    assert_eq!(next, Some(Change::AddedOrUpdated { key: 9, value: 9 }));
}
