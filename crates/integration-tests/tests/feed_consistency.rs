//! Change feed against the SQLite store: subscribers only ever see
//! committed, internally consistent snapshots in revision order.

mod common;

use common::{request, temp_db, App};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;

#[tokio::test]
async fn test_subscriber_sees_monotonic_consistent_snapshots() {
    let (_dir, path) = temp_db();
    let app = App::open(&path).await;
    let prof = app.professor("Ada").await;

    let mut stream = app.coordinator.subscribe(&prof).await.unwrap().into_stream();

    let mut writers = JoinSet::new();
    for i in 0..15 {
        let coordinator = Arc::clone(&app.coordinator);
        let prof = prof.clone();
        writers.spawn(async move {
            coordinator.join(&prof, request(&format!("S{}", i))).await.unwrap();
            if i % 3 == 0 {
                coordinator.call_next(&prof).await.unwrap();
            }
        });
    }

    let final_revision = {
        while let Some(res) = writers.join_next().await {
            res.unwrap();
        }
        app.coordinator.snapshot(&prof).await.unwrap().revision
    };

    let mut last = None;
    loop {
        let snapshot = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("feed stalled")
            .unwrap();

        assert!(snapshot.is_dense(), "observed a torn queue: {:?}", snapshot);
        if let Some(previous) = last {
            assert!(snapshot.revision > previous, "revision went backwards");
        }
        last = Some(snapshot.revision);

        if snapshot.revision == final_revision {
            assert_eq!(snapshot.len(), 10);
            break;
        }
    }
}

#[tokio::test]
async fn test_late_subscriber_starts_from_committed_state() {
    let (_dir, path) = temp_db();
    let app = App::open(&path).await;
    let prof = app.professor("Ada").await;
    let a = app.join(&prof, "A").await;
    app.join(&prof, "B").await;

    let subscription = app.coordinator.subscribe(&prof).await.unwrap();
    let current = subscription.current();
    assert_eq!(current.len(), 2);
    assert_eq!(current.position_of(&a.entry_id), Some(1));
}

#[tokio::test]
async fn test_subscriber_in_second_process_receives_foreign_commits() {
    let (_dir, path) = temp_db();
    let writer = App::open(&path).await;
    let reader = App::open(&path).await;
    let prof = writer.professor("Ada").await;

    let mut subscription = reader.coordinator.subscribe(&prof).await.unwrap();
    assert!(subscription.current().is_empty());

    let a = writer.join(&prof, "A").await;
    let b = writer.join(&prof, "B").await;
    let committed = writer.coordinator.snapshot(&prof).await.unwrap().revision;

    // No reads on the reader side: its feed notices the writes on its own
    let observed = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let snapshot = subscription.next().await.unwrap();
            assert!(snapshot.is_dense());
            if snapshot.revision == committed {
                break snapshot;
            }
        }
    })
    .await
    .expect("foreign commits never reached the subscriber");

    assert_eq!(observed.position_of(&a.entry_id), Some(1));
    assert_eq!(observed.position_of(&b.entry_id), Some(2));
}

#[tokio::test]
async fn test_cancelled_subscription_stops_delivery() {
    let (_dir, path) = temp_db();
    let app = App::open(&path).await;
    let prof = app.professor("Ada").await;
    let feed_count = || app.coordinator.subscriber_count(&prof).unwrap();

    let mut live = app.coordinator.subscribe(&prof).await.unwrap();
    let cancelled = app.coordinator.subscribe(&prof).await.unwrap().into_stream();
    assert_eq!(feed_count(), 2);

    drop(cancelled);
    assert_eq!(feed_count(), 1);

    // Mutations still commit and reach the remaining subscriber
    let receipt = app.join(&prof, "A").await;
    assert_eq!(receipt.position, 1);
    let next = tokio::time::timeout(Duration::from_secs(1), live.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.position_of(&receipt.entry_id), Some(1));

    live.cancel();
    assert_eq!(feed_count(), 0);
    assert_eq!(app.join(&prof, "B").await.position, 2);
}
