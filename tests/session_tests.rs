// Registry and memoized cleanup

mod common;

use common::FakeRuntime;
use rtc_mem_bench::lifecycle::CleanupReport;
use rtc_mem_bench::session::Session;
use std::sync::Arc;

#[tokio::test]
async fn concurrent_cleanup_runs_one_batch() {
    let fake = FakeRuntime::new();
    let session = Session::new(fake.clone());
    for id in ["c0", "c1", "c2"] {
        session.register(id);
    }

    let (a, b) = tokio::join!(session.cleanup(), session.cleanup());

    assert_eq!(*a, CleanupReport { removed: 3, failed: 0 });
    assert_eq!(a, b);
    assert_eq!(fake.remove_calls(), 3);
    assert!(session.cleanup_finished());
}

#[tokio::test]
async fn cleanup_after_cleanup_is_a_no_op() {
    let fake = FakeRuntime::new();
    let session = Session::new(fake.clone());
    session.register("c0");

    session.cleanup().await;
    let again = *session.cleanup().await;

    assert_eq!(again.removed, 1);
    assert_eq!(fake.remove_calls(), 1);
}

#[tokio::test]
async fn cleanup_from_spawned_tasks_shares_outcome() {
    let fake = FakeRuntime::new();
    let session = Arc::new(Session::new(fake.clone()));
    session.register("c0");
    session.register("c1");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let s = session.clone();
            tokio::spawn(async move { *s.cleanup().await })
        })
        .collect();
    for h in handles {
        assert_eq!(h.await.unwrap().removed, 2);
    }
    assert_eq!(fake.remove_calls(), 2);
}

#[tokio::test]
async fn failed_removal_does_not_block_siblings() {
    let fake = FakeRuntime::new();
    fake.fail_removal_of("c1");
    let session = Session::new(fake.clone());
    for id in ["c0", "c1", "c2"] {
        session.register(id);
    }

    let report = *session.cleanup().await;

    assert_eq!(report, CleanupReport { removed: 2, failed: 1 });
    assert_eq!(fake.remove_calls(), 3);
}

#[tokio::test]
async fn registry_keeps_start_order() {
    let session = Session::new(FakeRuntime::new());
    assert!(!session.has_started_containers());
    session.register("b");
    session.register("a");
    assert!(session.has_started_containers());
    assert_eq!(session.started(), vec!["b".to_string(), "a".to_string()]);
}
