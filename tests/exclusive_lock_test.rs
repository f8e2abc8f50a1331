use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tablelock::{CancellationToken, Dispatcher, LockStats, TableLockError, TableLocks};
use tokio::sync::oneshot;
use tokio::time::timeout;

const BLOCKED: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_keyed_waits_for_exclusive_holder() {
    let dispatcher = Arc::new(Dispatcher::new());
    let cancel = CancellationToken::new();
    let exclusive = dispatcher.locks().acquire_exclusive(&cancel).await.unwrap();

    let (started_tx, mut started_rx) = oneshot::channel();
    let d = dispatcher.clone();
    let keyed = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        d.run_keyed("todo", &cancel, move || async move {
            started_tx.send(()).unwrap();
            Ok::<_, TableLockError>(())
        })
        .await
    });

    assert!(timeout(BLOCKED, &mut started_rx).await.is_err());
    assert_eq!(dispatcher.stats().readers_waiting, 0);

    exclusive.release();
    started_rx.await.unwrap();
    keyed.await.unwrap().unwrap();
    assert_eq!(dispatcher.stats(), LockStats::default());
}

#[tokio::test]
async fn test_exclusive_waits_for_keyed_holders_to_drain() {
    let dispatcher = Arc::new(Dispatcher::new());
    let cancel = CancellationToken::new();
    let todo = dispatcher.acquire_keyed("todo", &cancel).await.unwrap();
    let items = dispatcher.acquire_keyed("items", &cancel).await.unwrap();

    let (started_tx, mut started_rx) = oneshot::channel();
    let d = dispatcher.clone();
    let exclusive = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        d.run_exclusive(&cancel, move || async move {
            started_tx.send(()).unwrap();
            Ok::<_, TableLockError>("checkpoint")
        })
        .await
    });

    assert!(timeout(BLOCKED, &mut started_rx).await.is_err());
    todo.release();
    assert!(timeout(BLOCKED, &mut started_rx).await.is_err());
    items.release();

    started_rx.await.unwrap();
    assert_eq!(exclusive.await.unwrap().unwrap(), "checkpoint");
    assert_eq!(dispatcher.stats(), LockStats::default());
}

#[tokio::test]
async fn test_exclusive_holders_are_serialized() {
    let locks = TableLocks::new();
    let cancel = CancellationToken::new();
    let first = locks.acquire_exclusive(&cancel).await.unwrap();

    let locks_clone = locks.clone();
    let mut second = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        locks_clone.acquire_exclusive(&cancel).await
    });

    assert!(timeout(BLOCKED, &mut second).await.is_err());
    assert_eq!(locks.stats().writers_waiting, 2);

    first.release();
    let second = second.await.unwrap().unwrap();
    assert_eq!(locks.stats().writers_waiting, 1);

    // Readers stay out until the last writer leaves
    assert!(timeout(BLOCKED, locks.acquire_keyed("todo", &cancel)).await.is_err());
    second.release();
    let keyed = timeout(BLOCKED, locks.acquire_keyed("todo", &cancel))
        .await
        .expect("readers admitted once writers are gone")
        .unwrap();
    keyed.release();
    assert_eq!(locks.stats(), LockStats::default());
}

#[tokio::test]
async fn test_exclusive_with_no_keyed_work_is_immediate() {
    let dispatcher = Dispatcher::new();
    let cancel = CancellationToken::new();

    let result = timeout(
        BLOCKED,
        dispatcher.run_exclusive(&cancel, || async { Ok::<_, TableLockError>(1) }),
    )
    .await
    .expect("idle manager grants exclusive at once");
    assert_eq!(result.unwrap(), 1);
    assert_eq!(dispatcher.stats(), LockStats::default());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exclusive_never_overlaps_keyed_work() {
    let dispatcher = Arc::new(Dispatcher::new());
    let keyed_active = Arc::new(AtomicUsize::new(0));
    let exclusive_active = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let tables = ["todo", "items", "orders", "users"];

    let mut tasks = Vec::new();
    for i in 0..44 {
        let d = dispatcher.clone();
        let keyed_active = keyed_active.clone();
        let exclusive_active = exclusive_active.clone();
        let violations = violations.clone();

        if i % 11 == 5 {
            tasks.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                d.run_exclusive(&cancel, move || async move {
                    if keyed_active.load(Ordering::SeqCst) > 0
                        || exclusive_active.fetch_add(1, Ordering::SeqCst) > 0
                    {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    exclusive_active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, TableLockError>(())
                })
                .await
            }));
        } else {
            let table = tables[i % tables.len()];
            tasks.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                d.run_keyed(table, &cancel, move || async move {
                    if exclusive_active.load(Ordering::SeqCst) > 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    keyed_active.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    keyed_active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, TableLockError>(())
                })
                .await
            }));
        }
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(dispatcher.stats(), LockStats::default());
}
