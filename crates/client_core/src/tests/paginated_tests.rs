use super::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use shared::error::StoreError;

/// Serves `total` sequential integers in pages and records each request.
fn numbered(
    total: u32,
    requests: Arc<Mutex<Vec<(u32, u32)>>>,
) -> impl Fn(u32, u32) -> futures::future::Ready<Result<Vec<u32>, StoreError>> + Send + Sync + 'static
{
    move |page, page_size| {
        requests.lock().expect("lock").push((page, page_size));
        let start = (page - 1) * page_size;
        let end = (start + page_size).min(total);
        futures::future::ready(Ok((start..end.max(start)).collect()))
    }
}

#[tokio::test]
async fn mount_loads_initial_page() {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let controller = PaginatedFetchController::new(
        numbered(25, Arc::clone(&requests)),
        PaginationOptions::default(),
    );

    assert_eq!(controller.mount().await, Ok(10));

    let state = controller.snapshot();
    assert_eq!(state.items, (0..10).collect::<Vec<_>>());
    assert_eq!(state.page, 1);
    assert!(state.has_more);
    assert_eq!(*requests.lock().expect("lock"), vec![(1, DEFAULT_PAGE_SIZE)]);
}

#[tokio::test]
async fn load_more_appends_until_short_page() {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let controller = PaginatedFetchController::new(
        numbered(25, Arc::clone(&requests)),
        PaginationOptions::default(),
    );
    controller.mount().await.expect("mount");

    assert_eq!(controller.load_more().await, Some(Ok(10)));
    assert_eq!(controller.load_more().await, Some(Ok(5)));

    let state = controller.snapshot();
    assert_eq!(state.items, (0..25).collect::<Vec<_>>());
    assert_eq!(state.page, 3);
    assert!(!state.has_more);

    assert_eq!(controller.load_more().await, None);
    assert_eq!(requests.lock().expect("lock").len(), 3);
}

#[tokio::test]
async fn exact_multiple_costs_one_empty_fetch() {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let controller = PaginatedFetchController::new(
        numbered(4, Arc::clone(&requests)),
        PaginationOptions::default().page_size(2),
    );
    controller.mount().await.expect("mount");
    assert_eq!(controller.load_more().await, Some(Ok(2)));
    assert!(controller.snapshot().has_more);
    assert_eq!(controller.load_more().await, Some(Ok(0)));
    assert!(!controller.snapshot().has_more);
    assert_eq!(controller.snapshot().items, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn refresh_replaces_items_with_initial_page() {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let controller = PaginatedFetchController::new(
        numbered(50, Arc::clone(&requests)),
        PaginationOptions::default().initial_page(2).page_size(5),
    );
    controller.mount().await.expect("mount");
    controller.load_more().await.expect("claimed").expect("page 3");
    assert_eq!(controller.snapshot().items.len(), 10);

    assert_eq!(controller.refresh().await, Ok(5));
    let state = controller.snapshot();
    assert_eq!(state.page, 2);
    assert_eq!(state.items, (5..10).collect::<Vec<_>>());
    assert_eq!(
        *requests.lock().expect("lock"),
        vec![(2, 5), (3, 5), (2, 5)]
    );
}

#[test]
fn initial_page_is_at_least_one() {
    assert_eq!(PaginationOptions::default().initial_page(0).initial_page, 1);
}

#[tokio::test]
async fn failure_keeps_items_and_records_message() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let controller = PaginatedFetchController::new(
        move |page: u32, page_size: u32| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Ok((0..page_size).map(|n| n + page).collect::<Vec<u32>>())
                } else {
                    Err(StoreError::Timeout("upstream".into()))
                }
            }
        },
        PaginationOptions::default().page_size(3),
    );
    controller.mount().await.expect("mount");

    let result = controller.load_more().await.expect("claimed");
    assert_eq!(result, Err("The request timed out".to_string()));

    let state = controller.snapshot();
    assert_eq!(state.items, vec![1, 2, 3]);
    assert_eq!(state.page, 2);
    assert!(!state.loading);
    assert_eq!(state.error.as_deref(), Some("The request timed out"));
}

#[tokio::test]
async fn concurrent_load_more_claims_one_page() {
    let (release_tx, release_rx) = tokio::sync::watch::channel(false);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    let controller = PaginatedFetchController::new(
        move |page: u32, page_size: u32| {
            log.lock().expect("lock").push(page);
            let mut release = release_rx.clone();
            async move {
                if page > 1 {
                    let _ = release.wait_for(|open| *open).await;
                }
                Ok::<_, StoreError>((0..page_size).collect::<Vec<u32>>())
            }
        },
        PaginationOptions::default().page_size(2),
    );
    controller.mount().await.expect("mount");

    let racing = tokio::spawn({
        let controller = controller.clone();
        async move { controller.load_more().await }
    });
    while !controller.snapshot().loading {
        tokio::task::yield_now().await;
    }
    assert_eq!(controller.load_more().await, None);

    release_tx.send(true).expect("release");
    assert_eq!(racing.await.expect("join"), Some(Ok(2)));
    assert_eq!(*requests.lock().expect("lock"), vec![1, 2]);
    assert_eq!(controller.snapshot().page, 2);
}
