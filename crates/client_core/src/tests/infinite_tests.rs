use super::*;
use shared::error::StoreError;

fn listings(
    total: u32,
) -> impl Fn(u32, u32) -> futures::future::Ready<Result<Vec<String>, StoreError>> + Send + Sync + 'static
{
    move |page, page_size| {
        let start = (page - 1) * page_size;
        let end = (start + page_size).min(total).max(start);
        futures::future::ready(Ok((start..end).map(|n| format!("listing-{n}")).collect()))
    }
}

#[tokio::test]
async fn mount_appends_first_page() {
    let controller = InfiniteScrollController::new(listings(5), 2);
    assert_eq!(controller.mount().await, Ok(2));
    let state = controller.snapshot();
    assert_eq!(state.items, vec!["listing-0", "listing-1"]);
    assert_eq!(state.page, 1);
    assert!(state.has_more);
}

#[tokio::test]
async fn visibility_of_observed_sentinel_loads_next_page() {
    let controller = InfiniteScrollController::new(listings(5), 2);
    controller.mount().await.expect("mount");
    controller.observe("sentinel");

    assert!(
        controller
            .on_visibility(&VisibilityEntry::new("sentinel", 1.0))
            .await
    );
    assert_eq!(controller.snapshot().items.len(), 4);

    assert!(
        controller
            .on_visibility(&VisibilityEntry::new("sentinel", 1.0))
            .await
    );
    let state = controller.snapshot();
    assert_eq!(state.items.len(), 5);
    assert!(!state.has_more);

    assert!(
        !controller
            .on_visibility(&VisibilityEntry::new("sentinel", 1.0))
            .await,
        "exhausted list ignores the sentinel"
    );
}

#[tokio::test]
async fn partial_or_foreign_visibility_is_ignored() {
    let controller = InfiniteScrollController::new(listings(50), 2);
    controller.mount().await.expect("mount");

    assert!(
        !controller
            .on_visibility(&VisibilityEntry::new("sentinel", 1.0))
            .await,
        "nothing observed yet"
    );

    controller.observe("sentinel");
    assert!(
        !controller
            .on_visibility(&VisibilityEntry::new("sentinel", 0.5))
            .await
    );
    assert!(
        !controller
            .on_visibility(&VisibilityEntry::new("footer", 1.0))
            .await
    );
    assert_eq!(controller.snapshot().page, 1);
}

#[tokio::test]
async fn unobserve_stops_loading() {
    let controller = InfiniteScrollController::with_default_page_size(listings(50));
    controller.mount().await.expect("mount");
    assert_eq!(controller.snapshot().items.len(), DEFAULT_PAGE_SIZE as usize);

    controller.observe("sentinel");
    assert_eq!(controller.observed().as_deref(), Some("sentinel"));
    controller.unobserve();
    assert_eq!(controller.observed(), None);

    assert!(
        !controller
            .on_visibility(&VisibilityEntry::new("sentinel", 1.0))
            .await
    );
}

#[tokio::test]
async fn failed_page_surfaces_mapped_error() {
    let controller = InfiniteScrollController::new(
        |_page: u32, _size: u32| async { Err::<Vec<u32>, _>("Network request failed") },
        2,
    );
    assert_eq!(
        controller.mount().await,
        Err("Please check your network connection".to_string())
    );
    let state = controller.snapshot();
    assert!(state.items.is_empty());
    assert!(!state.loading);
}
