//! Integration tests for the frontier stores.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use newsriver_common::urlnorm::normalize;
use newsriver_common::{FailureReason, UrlOrigin};
use newsriver_frontier::{FeedStore, FrontierStore, HostStore, ListFilter, SubmitUrl};

/// Claim picks the single best row in the whole table, so tests must not
/// interleave. One lock serializes them against a shared database.
static DB_LOCK: Mutex<()> = Mutex::const_new(());

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    newsriver_frontier::migrate(&pool).await.ok()?;
    sqlx::query("TRUNCATE frontier_urls, host_state, feed_state")
        .execute(&pool)
        .await
        .ok()?;
    Some(pool)
}

fn submit(url: &str, source_id: Uuid, origin: UrlOrigin, priority: i32) -> SubmitUrl {
    SubmitUrl {
        url: url.to_string(),
        source_id,
        origin,
        parent_url: None,
        depth: 0,
        priority,
        next_fetch_at: Utc::now(),
    }
}

// =========================================================================
// Submit / dedup
// =========================================================================

#[tokio::test]
async fn submit_normalizes_and_inserts() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool);
    let source = Uuid::new_v4();

    store
        .submit(submit(
            "https://example.com/a?utm_source=x",
            source,
            UrlOrigin::Feed,
            7,
        ))
        .await
        .unwrap()
        .expect("row inserted");

    let clean = normalize("https://example.com/a").unwrap();
    let row = store.get_by_hash(&clean.hash).await.unwrap().unwrap();
    assert_eq!(row.url, "https://example.com/a");
    assert_eq!(row.origin, "feed");
    assert_eq!(row.priority, 7);
    assert_eq!(row.status, "pending");
}

#[tokio::test]
async fn resubmit_merges_priority_and_next_fetch() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool);
    let source = Uuid::new_v4();

    let mut first = submit("https://example.com/a", source, UrlOrigin::Spider, 3);
    first.next_fetch_at = Utc::now() + Duration::hours(1);
    store.submit(first).await.unwrap();

    // Same URL modulo tracking params: must collide, keep max priority and
    // the earlier next_fetch_at.
    let earlier = Utc::now();
    let mut second = submit(
        "https://example.com/a?utm_medium=mail",
        source,
        UrlOrigin::Feed,
        7,
    );
    second.next_fetch_at = earlier;
    store.submit(second).await.unwrap();

    let hash = normalize("https://example.com/a").unwrap().hash;
    let row = store.get_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(row.priority, 7);
    assert!(row.next_fetch_at <= earlier + Duration::seconds(1));

    let all = store.list(&ListFilter::default()).await.unwrap();
    assert_eq!(all.len(), 1, "no duplicate row");
}

#[tokio::test]
async fn submit_does_not_resurrect_claimed_row() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool);
    let source = Uuid::new_v4();

    store
        .submit(submit("https://example.com/a", source, UrlOrigin::Feed, 7))
        .await
        .unwrap();
    let claimed = store.claim().await.unwrap().unwrap();
    assert_eq!(claimed.status, "fetching");

    let absorbed = store
        .submit(submit("https://example.com/a", source, UrlOrigin::Feed, 10))
        .await
        .unwrap();
    assert!(absorbed.is_none(), "non-pending row must absorb the submit");

    let row = store.get(claimed.id).await.unwrap().unwrap();
    assert_eq!(row.status, "fetching");
    assert_eq!(row.priority, 7);
}

// =========================================================================
// Claim
// =========================================================================

#[tokio::test]
async fn claim_prefers_priority_then_age() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool);
    let source = Uuid::new_v4();

    store
        .submit(submit("https://a.example/low", source, UrlOrigin::Spider, 3))
        .await
        .unwrap();
    store
        .submit(submit("https://b.example/high", source, UrlOrigin::Feed, 9))
        .await
        .unwrap();

    let first = store.claim().await.unwrap().unwrap();
    assert_eq!(first.url, "https://b.example/high");
    let second = store.claim().await.unwrap().unwrap();
    assert_eq!(second.url, "https://a.example/low");
    assert!(store.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn claim_respects_host_politeness() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool.clone());
    let hosts = HostStore::new(pool);
    let source = Uuid::new_v4();

    store
        .submit(submit("https://slow.example/a", source, UrlOrigin::Feed, 7))
        .await
        .unwrap();

    // Host was just fetched and requires a long delay: not claimable.
    hosts.put_robots("slow.example", None, Some(3_600_000)).await.unwrap();
    hosts.record_fetch("slow.example").await.unwrap();
    assert!(store.claim().await.unwrap().is_none());
}

// =========================================================================
// Transitions
// =========================================================================

#[tokio::test]
async fn fetched_transition_records_metadata() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool);
    let source = Uuid::new_v4();

    store
        .submit(submit("https://example.com/a", source, UrlOrigin::Feed, 7))
        .await
        .unwrap();
    let claimed = store.claim().await.unwrap().unwrap();

    store
        .update_fetched(claimed.id, Some("hash123"), Some("\"etag\""), Some("Mon"))
        .await
        .unwrap();

    let row = store.get(claimed.id).await.unwrap().unwrap();
    assert_eq!(row.status, "fetched");
    assert_eq!(row.content_hash.as_deref(), Some("hash123"));
    assert_eq!(row.fetch_count, 1);
    assert_eq!(row.retry_count, 0);
    assert!(row.last_fetched_at.is_some());
}

#[tokio::test]
async fn failed_transition_backs_off_then_dies() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool.clone());
    let source = Uuid::new_v4();

    store
        .submit(submit("https://example.com/a", source, UrlOrigin::Feed, 7))
        .await
        .unwrap();
    let claimed = store.claim().await.unwrap().unwrap();

    // First failure with budget left: back to pending, future next_fetch_at.
    store
        .update_failed(claimed.id, FailureReason::TransportError, 3)
        .await
        .unwrap();
    let row = store.get(claimed.id).await.unwrap().unwrap();
    assert_eq!(row.status, "pending");
    assert_eq!(row.retry_count, 1);
    assert!(row.next_fetch_at > Utc::now());
    assert_eq!(row.last_error.as_deref(), Some("transport_error"));

    // Make it claimable again, then exhaust the budget.
    sqlx::query("UPDATE frontier_urls SET next_fetch_at = now() WHERE id = $1")
        .bind(claimed.id)
        .execute(&pool)
        .await
        .unwrap();
    let again = store.claim().await.unwrap().unwrap();
    store
        .update_failed(again.id, FailureReason::Timeout, 2)
        .await
        .unwrap();

    let row = store.get(claimed.id).await.unwrap().unwrap();
    assert_eq!(row.status, "dead");
    assert_eq!(row.last_error.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn final_url_collision_falls_back_to_original_row() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool);
    let source = Uuid::new_v4();

    store
        .submit(submit("https://a.example/x", source, UrlOrigin::Feed, 9))
        .await
        .unwrap();
    store
        .submit(submit("https://b.example/y", source, UrlOrigin::Spider, 3))
        .await
        .unwrap();

    // Fetch B so its hash exists on a fetched row.
    let a = store.claim().await.unwrap().unwrap();
    assert_eq!(a.url, "https://a.example/x");
    let b = store.claim().await.unwrap().unwrap();
    store.update_fetched(b.id, Some("bhash"), None, None).await.unwrap();

    // A redirected to B's URL: the rewrite collides and must fall back.
    let final_url = normalize("https://b.example/y").unwrap();
    store
        .update_fetched_with_final_url(a.id, &final_url, Some("ahash"), None, None)
        .await
        .unwrap();

    let a_row = store.get(a.id).await.unwrap().unwrap();
    assert_eq!(a_row.status, "fetched");
    assert_eq!(a_row.url, "https://a.example/x", "original URL kept");
    let b_row = store.get(b.id).await.unwrap().unwrap();
    assert_eq!(b_row.content_hash.as_deref(), Some("bhash"), "B unchanged");

    let all = store.list(&ListFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2, "no duplicate row created");
}

#[tokio::test]
async fn dead_is_terminal() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool);
    let source = Uuid::new_v4();

    store
        .submit(submit("https://example.com/a", source, UrlOrigin::Feed, 7))
        .await
        .unwrap();
    let claimed = store.claim().await.unwrap().unwrap();
    store
        .update_dead(claimed.id, FailureReason::RobotsBlocked)
        .await
        .unwrap();

    // Re-submitting must not resurrect.
    let absorbed = store
        .submit(submit("https://example.com/a", source, UrlOrigin::Feed, 10))
        .await
        .unwrap();
    assert!(absorbed.is_none());

    let row = store.get(claimed.id).await.unwrap().unwrap();
    assert_eq!(row.status, "dead");
    assert_eq!(row.last_error.as_deref(), Some("robots_blocked"));
    assert!(store.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn stuck_fetching_rows_are_reclaimed() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool.clone());
    let source = Uuid::new_v4();

    store
        .submit(submit("https://example.com/a", source, UrlOrigin::Feed, 7))
        .await
        .unwrap();
    let claimed = store.claim().await.unwrap().unwrap();

    sqlx::query("UPDATE frontier_urls SET updated_at = now() - interval '2 hours' WHERE id = $1")
        .bind(claimed.id)
        .execute(&pool)
        .await
        .unwrap();

    let reclaimed = store.reclaim_stuck(3600.0).await.unwrap();
    assert_eq!(reclaimed, 1);
    let row = store.get(claimed.id).await.unwrap().unwrap();
    assert_eq!(row.status, "pending");
}

// =========================================================================
// Listing / stats / feeds / hosts
// =========================================================================

#[tokio::test]
async fn list_filters_and_stats_aggregate() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let store = FrontierStore::new(pool);
    let s1 = Uuid::new_v4();
    let s2 = Uuid::new_v4();

    store
        .submit(submit("https://a.example/1", s1, UrlOrigin::Feed, 7))
        .await
        .unwrap();
    store
        .submit(submit("https://a.example/2", s1, UrlOrigin::Spider, 5))
        .await
        .unwrap();
    store
        .submit(submit("https://b.example/1", s2, UrlOrigin::Manual, 5))
        .await
        .unwrap();

    let by_source = store
        .list(&ListFilter {
            source_id: Some(s1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_source.len(), 2);

    let by_host = store
        .list(&ListFilter {
            host: Some("b.example".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_host.len(), 1);

    let stats = store.stats().await.unwrap();
    let s1_pending = stats
        .iter()
        .find(|s| s.source_id == s1 && s.status == "pending")
        .unwrap();
    assert_eq!(s1_pending.count, 2);
}

#[tokio::test]
async fn feed_backoff_grows_with_errors() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let feeds = FeedStore::new(pool);
    let source = Uuid::new_v4();

    feeds.upsert(source, "https://example.com/feed.xml").await.unwrap();
    let fresh = feeds.get(source).await.unwrap().unwrap();
    assert_eq!(fresh.consecutive_errors, 0);

    feeds.mark_failed(source, "timeout", 30).await.unwrap();
    let once = feeds.get(source).await.unwrap().unwrap();
    assert_eq!(once.consecutive_errors, 1);
    assert!(once.next_poll_at > Utc::now());

    feeds.mark_failed(source, "timeout", 30).await.unwrap();
    let twice = feeds.get(source).await.unwrap().unwrap();
    assert_eq!(twice.consecutive_errors, 2);
    assert!(twice.next_poll_at > once.next_poll_at);

    // Recovery zeroes the streak.
    feeds
        .mark_polled(source, Some("\"e\""), None, 12, 30)
        .await
        .unwrap();
    let healed = feeds.get(source).await.unwrap().unwrap();
    assert_eq!(healed.consecutive_errors, 0);
    assert_eq!(healed.last_item_count, 12);
}

#[tokio::test]
async fn host_delay_doubles_up_to_ceiling() {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = test_pool().await else { return };
    let hosts = HostStore::new(pool);

    let first = hosts.raise_min_delay("throttled.example").await.unwrap();
    assert_eq!(first, 2000);
    let mut last = first;
    for _ in 0..10 {
        last = hosts.raise_min_delay("throttled.example").await.unwrap();
    }
    assert_eq!(last, 60_000, "delay raise is capped");
}
