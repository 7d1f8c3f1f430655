use chrono::{Duration, Utc};
use yana::store::{NewArticle, NewFeed, PersistOutcome, Store};
use yana::types::{AiHints, FeedKind, FeedOptions};

async fn store() -> Store {
    Store::connect_in_memory().await.unwrap()
}

async fn make_user(store: &Store, name: &str) -> i64 {
    store.create_user(name, None, "hunter2").await.unwrap()
}

async fn make_feed(store: &Store, user_id: Option<i64>, name: &str) -> i64 {
    store
        .create_feed(NewFeed {
            user_id,
            kind: FeedKind::FullWebsite,
            identifier: format!("http://example.com/{name}/feed.xml"),
            name: name.to_string(),
            options: FeedOptions::default(),
            ai_hints: AiHints::default(),
        })
        .await
        .unwrap()
}

fn article(feed_id: i64, url: &str, title: &str) -> NewArticle {
    NewArticle {
        feed_id,
        url: url.to_string(),
        name: title.to_string(),
        content: format!("<article><section><p>{title}</p></section></article>"),
        date: Utc::now(),
        author: None,
        external_id: None,
        thumbnail_url: None,
        media_url: None,
        media_type: None,
    }
}

#[tokio::test]
async fn feed_name_unique_per_user() {
    let store = store().await;
    let user = make_user(&store, "alice").await;
    make_feed(&store, Some(user), "news").await;

    let duplicate = store
        .create_feed(NewFeed {
            user_id: Some(user),
            kind: FeedKind::FeedContent,
            identifier: "http://example.com/other.xml".to_string(),
            name: "news".to_string(),
            options: FeedOptions::default(),
            ai_hints: AiHints::default(),
        })
        .await;
    assert!(duplicate.is_err());

    // Same name under a different user is fine.
    let other_user = make_user(&store, "bob").await;
    store
        .create_feed(NewFeed {
            user_id: Some(other_user),
            kind: FeedKind::FeedContent,
            identifier: "http://example.com/other.xml".to_string(),
            name: "news".to_string(),
            options: FeedOptions::default(),
            ai_hints: AiHints::default(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn url_dedup_is_unique_per_feed_after_normalization() {
    let store = store().await;
    let user = make_user(&store, "alice").await;
    let feed_id = make_feed(&store, Some(user), "news").await;
    let feed = store.get_feed(feed_id).await.unwrap();

    let first = store
        .persist_article(&feed, article(feed_id, "http://x/a", "A"), false)
        .await
        .unwrap();
    assert!(matches!(first, PersistOutcome::Inserted(_)));

    // Same canonical URL (trailing slash + query noise) refreshes in
    // place instead of inserting.
    let second = store
        .persist_article(&feed, article(feed_id, "http://x/a/?utm=1", "A refreshed"), false)
        .await
        .unwrap();
    assert!(matches!(second, PersistOutcome::Updated(_)));
    assert_eq!(store.count_articles(feed_id).await.unwrap(), 1);
}

#[tokio::test]
async fn read_duplicate_is_skipped_unread_is_refreshed() {
    let store = store().await;
    let user = make_user(&store, "alice").await;
    let feed_id = make_feed(&store, Some(user), "news").await;
    let feed = store.get_feed(feed_id).await.unwrap();

    let PersistOutcome::Inserted(read_id) = store
        .persist_article(&feed, article(feed_id, "http://x/read", "Read one"), false)
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };
    let PersistOutcome::Inserted(unread_id) = store
        .persist_article(&feed, article(feed_id, "http://x/unread", "Unread one"), false)
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };

    store.set_read(user, read_id, true).await.unwrap();
    let created_before = store.get_article(unread_id).await.unwrap().created_at;

    // Force refresh: the read article stays untouched, the unread one
    // gets fresh content with created_at preserved.
    let read_outcome = store
        .persist_article(&feed, article(feed_id, "http://x/read", "Read changed"), true)
        .await
        .unwrap();
    assert_eq!(read_outcome, PersistOutcome::SkippedRead);
    assert_eq!(store.get_article(read_id).await.unwrap().name, "Read one");

    let unread_outcome = store
        .persist_article(&feed, article(feed_id, "http://x/unread", "Unread changed"), true)
        .await
        .unwrap();
    assert!(matches!(unread_outcome, PersistOutcome::Updated(_)));
    let refreshed = store.get_article(unread_id).await.unwrap();
    assert_eq!(refreshed.name, "Unread changed");
    assert_eq!(refreshed.created_at, created_before);
}

#[tokio::test]
async fn shared_feed_duplicates_always_refresh() {
    let store = store().await;
    let user = make_user(&store, "alice").await;
    let feed_id = make_feed(&store, None, "shared").await;
    let feed = store.get_feed(feed_id).await.unwrap();

    let PersistOutcome::Inserted(article_id) = store
        .persist_article(&feed, article(feed_id, "http://x/a", "A"), false)
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };

    // Even a read mark cannot block refresh on an ownerless feed.
    store.set_read(user, article_id, true).await.unwrap();
    let outcome = store
        .persist_article(&feed, article(feed_id, "http://x/a", "A v2"), false)
        .await
        .unwrap();
    assert!(matches!(outcome, PersistOutcome::Updated(_)));
}

#[tokio::test]
async fn recent_title_duplicate_is_skipped() {
    let store = store().await;
    let user = make_user(&store, "alice").await;
    let feed_id = make_feed(&store, Some(user), "news").await;
    let feed = store.get_feed(feed_id).await.unwrap();

    store
        .persist_article(&feed, article(feed_id, "http://x/a", "Same title"), false)
        .await
        .unwrap();
    let outcome = store
        .persist_article(&feed, article(feed_id, "http://x/b", "Same title"), false)
        .await
        .unwrap();
    assert_eq!(outcome, PersistOutcome::SkippedRecentTitle);

    // Force refresh bypasses the title window.
    let forced = store
        .persist_article(&feed, article(feed_id, "http://x/b", "Same title"), true)
        .await
        .unwrap();
    assert!(matches!(forced, PersistOutcome::Inserted(_)));
}

#[tokio::test]
async fn posts_today_counts_since_utc_midnight() {
    let store = store().await;
    let user = make_user(&store, "alice").await;
    let feed_id = make_feed(&store, Some(user), "news").await;
    let feed = store.get_feed(feed_id).await.unwrap();

    let (count, newest) = store.posts_today(feed_id).await.unwrap();
    assert_eq!(count, 0);
    assert!(newest.is_none());

    store
        .persist_article(&feed, article(feed_id, "http://x/a", "A"), false)
        .await
        .unwrap();
    store
        .persist_article(&feed, article(feed_id, "http://x/b", "B"), false)
        .await
        .unwrap();

    let (count, newest) = store.posts_today(feed_id).await.unwrap();
    assert_eq!(count, 2);
    assert!(newest.is_some());
}

#[tokio::test]
async fn cascade_delete_feed_removes_articles_and_states() {
    let store = store().await;
    let user = make_user(&store, "alice").await;
    let feed_id = make_feed(&store, Some(user), "news").await;
    let feed = store.get_feed(feed_id).await.unwrap();

    let PersistOutcome::Inserted(article_id) = store
        .persist_article(&feed, article(feed_id, "http://x/a", "A"), false)
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };
    store.set_saved(user, article_id, true).await.unwrap();

    store.delete_feed(feed_id).await.unwrap();
    assert_eq!(store.count_articles(feed_id).await.unwrap(), 0);
    assert!(!store.is_saved(user, article_id).await.unwrap());
}

#[tokio::test]
async fn auth_tokens_round_trip_and_expire() {
    let store = store().await;
    let user = make_user(&store, "alice").await;

    let token = store.create_auth_token(user, 30).await.unwrap();
    assert_eq!(token.len(), 64);
    assert_eq!(store.resolve_auth_token(&token).await.unwrap(), user);
    assert!(store.resolve_auth_token("bogus").await.is_err());

    let expired = store.create_auth_token(user, -1).await.unwrap();
    assert!(store.resolve_auth_token(&expired).await.is_err());
    assert!(store.purge_expired_tokens().await.unwrap() >= 1);
}

#[tokio::test]
async fn login_verification() {
    let store = store().await;
    make_user(&store, "alice").await;

    assert!(store.verify_login("alice", "hunter2").await.is_ok());
    assert!(store.verify_login("alice", "wrong").await.is_err());
    assert!(store.verify_login("nobody", "hunter2").await.is_err());
}

#[tokio::test]
async fn content_cache_round_trip_and_eviction() {
    let store = store().await;

    assert!(store.cached_content("http://x/a", 7).await.unwrap().is_none());
    store.cache_content("http://x/a", "<p>cached</p>").await.unwrap();
    assert_eq!(
        store.cached_content("http://x/a", 7).await.unwrap().as_deref(),
        Some("<p>cached</p>")
    );

    // Zero-day max age treats everything as stale.
    assert!(store.cached_content("http://x/a", 0).await.unwrap().is_none());
    assert_eq!(store.evict_stale_content(0).await.unwrap(), 1);
    assert!(store.cached_content("http://x/a", 7).await.unwrap().is_none());
}

#[tokio::test]
async fn mark_feed_read_honors_cutoff() {
    let store = store().await;
    let user = make_user(&store, "alice").await;
    let feed_id = make_feed(&store, Some(user), "news").await;
    let feed = store.get_feed(feed_id).await.unwrap();

    let mut old = article(feed_id, "http://x/old", "Old");
    old.date = Utc::now() - Duration::hours(5);
    let mut new = article(feed_id, "http://x/new", "New");
    new.date = Utc::now() + Duration::hours(5);

    let PersistOutcome::Inserted(old_id) = store.persist_article(&feed, old, false).await.unwrap() else {
        panic!("expected insert");
    };
    let PersistOutcome::Inserted(new_id) = store.persist_article(&feed, new, false).await.unwrap() else {
        panic!("expected insert");
    };

    store.mark_feed_read(user, feed_id, Some(Utc::now())).await.unwrap();
    assert!(store.is_read(user, old_id).await.unwrap());
    assert!(!store.is_read(user, new_id).await.unwrap());
}
