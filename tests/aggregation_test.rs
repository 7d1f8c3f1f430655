use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yana::aggregator::AggregatorContext;
use yana::config::FetchConfig;
use yana::content::ContentProcessor;
use yana::enrich::{EnrichmentPipeline, IdentityTransform};
use yana::images::ImageExtractor;
use yana::store::{IconCache, NewFeed, Store};
use yana::types::{AiHints, FeedKind, FeedOptions};
use yana::{Engine, EngineConfig, Fetcher};

struct Harness {
    engine: Arc<Engine>,
    store: Arc<Store>,
    _icon_dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let store = Arc::new(Store::connect_in_memory().await.unwrap());
    let fetcher = Arc::new(Fetcher::new(FetchConfig {
        max_retries: 1,
        retry_delay: Duration::from_millis(20),
        ..Default::default()
    }));
    let images = Arc::new(ImageExtractor::new(fetcher.clone()));
    let processor = Arc::new(ContentProcessor::new(images.clone()));
    let enrichment = Arc::new(EnrichmentPipeline::new(processor.clone(), images.clone(), 7));

    let icon_dir = tempfile::tempdir().unwrap();
    let icon_cache = IconCache::new(icon_dir.path(), 7).unwrap();

    let ctx = AggregatorContext {
        fetcher,
        images,
        store: store.clone(),
        youtube_api_key: None,
    };
    let engine = Arc::new(Engine::new(
        ctx,
        enrichment,
        processor,
        icon_cache,
        Arc::new(IdentityTransform),
        EngineConfig {
            article_concurrency: 4,
            run_deadline: Duration::from_secs(60),
            cache_max_age_days: 7,
        },
    ));

    Harness { engine, store, _icon_dir: icon_dir }
}

fn rss_feed(base: &str, items: &[(&str, &str)]) -> String {
    let items_xml: String = items
        .iter()
        .map(|(title, slug)| {
            format!(
                "<item><title>{title}</title><link>{base}/{slug}</link>\
                 <guid>{base}/{slug}</guid>\
                 <description>Summary of {title}</description>\
                 <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <rss version=\"2.0\"><channel><title>Test Site</title>\
         <link>{base}</link><description>testing</description>{items_xml}</channel></rss>"
    )
}

fn article_page(base: &str, text: &str, with_image: bool) -> String {
    let img = if with_image {
        format!("<p><img src=\"{base}/img1.png\"></p>")
    } else {
        String::new()
    };
    format!("<html><body><article><p>{text}</p>{img}</article></body></html>")
}

fn noise_png(width: u32, height: u32) -> Vec<u8> {
    let mut seed = 0x9e3779b9u32;
    let img = image::RgbImage::from_fn(width, height, |_, _| {
        seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
        image::Rgb([(seed >> 8) as u8, (seed >> 16) as u8, (seed >> 24) as u8])
    });
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

async fn make_feed(store: &Store, user_id: Option<i64>, identifier: &str, options: FeedOptions) -> i64 {
    store
        .create_feed(NewFeed {
            user_id,
            kind: FeedKind::FullWebsite,
            identifier: identifier.to_string(),
            name: format!("feed-{}", identifier.len()),
            options,
            ai_hints: AiHints::default(),
        })
        .await
        .unwrap()
}

fn full_options() -> FeedOptions {
    FeedOptions {
        add_source_footer: true,
        generate_title_image: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn rss_happy_path_inserts_processed_articles() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(rss_feed(&base, &[("A", "1"), ("B", "2")]), "application/rss+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(&base, "Full text A", true), "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(&base, "Full text B", true), "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img1.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(noise_png(1300, 400), "image/png"))
        .mount(&server)
        .await;

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let feed_id = make_feed(&h.store, Some(user), &format!("{base}/feed.xml"), full_options()).await;

    let summary = h.engine.run_feed(feed_id, false).await.unwrap();
    assert!(summary.success);
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.errored, 0);

    let articles = h.store.list_articles_for_feed(feed_id).await.unwrap();
    assert_eq!(articles.len(), 2);
    for article in &articles {
        assert!(article.content.starts_with("<article>"));
        assert!(article.content.ends_with("</article>"));
        assert!(article.content.contains("<header>"));
        assert!(article.content.contains("data:image/webp;base64,"));
        assert!(article.content.contains("<section>"));
        let footer = format!("<a href=\"{}\" style=\"float:right\">Source</a>", article.url);
        assert!(article.content.contains(&footer));
        assert!(article.content.contains("Full text"));
    }

    // The run record reflects the outcome.
    let runs = h.store.recent_runs(feed_id, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].success);
    assert_eq!(runs[0].inserted, 2);
}

#[tokio::test]
async fn rerun_inserts_nothing_new_and_force_respects_read_state() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(rss_feed(&base, &[("A", "1"), ("B", "2")]), "application/rss+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(&base, "Original A", false), "text/html"))
        .mount(&server)
        .await;
    let first_b = Mock::given(method("GET"))
        .and(path("/2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(&base, "Original B", false), "text/html"))
        .up_to_n_times(2)
        .mount_as_scoped(&server)
        .await;

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let mut options = full_options();
    options.generate_title_image = false;
    let feed_id = make_feed(&h.store, Some(user), &format!("{base}/feed.xml"), options).await;

    let first = h.engine.run_feed(feed_id, false).await.unwrap();
    assert_eq!(first.inserted, 2);

    // Unchanged source: zero new rows.
    let second = h.engine.run_feed(feed_id, false).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(h.store.count_articles(feed_id).await.unwrap(), 2);

    // Mark A read, change B upstream, force a refresh.
    let articles = h.store.list_articles_for_feed(feed_id).await.unwrap();
    let a = articles.iter().find(|x| x.name == "A").unwrap().clone();
    let b = articles.iter().find(|x| x.name == "B").unwrap().clone();
    h.store.set_read(user, a.id, true).await.unwrap();

    drop(first_b);
    Mock::given(method("GET"))
        .and(path("/2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(&base, "Updated B", false), "text/html"))
        .mount(&server)
        .await;

    let forced = h.engine.run_feed(feed_id, true).await.unwrap();
    assert!(forced.success);
    assert_eq!(forced.inserted, 0);

    let a_after = h.store.get_article(a.id).await.unwrap();
    let b_after = h.store.get_article(b.id).await.unwrap();
    assert!(a_after.content.contains("Original A"));
    assert!(b_after.content.contains("Updated B"));
    assert_eq!(b_after.created_at, b.created_at);
    assert_eq!(h.store.count_articles(feed_id).await.unwrap(), 2);
}

#[tokio::test]
async fn four_oh_four_article_is_skipped_run_continues() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(rss_feed(&base, &[("Good", "ok"), ("Gone", "missing")]), "application/rss+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(&base, "Good text", false), "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let mut options = full_options();
    options.generate_title_image = false;
    let feed_id = make_feed(&h.store, Some(user), &format!("{base}/feed.xml"), options).await;

    let summary = h.engine.run_feed(feed_id, false).await.unwrap();
    assert!(summary.success);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.errored, 0);

    let articles = h.store.list_articles_for_feed(feed_id).await.unwrap();
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].name, "Good");
}

#[tokio::test]
async fn transient_feed_failure_fails_run_but_keeps_feed_enabled() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let feed_id = make_feed(&h.store, Some(user), &format!("{base}/feed.xml"), full_options()).await;

    let summary = h.engine.run_feed(feed_id, false).await.unwrap();
    assert!(!summary.success);
    assert!(summary.reason.is_some());

    let runs = h.store.recent_runs(feed_id, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(!runs[0].success);
    assert!(runs[0].reason.is_some());

    // A failing run never auto-disables the feed.
    assert!(h.store.get_feed(feed_id).await.unwrap().enabled);
}

#[tokio::test]
async fn title_filters_drop_articles_before_enrichment() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            rss_feed(&base, &[("Plain news", "1"), ("Sponsored post", "2")]),
            "application/rss+xml",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(&base, "News body", false), "text/html"))
        .mount(&server)
        .await;

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let mut options = full_options();
    options.generate_title_image = false;
    options.ignore_title_contains = vec!["sponsored".to_string()];
    let feed_id = make_feed(&h.store, Some(user), &format!("{base}/feed.xml"), options).await;

    let summary = h.engine.run_feed(feed_id, false).await.unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.fetched, 1);

    let articles = h.store.list_articles_for_feed(feed_id).await.unwrap();
    assert_eq!(articles.len(), 1);
    assert!(!articles[0].name.to_lowercase().contains("sponsored"));
}

#[tokio::test]
async fn daily_post_limit_zero_disables_ingestion() {
    let server = MockServer::start().await;
    let base = server.uri();
    // No mocks needed: a zero limit short-circuits before any fetch.

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let mut options = full_options();
    options.daily_post_limit = 0;
    let feed_id = make_feed(&h.store, Some(user), &format!("{base}/feed.xml"), options).await;

    let summary = h.engine.run_feed(feed_id, false).await.unwrap();
    assert!(summary.success);
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.fetched, 0);
    assert!(summary.reason.unwrap().contains("quota"));
}

#[tokio::test]
async fn daily_post_limit_caps_batch_size() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            rss_feed(&base, &[("A", "1"), ("B", "2"), ("C", "3")]),
            "application/rss+xml",
        ))
        .mount(&server)
        .await;
    for slug in ["1", "2", "3"] {
        Mock::given(method("GET"))
            .and(path(format!("/{slug}")))
            .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(&base, "text", false), "text/html"))
            .mount(&server)
            .await;
    }

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let mut options = full_options();
    options.generate_title_image = false;
    options.daily_post_limit = 1;
    let feed_id = make_feed(&h.store, Some(user), &format!("{base}/feed.xml"), options).await;

    let summary = h.engine.run_feed(feed_id, false).await.unwrap();
    assert!(summary.success);
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(h.store.count_articles(feed_id).await.unwrap(), 1);
}

#[tokio::test]
async fn fetch_failure_falls_back_to_feed_summary() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(rss_feed(&base, &[("Flaky", "down")]), "application/rss+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let mut options = full_options();
    options.generate_title_image = false;
    let feed_id = make_feed(&h.store, Some(user), &format!("{base}/feed.xml"), options).await;

    let summary = h.engine.run_feed(feed_id, false).await.unwrap();
    assert!(summary.success);
    assert_eq!(summary.inserted, 1);

    let articles = h.store.list_articles_for_feed(feed_id).await.unwrap();
    assert!(articles[0].content.contains("Summary of Flaky"));
}

#[tokio::test]
async fn concurrent_runs_of_same_feed_serialize() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(rss_feed(&base, &[("A", "1")]), "application/rss+xml")
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(&base, "text", false), "text/html"))
        .mount(&server)
        .await;

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let mut options = full_options();
    options.generate_title_image = false;
    let feed_id = make_feed(&h.store, Some(user), &format!("{base}/feed.xml"), options).await;

    let (left, right) = tokio::join!(
        h.engine.run_feed(feed_id, false),
        h.engine.run_feed(feed_id, false)
    );
    let left = left.unwrap();
    let right = right.unwrap();

    // Both runs completed, one inserted, the other saw the duplicate.
    assert!(left.success && right.success);
    assert_eq!(left.inserted + right.inserted, 1);
    assert_eq!(h.store.count_articles(feed_id).await.unwrap(), 1);
}

#[tokio::test]
async fn feed_content_kind_uses_feed_body_without_page_fetch() {
    let server = MockServer::start().await;
    let base = server.uri();

    // Only the feed document is mocked; any article-page fetch would 404
    // and the assertions below would fail.
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(rss_feed(&base, &[("A", "1")]), "application/rss+xml"))
        .mount(&server)
        .await;

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let feed_id = h
        .store
        .create_feed(NewFeed {
            user_id: Some(user),
            kind: FeedKind::FeedContent,
            identifier: format!("{base}/feed.xml"),
            name: "inline".to_string(),
            options: FeedOptions { generate_title_image: false, ..Default::default() },
            ai_hints: AiHints::default(),
        })
        .await
        .unwrap();

    let summary = h.engine.run_feed(feed_id, false).await.unwrap();
    assert!(summary.success);
    assert_eq!(summary.inserted, 1);

    let articles = h.store.list_articles_for_feed(feed_id).await.unwrap();
    assert!(articles[0].content.contains("Summary of A"));
    assert!(articles[0].content.starts_with("<article>"));
}

fn multipage_article(base: &str, body: &str, with_pagination: bool) -> String {
    let pagination = if with_pagination {
        format!(
            "<div class=\"page-links\"><a href=\"{base}/story/\">1</a><a href=\"{base}/story/2/\">2</a></div>"
        )
    } else {
        String::new()
    };
    format!(
        "<html><body><div class=\"entry-content\"><p>{body}</p>{pagination}</div></body></html>"
    )
}

#[tokio::test]
async fn mein_mmo_traverses_numbered_pages_when_enabled() {
    let server = MockServer::start().await;
    let base = server.uri();

    let feed = format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>MeinMMO</title>\
         <link>{base}</link><description>d</description>\
         <item><title>Long read</title><link>{base}/story/</link>\
         <description>teaser</description></item></channel></rss>"
    );
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(feed, "application/rss+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/story/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(multipage_article(&base, "part one", true), "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/story/2/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(multipage_article(&base, "part two", false), "text/html"))
        .mount(&server)
        .await;

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let feed_id = h
        .store
        .create_feed(NewFeed {
            user_id: Some(user),
            kind: FeedKind::MeinMmo,
            identifier: format!("{base}/feed"),
            name: "mmo".to_string(),
            options: FeedOptions {
                generate_title_image: false,
                traverse_multipage: true,
                ..Default::default()
            },
            ai_hints: AiHints::default(),
        })
        .await
        .unwrap();

    let summary = h.engine.run_feed(feed_id, false).await.unwrap();
    assert!(summary.success);
    assert_eq!(summary.inserted, 1);

    let articles = h.store.list_articles_for_feed(feed_id).await.unwrap();
    assert!(articles[0].content.contains("part one"));
    assert!(articles[0].content.contains("part two"));
    // The pagination block itself never survives into the article.
    assert!(!articles[0].content.contains("page-links"));
}

#[tokio::test]
async fn mein_mmo_without_traversal_keeps_first_page_only() {
    let server = MockServer::start().await;
    let base = server.uri();

    let feed = format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>MeinMMO</title>\
         <link>{base}</link><description>d</description>\
         <item><title>Long read</title><link>{base}/story/</link>\
         <description>teaser</description></item></channel></rss>"
    );
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(feed, "application/rss+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/story/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(multipage_article(&base, "part one", true), "text/html"))
        .mount(&server)
        .await;

    let h = harness().await;
    let user = h.store.create_user("alice", None, "pw").await.unwrap();
    let feed_id = h
        .store
        .create_feed(NewFeed {
            user_id: Some(user),
            kind: FeedKind::MeinMmo,
            identifier: format!("{base}/feed"),
            name: "mmo".to_string(),
            options: FeedOptions { generate_title_image: false, ..Default::default() },
            ai_hints: AiHints::default(),
        })
        .await
        .unwrap();

    let summary = h.engine.run_feed(feed_id, false).await.unwrap();
    assert!(summary.success);
    assert_eq!(summary.inserted, 1);

    let articles = h.store.list_articles_for_feed(feed_id).await.unwrap();
    assert!(articles[0].content.contains("part one"));
    assert!(!articles[0].content.contains("part two"));
    // Page two was never requested.
    let requests = server.received_requests().await.unwrap();
    assert!(!requests.iter().any(|r| r.url.path() == "/story/2/"));
}
