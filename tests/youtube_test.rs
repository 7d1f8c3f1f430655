use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yana::aggregator::youtube::{resolve_channel_id, YoutubeApi};
use yana::config::FetchConfig;
use yana::Fetcher;

fn search_body(items: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "kind": "youtube#searchListResponse", "items": items })
}

#[tokio::test]
async fn canonical_channel_id_resolves_without_any_api_call() {
    let fetcher = Fetcher::new(FetchConfig::default());
    let id = resolve_channel_id(&fetcher, None, "UCBJycsmduvYEL83R_U4JriQ")
        .await
        .unwrap();
    assert_eq!(id, "UCBJycsmduvYEL83R_U4JriQ");

    let id = resolve_channel_id(
        &fetcher,
        None,
        "https://www.youtube.com/channel/UCBJycsmduvYEL83R_U4JriQ",
    )
    .await
    .unwrap();
    assert_eq!(id, "UCBJycsmduvYEL83R_U4JriQ");
}

#[tokio::test]
async fn handle_without_api_key_is_a_validation_error() {
    let fetcher = Fetcher::new(FetchConfig::default());
    let err = resolve_channel_id(&fetcher, None, "@mkbhd").await.unwrap_err();
    assert!(err.to_string().contains("API key"));
}

#[tokio::test]
async fn search_prefers_custom_url_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "mkbhd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(serde_json::json!([
            { "id": { "channelId": "UC_first" }, "snippet": { "title": "First Hit" } },
            { "id": { "channelId": "UC_custom" }, "snippet": { "title": "Second Hit", "customUrl": "@mkbhd" } },
            { "id": { "channelId": "UC_third" }, "snippet": { "title": "mkbhd" } }
        ]))))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(FetchConfig::default());
    let api = YoutubeApi::with_base(server.uri(), "test-key");
    let id = resolve_channel_id(&fetcher, Some(&api), "@mkbhd").await.unwrap();
    assert_eq!(id, "UC_custom");
}

#[tokio::test]
async fn empty_search_falls_back_to_for_username() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(serde_json::json!([]))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .and(query_param("forUsername", "mkbhd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [ { "id": "UC_username" } ]
        })))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(FetchConfig::default());
    let api = YoutubeApi::with_base(server.uri(), "test-key");
    let id = resolve_channel_id(&fetcher, Some(&api), "@mkbhd").await.unwrap();
    assert_eq!(id, "UC_username");
}

#[tokio::test]
async fn unresolvable_handle_is_a_validation_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(serde_json::json!([]))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(FetchConfig::default());
    let api = YoutubeApi::with_base(server.uri(), "test-key");
    let err = resolve_channel_id(&fetcher, Some(&api), "@nobody").await.unwrap_err();
    assert!(err.to_string().contains("could not resolve"));
}

#[tokio::test]
async fn user_url_resolves_via_for_username_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .and(query_param("forUsername", "marques"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [ { "id": "UC_legacy" } ]
        })))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(FetchConfig::default());
    let api = YoutubeApi::with_base(server.uri(), "test-key");
    let id = resolve_channel_id(&fetcher, Some(&api), "https://www.youtube.com/user/marques")
        .await
        .unwrap();
    assert_eq!(id, "UC_legacy");
    // The search endpoint never had to answer.
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/search"));
}
