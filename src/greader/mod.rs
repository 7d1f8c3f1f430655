pub mod auth;
pub mod edit;
pub mod ids;
pub mod streams;
pub mod subscriptions;

use crate::error::AggregatorError;
use crate::scheduler::Engine;
use crate::store::Store;
use crate::types::FeedKind;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use ids::{parse_stream_id, StreamId};
use serde_json::json;
use std::sync::Arc;
use streams::{StreamQuery, StreamService};
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub streams: Arc<StreamService>,
    pub engine: Arc<Engine>,
    pub token_ttl_days: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/accounts/ClientLogin", post(client_login))
        .route("/reader/api/0/token", get(token))
        .route("/reader/api/0/user-info", get(user_info))
        .route("/reader/api/0/subscription/list", get(subscription_list))
        .route("/reader/api/0/subscription/edit", post(subscription_edit))
        .route("/reader/api/0/unread-count", get(unread_count))
        .route("/reader/api/0/stream/items/ids", get(stream_items_ids))
        .route("/reader/api/0/stream/contents/*stream_id", get(stream_contents))
        .route("/reader/api/0/edit-tag", post(edit_tag))
        .route("/reader/api/0/mark-all-as-read", post(mark_all_as_read))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GReader requests carry repeated keys (`i` in particular), so every
/// handler parses the raw query/body pairs instead of a typed form.
struct Params(Vec<(String, String)>);

impl Params {
    fn parse(raw: &str) -> Self {
        Self(
            url::form_urlencoded::parse(raw.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    fn from_query(raw: &Option<String>) -> Self {
        Self::parse(raw.as_deref().unwrap_or(""))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn get_all(&self, key: &str) -> Vec<String> {
        self.0.iter().filter(|(k, _)| k == key).map(|(_, v)| v.clone()).collect()
    }
}

/// Error wrapper mapping the taxonomy onto HTTP statuses.
struct ApiError(AggregatorError);

impl From<AggregatorError> for ApiError {
    fn from(e: AggregatorError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AggregatorError::Unauthorized => StatusCode::UNAUTHORIZED,
            AggregatorError::Validation(_) => StatusCode::BAD_REQUEST,
            AggregatorError::FeedNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %self.0, "request failed");
        }
        (status, self.0.to_string()).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn client_login(State(state): State<AppState>, body: String) -> ApiResult<String> {
    let params = Params::parse(&body);
    let email = params
        .get("Email")
        .or_else(|| params.get("user"))
        .ok_or(AggregatorError::Unauthorized)?;
    let password = params
        .get("Passwd")
        .or_else(|| params.get("password"))
        .ok_or(AggregatorError::Unauthorized)?;

    let user = state.store.verify_login(email, password).await?;
    let token = state.store.create_auth_token(user.id, state.token_ttl_days).await?;
    Ok(auth::client_login_body(&token))
}

async fn token(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<String> {
    auth::authenticate(&state.store, &headers).await?;
    Ok(auth::write_token())
}

async fn user_info(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let user_id = auth::authenticate(&state.store, &headers).await?;
    let user = state.store.get_user(user_id).await?;
    Ok(Json(json!({
        "userId": user.id.to_string(),
        "userName": user.name,
        "userProfileId": user.id.to_string(),
        "userEmail": user.email.unwrap_or_default(),
    })))
}

async fn subscription_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<subscriptions::SubscriptionList>> {
    let user_id = auth::authenticate(&state.store, &headers).await?;
    Ok(Json(subscriptions::subscription_list(&state.store, user_id).await?))
}

async fn subscription_edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<&'static str> {
    let user_id = auth::authenticate(&state.store, &headers).await?;
    let params = Params::parse(&body);

    let stream = params
        .get("s")
        .ok_or_else(|| AggregatorError::Validation("missing stream parameter".to_string()))?;
    let action = params.get("ac").unwrap_or("edit");

    match action {
        "subscribe" => {
            let identifier = stream.strip_prefix("feed/").unwrap_or(stream);
            let canonical = state
                .engine
                .validate_identifier(FeedKind::FeedContent, identifier)
                .await?;
            let name = params.get("t").map(|t| t.to_string()).unwrap_or_else(|| canonical.clone());
            let feed_id = state
                .store
                .create_feed(crate::store::NewFeed {
                    user_id: Some(user_id),
                    kind: FeedKind::FeedContent,
                    identifier: canonical,
                    name,
                    options: Default::default(),
                    ai_hints: Default::default(),
                })
                .await?;
            if let Some(label) = params.get("a") {
                if let Some(StreamId::Label(label)) = parse_stream_id(label) {
                    let group_id = state.store.create_feed_group(user_id, &label).await?;
                    state.store.set_feed_group(feed_id, Some(group_id)).await?;
                }
            }
        }
        "unsubscribe" => {
            let feed_id = require_owned_feed(&state, user_id, stream).await?;
            state.store.delete_feed(feed_id).await?;
        }
        "edit" => {
            let feed_id = require_owned_feed(&state, user_id, stream).await?;
            if let Some(title) = params.get("t") {
                state.store.set_feed_name(feed_id, title).await?;
            }
            if let Some(add) = params.get("a") {
                if let Some(StreamId::Label(label)) = parse_stream_id(add) {
                    let group_id = state.store.create_feed_group(user_id, &label).await?;
                    state.store.set_feed_group(feed_id, Some(group_id)).await?;
                }
            }
            if params.get("r").is_some() {
                state.store.set_feed_group(feed_id, None).await?;
            }
        }
        other => {
            return Err(AggregatorError::Validation(format!("unknown subscription action `{other}`")).into())
        }
    }
    Ok("OK")
}

async fn require_owned_feed(state: &AppState, user_id: i64, stream: &str) -> ApiResult<i64> {
    let Some(StreamId::Feed(feed_id)) = parse_stream_id(stream) else {
        return Err(AggregatorError::unknown_stream(stream).into());
    };
    let feed = state.store.get_feed(feed_id).await?;
    if feed.user_id != Some(user_id) {
        return Err(AggregatorError::Unauthorized.into());
    }
    Ok(feed_id)
}

async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<streams::UnreadCounts>> {
    let user_id = auth::authenticate(&state.store, &headers).await?;
    let params = Params::from_query(&raw);
    let include_all = params.get("all").map(|v| v == "true").unwrap_or(false);
    Ok(Json(state.streams.unread_count(user_id, include_all).await?))
}

async fn stream_items_ids(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<streams::ItemRefs>> {
    let user_id = auth::authenticate(&state.store, &headers).await?;
    let params = Params::from_query(&raw);

    let stream_raw = params
        .get("s")
        .ok_or_else(|| AggregatorError::Validation("missing stream parameter".to_string()))?;
    let stream = parse_stream_id(stream_raw).ok_or_else(|| AggregatorError::unknown_stream(stream_raw))?;

    let query = stream_query_from_params(&params);
    Ok(Json(state.streams.stream_item_ids(user_id, &stream, &query).await?))
}

async fn stream_contents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(stream_raw): Path<String>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<streams::StreamContents>> {
    let user_id = auth::authenticate(&state.store, &headers).await?;
    let params = Params::from_query(&raw);

    let stream =
        parse_stream_id(&stream_raw).ok_or_else(|| AggregatorError::unknown_stream(&stream_raw))?;

    let mut query = stream_query_from_params(&params);
    query.item_ids = params
        .get_all("i")
        .iter()
        .filter_map(|raw_id| ids::parse_item_id(raw_id))
        .collect();

    Ok(Json(
        state
            .streams
            .stream_contents(user_id, &stream, &stream_raw, &query)
            .await?,
    ))
}

async fn edit_tag(State(state): State<AppState>, headers: HeaderMap, body: String) -> ApiResult<&'static str> {
    let user_id = auth::authenticate(&state.store, &headers).await?;
    let params = Params::parse(&body);
    edit::edit_tags(
        &state.store,
        user_id,
        &params.get_all("i"),
        &params.get_all("a"),
        &params.get_all("r"),
    )
    .await?;
    Ok("OK")
}

async fn mark_all_as_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<&'static str> {
    let user_id = auth::authenticate(&state.store, &headers).await?;
    let params = Params::parse(&body);
    let stream = params
        .get("s")
        .ok_or_else(|| AggregatorError::Validation("missing stream parameter".to_string()))?;
    let ts = params.get("ts").and_then(|v| v.parse::<i64>().ok());
    edit::mark_all_as_read(&state.store, user_id, stream, ts).await?;
    Ok("OK")
}

fn stream_query_from_params(params: &Params) -> StreamQuery {
    let older_than: Option<DateTime<Utc>> = params
        .get("ot")
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|secs| *secs > 0)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

    StreamQuery {
        older_than,
        exclude_read: params.get("xt").map(ids::is_read_tag).unwrap_or(false),
        starred_only: params.get("it").map(ids::is_starred_tag).unwrap_or(false),
        reverse_order: params.get("r").map(|v| v == "o").unwrap_or(false),
        limit: params.get("n").and_then(|v| v.parse::<i64>().ok()).filter(|n| *n > 0),
        continuation: params.get("c").map(|c| c.to_string()),
        item_ids: Vec::new(),
    }
}
