use crate::error::{AggregatorError, Result};
use crate::store::Store;
use axum::http::HeaderMap;
use rand::RngCore;

const AUTH_SCHEME: &str = "GoogleLogin auth=";

/// Resolve the `Authorization: GoogleLogin auth=<token>` header to a
/// user id.
pub async fn authenticate(store: &Store, headers: &HeaderMap) -> Result<i64> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AggregatorError::Unauthorized)?;
    let token = header.strip_prefix(AUTH_SCHEME).ok_or(AggregatorError::Unauthorized)?;
    store.resolve_auth_token(token.trim()).await
}

/// ClientLogin reply body. All three fields carry the same token; SID
/// and LSID only exist for protocol compatibility.
pub fn client_login_body(token: &str) -> String {
    format!("Auth={token}\nSID={token}\nLSID={token}\n")
}

/// Short-lived opaque write token. Clients echo it on POSTs; it carries
/// no state of its own.
pub fn write_token() -> String {
    let mut raw = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}
