use crate::errors::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use nozzle_cache::Resource;
use tracing::{debug, info};

const USERNAME_HEADER: &str = "username";
const PASSWORD_HEADER: &str = "password";
const TOKEN_HEADER: &str = "token";

/// `GET /token`: trades the configured credentials for a session token,
/// returned in the `token` response header.
pub async fn create_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    info!("received /token request");

    let username = header_value(&headers, USERNAME_HEADER);
    let password = header_value(&headers, PASSWORD_HEADER);

    if username.is_empty() || password.is_empty() {
        debug!("no username or password in header");
        return Err(ApiError::MissingCredentials);
    }

    if username != state.credentials.username || password != state.credentials.password {
        debug!(username = %username, "wrong username or password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.tokens.mint(state.idle_timeout);
    debug!(token = %token.value(), "successful login, generated token");

    let value = http::HeaderValue::from_str(token.value())
        .map_err(|e| ApiError::internal(format!("token not representable as header: {e}")))?;

    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(TOKEN_HEADER, value);
    Ok(response)
}

/// Origin endpoints: serves the cached resources under one origin tag.
///
/// The `token` header must name a live session token. An origin with no
/// cached resources answers `204` with an empty JSON object, matching the
/// collectors that poll these endpoints.
pub async fn origin_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    origin: &'static str,
) -> Result<Response, ApiError> {
    info!(origin = %origin, "received origin request");

    let supplied = header_value(&headers, TOKEN_HEADER);
    let token = state.tokens.get(supplied).ok_or(ApiError::InvalidToken)?;
    token.use_token().map_err(|_| ApiError::InvalidToken)?;

    match state.cache.get_origin(origin) {
        Some(bucket) => {
            let resources: Vec<&Resource> = bucket.values().map(|resource| resource.as_ref()).collect();
            Ok((StatusCode::OK, Json(resources)).into_response())
        }
        None => Ok((StatusCode::NO_CONTENT, "{}").into_response()),
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
