use crate::token::TokenRegistry;
use nozzle_cache::TtlCache;
use std::sync::Arc;
use std::time::Duration;

/// Credentials accepted by the `/token` endpoint.
///
/// These are the same UAA client credentials the nozzle authenticates
/// with; the REST surface has no separate API key.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<TtlCache>,
    pub tokens: Arc<TokenRegistry>,
    pub credentials: Arc<Credentials>,
    pub idle_timeout: Duration,
}
