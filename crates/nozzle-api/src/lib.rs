//! Token-gated REST surface over the metric cache.
//!
//! Exposes one GET endpoint per known emitter origin plus `/token`, which
//! trades the nozzle's UAA credentials for a session token with an idle
//! timeout. The binary target wires configuration, cache, nozzle, and web
//! server into the running bridge.

mod errors;
mod handlers;
mod routes;
mod server;
mod state;
mod token;

pub use errors::ApiError;
pub use routes::ORIGIN_ENDPOINTS;
pub use server::{build_router, WebServer};
pub use state::{AppState, Credentials};
pub use token::{InvalidTokenError, Token, TokenRegistry, TOKEN_LENGTH};
