use crate::handlers;
use crate::routes::ORIGIN_ENDPOINTS;
use crate::state::{AppState, Credentials};
use crate::token::TokenRegistry;
use anyhow::Context;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use nozzle_cache::TtlCache;
use nozzle_config::Configuration;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The REST surface of the bridge.
///
/// Serves the fixed origin endpoints and `/token` over HTTP, or HTTPS when
/// configured with a certificate and key.
pub struct WebServer {
    state: AppState,
    port: u32,
    use_ssl: bool,
    cert_location: String,
    key_location: String,
}

impl WebServer {
    pub fn new(config: &Configuration, cache: Arc<TtlCache>) -> Self {
        let state = AppState {
            cache,
            tokens: Arc::new(TokenRegistry::default()),
            credentials: Arc::new(Credentials {
                username: config.uaa_username.clone(),
                password: config.uaa_password.clone(),
            }),
            idle_timeout: config.idle_timeout(),
        };

        Self {
            state,
            port: config.web_server_port,
            use_ssl: config.web_server_use_ssl,
            cert_location: config.web_server_cert_location.clone(),
            key_location: config.web_server_key_location.clone(),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Binds and serves in a background task. Anything sent on the returned
    /// channel is a fatal server failure.
    pub fn start(&self) -> mpsc::Receiver<anyhow::Error> {
        let (errors, rx) = mpsc::channel(1);
        let router = self.router();
        let port = self.port;
        let use_ssl = self.use_ssl;
        let cert_location = self.cert_location.clone();
        let key_location = self.key_location.clone();

        tokio::spawn(async move {
            if let Err(error) = serve(router, port, use_ssl, cert_location, key_location).await {
                let _ = errors.send(error).await;
            }
        });

        rx
    }
}

/// Registers `/token` plus every fixed origin endpoint. All routes are
/// GET-only; axum answers other methods on a registered path with 405.
pub fn build_router(state: AppState) -> Router {
    let mut router: Router<AppState> = Router::new().route("/token", get(handlers::create_token));

    info!(endpoints = ORIGIN_ENDPOINTS.len(), "registering handlers");
    for &(path, origin) in ORIGIN_ENDPOINTS {
        router = router.route(
            path,
            get(move |state: State<AppState>, headers: HeaderMap| {
                handlers::origin_metrics(state, headers, origin)
            }),
        );
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve(
    router: Router,
    port: u32,
    use_ssl: bool,
    cert_location: String,
    key_location: String,
) -> anyhow::Result<()> {
    let port = u16::try_from(port).with_context(|| format!("web server port {port} out of range"))?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    if use_ssl {
        let cert = nozzle_config::absolute_path(Path::new(&cert_location));
        let key = nozzle_config::absolute_path(Path::new(&key_location));
        info!(%addr, cert = %cert.display(), "web server listening with TLS");

        let tls = RustlsConfig::from_pem_file(&cert, &key).await.with_context(|| {
            format!(
                "loading TLS material from {} and {}",
                cert.display(),
                key.display()
            )
        })?;

        axum_server::bind_rustls(addr, tls)
            .serve(router.into_make_service())
            .await
            .context("serving HTTPS")?;
    } else {
        info!(%addr, "web server listening");
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        axum::serve(listener, router).await.context("serving HTTP")?;
    }

    Ok(())
}
