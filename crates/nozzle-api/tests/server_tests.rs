//! End-to-end tests of the REST surface against an in-process router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use nozzle_api::{build_router, AppState, Credentials, TokenRegistry, TOKEN_LENGTH};
use nozzle_cache::TtlCache;
use nozzle_types::{tags, Counter, Envelope, Gauge, GaugeValue};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const USERNAME: &str = "nozzle";
const PASSWORD: &str = "secret";

fn test_state(idle_timeout: Duration) -> AppState {
    AppState {
        cache: Arc::new(TtlCache::new(Duration::from_secs(10))),
        tokens: Arc::new(TokenRegistry::default()),
        credentials: Arc::new(Credentials {
            username: USERNAME.to_string(),
            password: PASSWORD.to_string(),
        }),
        idle_timeout,
    }
}

fn test_app() -> (Router, AppState) {
    let state = test_state(Duration::from_secs(60));
    (build_router(state.clone()), state)
}

fn envelope(origin: &str, ip: &str, timestamp: i64) -> Envelope {
    Envelope {
        timestamp,
        tags: [
            (tags::DEPLOYMENT.to_string(), "d".to_string()),
            (tags::JOB.to_string(), "j".to_string()),
            (tags::INDEX.to_string(), "0".to_string()),
            (tags::IP.to_string(), ip.to_string()),
            (tags::ORIGIN.to_string(), origin.to_string()),
        ]
        .into(),
        ..Envelope::default()
    }
}

fn gauge_envelope(origin: &str, ip: &str, timestamp: i64, name: &str, value: f64) -> Envelope {
    Envelope {
        gauge: Some(Gauge {
            metrics: [(
                name.to_string(),
                GaugeValue {
                    unit: String::new(),
                    value,
                },
            )]
            .into(),
        }),
        ..envelope(origin, ip, timestamp)
    }
}

fn counter_envelope(origin: &str, ip: &str, timestamp: i64, name: &str, total: u64) -> Envelope {
    Envelope {
        counter: Some(Counter {
            name: name.to_string(),
            delta: 5,
            total,
        }),
        ..envelope(origin, ip, timestamp)
    }
}

async fn mint_token(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/token")
                .header("username", USERNAME)
                .header("password", PASSWORD)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    response
        .headers()
        .get("token")
        .expect("token header missing")
        .to_str()
        .unwrap()
        .to_string()
}

async fn get_with_token(app: &Router, path: &str, token: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(path)
                .header("token", token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn token_endpoint_requires_credentials() {
    let (app, _) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/token").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_endpoint_rejects_wrong_credentials() {
    let (app, _) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/token")
                .header("username", USERNAME)
                .header("password", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_endpoint_mints_registered_token() {
    let (app, state) = test_app();

    let token = mint_token(&app).await;

    assert_eq!(token.len(), TOKEN_LENGTH);
    assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    assert!(state.tokens.get(&token).is_some());
}

#[tokio::test]
async fn token_endpoint_rejects_non_get() {
    let (app, _) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/token")
                .header("username", USERNAME)
                .header("password", PASSWORD)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn origin_endpoint_rejects_missing_and_unknown_tokens() {
    let (app, _) = test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/gorouters")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_with_token(&app, "/gorouters", "bogus-token-1234").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn origin_endpoint_rejects_non_get_regardless_of_token() {
    let (app, _) = test_app();
    let token = mint_token(&app).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/gorouters")
                .header("token", token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unknown_origin_returns_no_content() {
    let (app, _) = test_app();
    let token = mint_token(&app).await;

    let response = get_with_token(&app, "/gorouters", &token).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn gauge_ingest_is_served_back_as_json() {
    let (app, state) = test_app();
    let token = mint_token(&app).await;

    state.cache.update(&gauge_envelope(
        "cc",
        "1.2.3.4",
        1_257_894_000_000_000_000,
        "cpu",
        0.42,
    ));

    let response = get_with_token(&app, "/cloud_controllers", &token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(
        body,
        serde_json::json!([{
            "Deployment": "d",
            "Job": "j",
            "Index": "0",
            "IP": "1.2.3.4",
            "ValueMetrics": {
                "cpu": {"metrics": [{"value": 0.42, "timestamp": 1_257_894_000_000_000_000_i64}]}
            },
            "CounterMetrics": {}
        }])
    );
}

#[tokio::test]
async fn counter_ingest_stores_total_not_delta() {
    let (app, state) = test_app();
    let token = mint_token(&app).await;

    state
        .cache
        .update(&counter_envelope("gorouter", "1.2.3.4", 7, "req", 100));

    let response = get_with_token(&app, "/gorouters", &token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(
        body[0]["CounterMetrics"]["req"]["metrics"],
        serde_json::json!([{"value": 100.0, "timestamp": 7}])
    );
    assert_eq!(body[0]["ValueMetrics"], serde_json::json!({}));
}

#[tokio::test]
async fn origin_response_covers_every_cached_resource() {
    let (app, state) = test_app();
    let token = mint_token(&app).await;

    state
        .cache
        .update(&counter_envelope("rep", "10.0.0.1", 1, "req", 1));
    state
        .cache
        .update(&counter_envelope("rep", "10.0.0.2", 1, "req", 2));

    let response = get_with_token(&app, "/reps", &token).await;
    let body = body_json(response).await;

    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);

    let mut ips: Vec<&str> = entries
        .iter()
        .map(|entry| entry["IP"].as_str().unwrap())
        .collect();
    ips.sort_unstable();
    assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
}

#[tokio::test]
async fn swept_origin_returns_no_content_again() {
    let state = test_state(Duration::from_secs(60));
    let state = AppState {
        cache: Arc::new(TtlCache::new(Duration::ZERO)),
        ..state
    };
    let app = build_router(state.clone());
    let token = mint_token(&app).await;

    state
        .cache
        .update(&counter_envelope("etcd", "10.0.0.1", 1, "req", 1));
    assert_eq!(
        get_with_token(&app, "/etcds", &token).await.status(),
        StatusCode::OK
    );

    state.cache.sweep();

    assert_eq!(
        get_with_token(&app, "/etcds", &token).await.status(),
        StatusCode::NO_CONTENT
    );
}

#[tokio::test(start_paused = true)]
async fn idle_token_is_rejected_after_timeout() {
    let state = test_state(Duration::from_secs(1));
    let app = build_router(state.clone());
    let token = mint_token(&app).await;

    assert_eq!(
        get_with_token(&app, "/gorouters", &token).await.status(),
        StatusCode::NO_CONTENT
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    tokio::task::yield_now().await;

    assert_eq!(
        get_with_token(&app, "/gorouters", &token).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert!(state.tokens.get(&token).is_none());
}

#[tokio::test]
async fn every_origin_endpoint_is_registered() {
    let (app, _) = test_app();
    let token = mint_token(&app).await;

    for &(path, _) in nozzle_api::ORIGIN_ENDPOINTS {
        let response = get_with_token(&app, path, &token).await;
        assert_eq!(
            response.status(),
            StatusCode::NO_CONTENT,
            "endpoint {path} missing or misbehaving"
        );
    }
}
