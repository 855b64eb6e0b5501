//! Router-level tests for the cache admin endpoints.

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Method, Request, StatusCode},
    Router,
};
use futures::StreamExt;
use http_body_util::BodyExt;
use nexus_cache::{
    BusMessage, CachingService, InMemoryRemoteStore, InvalidationBus, InvalidationPublisher,
    LocalInvalidationBus,
};
use nexus_config::AppConfig;
use nexus_rest::{create_router, create_router_with_api, AppState};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const TOKEN: &str = "test-admin-token";

struct TestApp {
    router: Router,
    cache: Arc<CachingService>,
    bus: Arc<LocalInvalidationBus>,
}

fn app() -> TestApp {
    let mut config = AppConfig::default();
    config.security.admin_tokens = vec![TOKEN.to_string()];

    let cache = Arc::new(CachingService::with_defaults(Arc::new(InMemoryRemoteStore::new())));
    let bus = Arc::new(LocalInvalidationBus::default());
    let state = AppState::new(cache.clone(), InvalidationPublisher::new(bus.clone()));

    TestApp {
        router: create_router(state, &config),
        cache,
        bus,
    }
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {}", TOKEN));

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_get_existing_key() {
    let app = app();
    app.cache.set("about", &json!({"network": "mainnet"}), Duration::from_secs(60)).await.unwrap();

    let response = app.router.oneshot(request(Method::GET, "/caching/about", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"], json!({"network": "mainnet"}));
}

#[tokio::test]
async fn test_get_missing_key_is_404() {
    let app = app();

    let response = app.router.oneshot(request(Method::GET, "/caching/nope", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_put_writes_remote_and_broadcasts() {
    let app = app();
    let mut messages = app.bus.subscribe().await.unwrap();

    let response = app
        .router
        .oneshot(request(
            Method::PUT,
            "/caching/economics",
            Some(json!({"value": {"apr": 7}, "ttl": 600})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.cache.keys("*").await.unwrap(), vec!["economics".to_string()]);
    assert_eq!(
        messages.next().await,
        Some(BusMessage::new("deleteCacheKeys", r#"["economics"]"#))
    );
}

#[tokio::test]
async fn test_put_with_zero_ttl_is_rejected() {
    let app = app();

    let response = app
        .router
        .oneshot(request(Method::PUT, "/caching/x", Some(json!({"value": 1, "ttl": 0}))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_put_with_out_of_range_ttl_is_rejected() {
    let app = app();

    let response = app
        .router
        .oneshot(request(
            Method::PUT,
            "/caching/economics",
            Some(json!({"value": 1, "ttl": u64::MAX})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.cache.keys("*").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_pattern_broadcasts_removed_keys() {
    let app = app();
    for key in ["tok:1", "tok:2", "other"] {
        app.cache.set(key, &1, Duration::from_secs(60)).await.unwrap();
    }
    let mut messages = app.bus.subscribe().await.unwrap();

    let response = app.router.oneshot(request(Method::DELETE, "/caching/tok:*", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["keys"], json!(["tok:1", "tok:2"]));
    assert_eq!(
        messages.next().await.unwrap().payload,
        r#"["tok:1","tok:2"]"#
    );
    assert_eq!(app.cache.keys("*").await.unwrap(), vec!["other".to_string()]);
}

#[tokio::test]
async fn test_list_keys_by_substring() {
    let app = app();
    for key in ["identities", "identityProfile:alice", "nodes"] {
        app.cache.set(key, &1, Duration::from_secs(60)).await.unwrap();
    }

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/caching?keys=ident", None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["keys"], json!(["identities", "identityProfile:alice"]));

    let response = app.router.oneshot(request(Method::GET, "/caching", None)).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["keys"], json!([]));
}

#[tokio::test]
async fn test_list_keys_matches_glob_characters_literally() {
    let app = app();
    for key in ["tok:n?:1", "tok:nx:1", "range[1]"] {
        app.cache.set(key, &1, Duration::from_secs(60)).await.unwrap();
    }

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/caching?keys=n%3F", None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["keys"], json!(["tok:n?:1"]));

    let response = app
        .router
        .oneshot(request(Method::GET, "/caching?keys=%5B1%5D", None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["keys"], json!(["range[1]"]));
}

#[tokio::test]
async fn test_flush_clears_and_broadcasts_wildcard() {
    let app = app();
    app.cache.set("a", &1, Duration::from_secs(60)).await.unwrap();
    let mut messages = app.bus.subscribe().await.unwrap();

    let response = app.router.oneshot(request(Method::DELETE, "/caching", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.cache.keys("*").await.unwrap().is_empty());
    assert_eq!(messages.next().await.unwrap().payload, r#"["*"]"#);
}

#[tokio::test]
async fn test_admin_token_required() {
    let app = app();

    let missing = Request::builder().uri("/caching/about").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(missing).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/caching/about")
        .header(AUTHORIZATION, "Bearer not-an-admin")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_routes_are_cached_and_admin_routes_are_not() {
    let mut config = AppConfig::default();
    config.security.admin_tokens = vec![TOKEN.to_string()];

    let cache = Arc::new(CachingService::with_defaults(Arc::new(InMemoryRemoteStore::new())));
    let state = AppState::new(
        cache.clone(),
        InvalidationPublisher::new(Arc::new(LocalInvalidationBus::default())),
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    let api = Router::new().route(
        "/economics",
        axum::routing::get(move || {
            let calls = handler_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                axum::Json(json!({"totalSupply": "22000000"}))
            }
        }),
    );
    let router = create_router_with_api(state, &config, api);

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(Request::builder().uri("/economics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"totalSupply": "22000000"}));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.local_keys("response:*"), vec!["response:/economics".to_string()]);

    cache.set("about", &json!({"v": 1}), Duration::from_secs(60)).await.unwrap();
    router
        .clone()
        .oneshot(request(Method::GET, "/caching/about", None))
        .await
        .unwrap();
    assert_eq!(cache.local_keys("response:*").len(), 1);
}
