//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::clients::{
    DEMO_USER, InMemoryCartClient, InMemoryCatalogClient, InMemoryCurrencyClient, InMemoryEmailClient,
    InMemoryPaymentClient, InMemoryQuoteClient, InMemoryShippingClient,
};
use checkout::{
    CheckoutOrchestrator, Dependencies, FaultPolicyProvider, LogEventPublisher, ORDERS_TOPIC,
    Operation, OrchestratorConfig, RetryPolicy,
};
use domain::{CurrencyCode, Money, UserId};
use event_log::{EventLogExt, InMemoryEventLog};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: axum::Router,
    payment: InMemoryPaymentClient,
    log: InMemoryEventLog,
}

async fn setup() -> TestApp {
    let usd = CurrencyCode::new("USD").unwrap();
    let cart = InMemoryCartClient::new();
    cart.add_item(&UserId::new("user-1"), "A", 3).await;
    let catalog = InMemoryCatalogClient::new();
    catalog
        .add_product("A", "Widget", Money::from_cents(usd.clone(), 1250))
        .await;
    let payment = InMemoryPaymentClient::new();
    let log = InMemoryEventLog::with_topic(ORDERS_TOPIC, 1).await.unwrap();

    let deps = Dependencies {
        cart: Arc::new(cart),
        catalog: Arc::new(catalog),
        currency: Arc::new(InMemoryCurrencyClient::new()),
        quote: Arc::new(InMemoryQuoteClient::new(Money::from_cents(usd, 500))),
        payment: Arc::new(payment.clone()),
        shipping: Arc::new(InMemoryShippingClient::new()),
        email: Arc::new(InMemoryEmailClient::new()),
    };
    let config = OrchestratorConfig {
        retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
        ..OrchestratorConfig::default()
    };
    let orchestrator = CheckoutOrchestrator::new(
        deps,
        Arc::new(LogEventPublisher::new(log.clone())),
        Arc::new(FaultPolicyProvider::disabled()),
        config,
    );

    TestApp {
        router: api::create_app(api::AppState::new(orchestrator), get_metrics_handle()),
        payment,
        log,
    }
}

fn checkout_body(key: &str, user: &str) -> serde_json::Value {
    serde_json::json!({
        "user_id": user,
        "user_currency": "USD",
        "address": {
            "street_address": "1 Main St",
            "city": "Springfield",
            "state": "IL",
            "country": "US",
            "zip_code": "62701"
        },
        "email": "buyer@example.com",
        "payment_token": "4111-1111-1111-1111",
        "idempotency_key": key
    })
}

fn post_checkout(body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/checkout")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["fault_policy_version"], 0);
}

#[tokio::test]
async fn test_checkout_completes() {
    let app = setup().await;

    let response = app
        .router
        .oneshot(post_checkout(&checkout_body("k-1", "user-1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["outcome"], "completed");
    assert_eq!(json["event_published"], true);
    assert!(json["transaction_id"].as_str().is_some());
    assert!(json["tracking_id"].as_str().is_some());
    assert!(json["priced_order"].is_object());
    assert_eq!(app.payment.transaction_count().await, 1);
    assert_eq!(app.log.record_count(ORDERS_TOPIC).await.unwrap(), 1);
}

#[tokio::test]
async fn test_demo_services_complete_checkout() {
    let deps = api::build_dependencies(&api::config::ServiceAddrs::default())
        .await
        .unwrap();
    let log = InMemoryEventLog::with_topic(ORDERS_TOPIC, 1).await.unwrap();
    let orchestrator = CheckoutOrchestrator::new(
        deps,
        Arc::new(LogEventPublisher::new(log.clone())),
        Arc::new(FaultPolicyProvider::disabled()),
        OrchestratorConfig::default(),
    );
    let router = api::create_app(api::AppState::new(orchestrator), get_metrics_handle());

    let response = router
        .oneshot(post_checkout(&checkout_body("k-demo", DEMO_USER)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["outcome"], "completed");
    assert_eq!(log.record_count(ORDERS_TOPIC).await.unwrap(), 1);
}

#[tokio::test]
async fn test_checkout_continues_caller_trace() {
    let app = setup().await;
    let trace_id = "4bf92f3577b34da6a3ce929d0e0e4736";

    let mut request = post_checkout(&checkout_body("k-1", "user-1"));
    request.headers_mut().insert(
        "traceparent",
        format!("00-{trace_id}-00f067aa0ba902b7-01").parse().unwrap(),
    );
    request
        .headers_mut()
        .insert("baggage", "tenant=acme".parse().unwrap());

    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["trace_id"], trace_id);

    let records = app.log.read_all(ORDERS_TOPIC).await.unwrap();
    assert!(records[0].headers["traceparent"].contains(trace_id));
    assert_eq!(records[0].payload["baggage"]["tenant"], "acme");
}

#[tokio::test]
async fn test_failed_checkout_is_still_ok() {
    let app = setup().await;

    let response = app
        .router
        .oneshot(post_checkout(&checkout_body("k-1", "user-without-cart")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["outcome"], "failed");
    assert!(json["failure_reason"].as_str().is_some());
    assert_eq!(app.payment.transaction_count().await, 0);
}

#[tokio::test]
async fn test_invalid_request_is_bad_request() {
    let app = setup().await;
    let mut body = checkout_body("k-1", "user-1");
    body["address"]["city"] = serde_json::json!("");

    let response = app.router.oneshot(post_checkout(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("city"));
}

#[tokio::test]
async fn test_malformed_currency_is_bad_request() {
    let app = setup().await;
    let mut body = checkout_body("k-1", "user-1");
    body["user_currency"] = serde_json::json!("US");

    let response = app.router.oneshot(post_checkout(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().is_some());
    assert_eq!(app.payment.transaction_count().await, 0);
}

#[tokio::test]
async fn test_missing_field_is_bad_request() {
    let app = setup().await;
    let mut body = checkout_body("k-1", "user-1");
    body.as_object_mut().unwrap().remove("payment_token");

    let response = app.router.oneshot(post_checkout(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_blank_idempotency_key_is_bad_request() {
    let app = setup().await;
    let body = checkout_body("", "user-1");

    let response = app.router.oneshot(post_checkout(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.payment.transaction_count().await, 0);
}

#[tokio::test]
async fn test_duplicate_checkout_returns_same_order() {
    let app = setup().await;
    let body = checkout_body("k-dup", "user-1");

    let first = json_body(
        app.router
            .clone()
            .oneshot(post_checkout(&body))
            .await
            .unwrap(),
    )
    .await;
    let second = json_body(app.router.oneshot(post_checkout(&body)).await.unwrap()).await;

    assert_eq!(first["order_id"], second["order_id"]);
    assert_eq!(app.payment.transaction_count().await, 1);
}

#[tokio::test]
async fn test_reused_key_conflicts() {
    let app = setup().await;

    let first = app
        .router
        .clone()
        .oneshot(post_checkout(&checkout_body("k-1", "user-1")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .router
        .oneshot(post_checkout(&checkout_body("k-1", "user-2")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_fault_policy_replace_and_read_back() {
    let app = setup().await;
    let policy = serde_json::json!({
        "version": 7,
        "rules": [{
            "operation": "charge",
            "action": { "type": "error", "kind": "permanent", "message": "card network down" }
        }]
    });

    let put = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/fault-policy")
                .header("content-type", "application/json")
                .body(Body::from(policy.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::OK);
    let json = json_body(put).await;
    assert_eq!(json["version"], 7);
    assert_eq!(json["previous_version"], 0);
    assert_eq!(json["rules"], 1);

    let get = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/fault-policy")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_body(get).await;
    assert_eq!(json["version"], 7);
    assert_eq!(json["rules"][0]["operation"], Operation::Charge.as_str());

    // the injected decline fails the next checkout without charging
    let response = app
        .router
        .oneshot(post_checkout(&checkout_body("k-1", "user-1")))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["outcome"], "failed");
    assert_eq!(app.payment.transaction_count().await, 0);
}

#[tokio::test]
async fn test_invalid_fault_policy_is_rejected() {
    let app = setup().await;
    let policy = serde_json::json!({
        "version": 2,
        "rules": [{
            "operation": "quote",
            "user_id": " ",
            "action": { "type": "latency", "millis": 100 }
        }]
    });

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/fault-policy")
                .header("content-type", "application/json")
                .body(Body::from(policy.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_fault_operation_is_bad_request() {
    let app = setup().await;
    let policy = serde_json::json!({
        "version": 3,
        "rules": [{
            "operation": "teleport",
            "action": { "type": "latency", "millis": 100 }
        }]
    });

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/fault-policy")
                .header("content-type", "application/json")
                .body(Body::from(policy.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // the policy in force is untouched
    let get = app
        .router
        .oneshot(
            Request::builder()
                .uri("/fault-policy")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(get).await["version"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
