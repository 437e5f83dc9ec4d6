//! HTTP front end for the checkout orchestrator.
//!
//! Exposes `POST /checkout`, the fault policy endpoints, health and
//! Prometheus metrics, with structured logging (tracing) throughout.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::Dependencies;
use checkout::clients::{
    HttpDependencyClient, InMemoryCartClient, InMemoryCatalogClient, InMemoryCurrencyClient,
    InMemoryEmailClient, InMemoryPaymentClient, InMemoryQuoteClient, InMemoryShippingClient,
};
use domain::DomainError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::ServiceAddrs;
pub use routes::checkout::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::place_order))
        .route(
            "/fault-policy",
            get(routes::fault_policy::get).put(routes::fault_policy::put),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the dependency set, using HTTP clients for every configured address
/// and in-memory demo services for the rest.
pub async fn build_dependencies(services: &ServiceAddrs) -> Result<Dependencies, DomainError> {
    fn remote(addr: &Option<String>) -> Option<Arc<HttpDependencyClient>> {
        addr.as_deref().map(|addr| Arc::new(HttpDependencyClient::new(addr)))
    }

    Ok(Dependencies {
        cart: match remote(&services.cart) {
            Some(client) => client,
            None => Arc::new(InMemoryCartClient::with_demo_cart().await),
        },
        catalog: match remote(&services.catalog) {
            Some(client) => client,
            None => Arc::new(InMemoryCatalogClient::with_demo_products().await?),
        },
        currency: match remote(&services.currency) {
            Some(client) => client,
            None => Arc::new(InMemoryCurrencyClient::new()),
        },
        quote: match remote(&services.shipping) {
            Some(client) => client,
            None => Arc::new(InMemoryQuoteClient::demo()?),
        },
        payment: match remote(&services.payment) {
            Some(client) => client,
            None => Arc::new(InMemoryPaymentClient::new()),
        },
        shipping: match remote(&services.shipping) {
            Some(client) => client,
            None => Arc::new(InMemoryShippingClient::new()),
        },
        email: match remote(&services.email) {
            Some(client) => client,
            None => Arc::new(InMemoryEmailClient::new()),
        },
    })
}

/// Registers descriptions for the metrics the orchestrator emits.
pub fn describe_metrics() {
    metrics::describe_counter!("checkout_requests_total", "Checkout requests received");
    metrics::describe_counter!("checkout_completed_total", "Checkouts that charged the customer");
    metrics::describe_counter!("checkout_degraded_total", "Completed checkouts with sub-failures");
    metrics::describe_counter!("checkout_failed_total", "Checkouts that failed before payment");
    metrics::describe_counter!("dependency_retries_total", "Retried dependency calls");
    metrics::describe_counter!("fault_injections_total", "Faults injected by the active policy");
    metrics::describe_counter!("order_events_published_total", "Order events appended to the log");
    metrics::describe_counter!(
        "order_event_publish_failures_total",
        "Order events that could not be published"
    );
    metrics::describe_histogram!(
        "checkout_duration_seconds",
        metrics::Unit::Seconds,
        "End-to-end checkout latency"
    );
    metrics::describe_histogram!(
        "dependency_call_duration_seconds",
        metrics::Unit::Seconds,
        "Latency of individual dependency calls"
    );
}
