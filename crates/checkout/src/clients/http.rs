//! JSON-over-HTTP bindings for the dependency services.
//!
//! Each service exposes `POST {base}/{operation}` taking and returning JSON.
//! The trace context travels in the `traceparent` and `baggage` headers, and
//! the time left before the caller's deadline bounds the request.

use async_trait::async_trait;
use domain::{Address, CartItem, CurrencyCode, EmailAddress, Money, ProductId, UserId};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{
    CallContext, CartClient, CatalogClient, ChargeRequest, CurrencyClient, EmailClient,
    Operation, OrderConfirmation, PaymentClient, Product, QuoteClient, ShipRequest,
    ShippingClient,
};
use crate::error::ClientError;

/// Client for one dependency service reachable over HTTP.
///
/// Implements every client trait; wire it up for the capabilities the service
/// at `base_url` actually provides.
#[derive(Debug, Clone)]
pub struct HttpDependencyClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDependencyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B, R>(&self, ctx: &CallContext, operation: Operation, body: &B) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let remaining = ctx.remaining();
        if remaining.is_zero() {
            return Err(ClientError::timeout(operation));
        }

        let mut headers = HeaderMap::new();
        ctx.trace.inject(&mut headers);

        let response = self
            .client
            .post(format!("{}/{}", self.base_url, operation.as_str()))
            .headers(headers)
            .timeout(remaining)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(operation, status, detail));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| classify_transport(operation, e))
    }
}

fn classify_transport(operation: Operation, error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::timeout(operation)
    } else if error.is_decode() || error.is_builder() {
        ClientError::permanent(operation, error.to_string())
    } else {
        ClientError::transient(operation, error.to_string())
    }
}

fn classify_status(operation: Operation, status: StatusCode, detail: String) -> ClientError {
    let message = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {detail}")
    };
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            ClientError::transient(operation, message)
        }
        s if s.is_server_error() => ClientError::transient(operation, message),
        _ => ClientError::permanent(operation, message),
    }
}

#[derive(serde::Deserialize)]
struct CartResponse {
    items: Vec<CartItem>,
}

#[derive(serde::Deserialize)]
struct MoneyResponse {
    amount: Money,
}

#[derive(serde::Deserialize)]
struct TransactionResponse {
    transaction_id: String,
}

#[derive(serde::Deserialize)]
struct TrackingResponse {
    tracking_id: String,
}

#[derive(serde::Deserialize)]
struct Ack {}

#[async_trait]
impl CartClient for HttpDependencyClient {
    async fn get_cart(
        &self,
        ctx: CallContext,
        user_id: &UserId,
    ) -> Result<Vec<CartItem>, ClientError> {
        let response: CartResponse = self
            .call(&ctx, Operation::GetCart, &json!({ "user_id": user_id }))
            .await?;
        Ok(response.items)
    }

    async fn empty_cart(&self, ctx: CallContext, user_id: &UserId) -> Result<(), ClientError> {
        let _: Ack = self
            .call(&ctx, Operation::EmptyCart, &json!({ "user_id": user_id }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for HttpDependencyClient {
    async fn get_product(
        &self,
        ctx: CallContext,
        product_id: &ProductId,
    ) -> Result<Product, ClientError> {
        self.call(&ctx, Operation::GetProduct, &json!({ "id": product_id }))
            .await
    }
}

#[async_trait]
impl CurrencyClient for HttpDependencyClient {
    async fn convert(
        &self,
        ctx: CallContext,
        amount: &Money,
        to: &CurrencyCode,
    ) -> Result<Money, ClientError> {
        let response: MoneyResponse = self
            .call(
                &ctx,
                Operation::Convert,
                &json!({ "from": amount, "to_code": to }),
            )
            .await?;
        if response.amount.currency() != to {
            return Err(ClientError::permanent(
                Operation::Convert,
                format!(
                    "asked for {to}, service returned {}",
                    response.amount.currency()
                ),
            ));
        }
        Ok(response.amount)
    }
}

#[async_trait]
impl QuoteClient for HttpDependencyClient {
    async fn quote(
        &self,
        ctx: CallContext,
        address: &Address,
        items: &[CartItem],
    ) -> Result<Money, ClientError> {
        let response: MoneyResponse = self
            .call(
                &ctx,
                Operation::Quote,
                &json!({ "address": address, "items": items }),
            )
            .await?;
        Ok(response.amount)
    }
}

#[async_trait]
impl PaymentClient for HttpDependencyClient {
    async fn charge(
        &self,
        ctx: CallContext,
        request: &ChargeRequest,
    ) -> Result<String, ClientError> {
        let response: TransactionResponse =
            self.call(&ctx, Operation::Charge, request).await?;
        Ok(response.transaction_id)
    }
}

#[async_trait]
impl ShippingClient for HttpDependencyClient {
    async fn ship_order(
        &self,
        ctx: CallContext,
        request: &ShipRequest,
    ) -> Result<String, ClientError> {
        let response: TrackingResponse = self.call(&ctx, Operation::ShipOrder, request).await?;
        Ok(response.tracking_id)
    }
}

#[async_trait]
impl EmailClient for HttpDependencyClient {
    async fn send_order_confirmation(
        &self,
        ctx: CallContext,
        email: &EmailAddress,
        order: &OrderConfirmation,
    ) -> Result<(), ClientError> {
        let _: Ack = self
            .call(
                &ctx,
                Operation::SendOrderConfirmation,
                &json!({ "email": email, "order": order }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::HeaderMap as AxumHeaders;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;
    use crate::error::ErrorClass;
    use crate::propagation::{TRACEPARENT, TraceContext};

    async fn start_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn ctx(timeout: Duration) -> CallContext {
        CallContext::with_timeout(TraceContext::new_root(), timeout)
    }

    #[tokio::test]
    async fn test_get_cart_sends_trace_headers() {
        let app = Router::new().route(
            "/getCart",
            post(|headers: AxumHeaders| async move {
                let traceparent = headers
                    .get(TRACEPARENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "items": [{"product_id": traceparent, "quantity": 1}]
                }))
            }),
        );
        let client = HttpDependencyClient::new(start_server(app).await);
        let call_ctx = ctx(Duration::from_secs(2));

        let items = client
            .get_cart(call_ctx.clone(), &UserId::new("u-1"))
            .await
            .unwrap();

        assert_eq!(items[0].product_id.as_str(), call_ctx.trace.traceparent());
    }

    #[tokio::test]
    async fn test_server_errors_are_transient_and_client_errors_permanent() {
        let app = Router::new()
            .route(
                "/quote",
                post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "busy") }),
            )
            .route(
                "/charge",
                post(|| async { (axum::http::StatusCode::PAYMENT_REQUIRED, "declined") }),
            );
        let client = HttpDependencyClient::new(start_server(app).await);

        let address = Address {
            street_address: "1 Main St".into(),
            city: "Town".into(),
            state: String::new(),
            country: "US".into(),
            zip_code: "1".into(),
        };
        let err = client
            .quote(ctx(Duration::from_secs(2)), &address, &[])
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Transient);

        let usd = CurrencyCode::new("USD").unwrap();
        let err = client
            .charge(
                ctx(Duration::from_secs(2)),
                &ChargeRequest {
                    amount: Money::from_units(usd, 1),
                    token: domain::PaymentToken::new("tok"),
                    dedupe_token: "k".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Permanent);
        assert!(err.message.contains("declined"));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let app = Router::new().route(
            "/emptyCart",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let client = HttpDependencyClient::new(start_server(app).await);

        let err = client
            .empty_cart(ctx(Duration::from_millis(50)), &UserId::new("u"))
            .await
            .unwrap_err();
        assert!(err.timed_out);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transient() {
        let client = HttpDependencyClient::new("http://127.0.0.1:9");
        let err = client
            .get_product(ctx(Duration::from_secs(2)), &ProductId::new("A"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
