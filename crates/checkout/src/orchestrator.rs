//! Checkout saga orchestrator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    CartSnapshot, CheckoutRequest, DomainError, OrderOutcome, PricedLine, PricedOrder,
};
use tokio::time::Instant;

use crate::cancel::{CancelSignal, cancellation};
use crate::clients::{
    CallContext, CartClient, CatalogClient, ChargeRequest, CurrencyClient, EmailClient, Invoker,
    Operation, OrderConfirmation, PaymentClient, QuoteClient, ShipRequest, ShippingClient,
};
use crate::error::{CheckoutError, ClientError, SagaError};
use crate::events::SagaEvent;
use crate::fault::FaultPolicyProvider;
use crate::idempotency::{Admission, IdempotencyRegistry, Ticket};
use crate::instance::SagaInstance;
use crate::outcome::CheckoutOutcome;
use crate::propagation::TraceContext;
use crate::publisher::EventPublisher;
use crate::retry::{Attempted, RetryPolicy, retry};

/// Tunables of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Backoff for transient dependency failures.
    pub retry: RetryPolicy,

    /// Deadline of a single dependency call.
    pub dependency_timeout: Duration,

    /// Deadline of the charge call.
    pub payment_timeout: Duration,

    /// How long a duplicate submission waits for the original saga.
    pub request_timeout: Duration,

    /// Finished outcomes kept for duplicate detection.
    pub idempotency_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            dependency_timeout: Duration::from_secs(2),
            payment_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            idempotency_capacity: 10_000,
        }
    }
}

/// The remote services a checkout depends on.
#[derive(Clone)]
pub struct Dependencies {
    pub cart: Arc<dyn CartClient>,
    pub catalog: Arc<dyn CatalogClient>,
    pub currency: Arc<dyn CurrencyClient>,
    pub quote: Arc<dyn QuoteClient>,
    pub payment: Arc<dyn PaymentClient>,
    pub shipping: Arc<dyn ShippingClient>,
    pub email: Arc<dyn EmailClient>,
}

/// Runs checkout sagas.
///
/// Each accepted request runs on its own task:
/// 1. Read the cart
/// 2. Price every line in the shopper's currency
/// 3. Quote and convert shipping
/// 4. Charge once
/// 5. Ship, clear the cart and send the confirmation concurrently
/// 6. Publish exactly one order event
///
/// Any failure before step 4 fails the order with no money moved. From step 4
/// on the order completes, and failed steps are reported as sub-failures.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    deps: Dependencies,
    publisher: Arc<dyn EventPublisher>,
    invoker: Invoker,
    registry: IdempotencyRegistry,
    config: OrchestratorConfig,
}

/// What ended a saga before payment.
enum Abort {
    Cancelled,
    Step(ClientError),
    Saga(SagaError),
}

impl Abort {
    fn operation(&self) -> Option<Operation> {
        match self {
            Abort::Step(err) => Some(err.operation),
            Abort::Cancelled | Abort::Saga(_) => None,
        }
    }

    fn reason(&self) -> String {
        match self {
            Abort::Cancelled => CheckoutError::Cancelled.to_string(),
            Abort::Step(err) => err.to_string(),
            Abort::Saga(SagaError::Domain(err)) => err.to_string(),
            Abort::Saga(err) => err.to_string(),
        }
    }
}

impl From<ClientError> for Abort {
    fn from(err: ClientError) -> Self {
        Abort::Step(err)
    }
}

impl From<SagaError> for Abort {
    fn from(err: SagaError) -> Self {
        Abort::Saga(err)
    }
}

impl From<DomainError> for Abort {
    fn from(err: DomainError) -> Self {
        Abort::Saga(SagaError::Domain(err))
    }
}

struct SagaReport {
    outcome: Arc<CheckoutOutcome>,
    cancelled: bool,
}

impl CheckoutOrchestrator {
    pub fn new(
        deps: Dependencies,
        publisher: Arc<dyn EventPublisher>,
        faults: Arc<FaultPolicyProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                publisher,
                invoker: Invoker::new(faults),
                registry: IdempotencyRegistry::new(config.idempotency_capacity),
                config,
            }),
        }
    }

    pub fn faults(&self) -> &Arc<FaultPolicyProvider> {
        self.inner.invoker.faults()
    }

    pub fn registry(&self) -> &IdempotencyRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Places an order and waits for its terminal outcome.
    ///
    /// Dropping the returned future before payment aborts the saga.
    pub async fn place_order(
        &self,
        request: CheckoutRequest,
        trace: TraceContext,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let (_guard, signal) = cancellation();
        self.place_order_with(request, trace, signal).await
    }

    /// Places an order that aborts before payment once `cancel` fires.
    ///
    /// Business failures come back as an `Ok` outcome with
    /// `OrderOutcome::Failed`; `Err` is reserved for requests that never ran
    /// to a terminal outcome of their own.
    #[tracing::instrument(
        skip_all,
        fields(idempotency_key = %request.idempotency_key, trace_id = %trace.trace_id())
    )]
    pub async fn place_order_with(
        &self,
        request: CheckoutRequest,
        trace: TraceContext,
        cancel: CancelSignal,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        metrics::counter!("checkout_requests_total").increment(1);
        request.validate()?;
        let deadline = Instant::now() + self.inner.config.request_timeout;

        match self.inner.registry.begin(&request)? {
            Admission::Existing(pending) => {
                tracing::info!(
                    order_id = %pending.order_id(),
                    "duplicate checkout, returning the original outcome"
                );
                let outcome = pending.wait(deadline).await?;
                Ok(outcome.as_ref().clone())
            }
            Admission::New(ticket) => {
                let inner = Arc::clone(&self.inner);
                let saga = tokio::spawn(async move { inner.run(request, trace, cancel, ticket).await });
                match saga.await {
                    Ok(report) if report.cancelled => Err(CheckoutError::Cancelled),
                    Ok(report) => Ok(report.outcome.as_ref().clone()),
                    Err(err) => {
                        tracing::error!(error = %err, "checkout task failed");
                        Err(CheckoutError::Internal(err.to_string()))
                    }
                }
            }
        }
    }
}

impl Inner {
    #[tracing::instrument(
        skip_all,
        fields(order_id = %ticket.order_id(), trace_id = %trace.trace_id())
    )]
    async fn run(
        &self,
        request: CheckoutRequest,
        trace: TraceContext,
        mut cancel: CancelSignal,
        ticket: Ticket,
    ) -> SagaReport {
        let started = std::time::Instant::now();
        let mut saga = SagaInstance::start(ticket.order_id(), request, trace.trace_id());
        tracing::info!(saga_id = %saga.id(), "checkout saga started");

        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Abort::Cancelled),
            result = self.prepare(&mut saga, &trace) => result,
        };
        let charged = match prepared {
            Ok(priced) => match self.charge(&mut saga, &trace, &priced).await {
                Ok(()) => Ok(priced),
                Err(abort) => Err(abort),
            },
            Err(abort) => Err(abort),
        };

        let cancelled = match charged {
            Ok(priced) => {
                if let Err(err) = self.fulfil(&mut saga, &trace, &priced).await {
                    tracing::error!(error = %err, "post-payment bookkeeping failed");
                }
                false
            }
            Err(abort) => {
                let reason = abort.reason();
                tracing::warn!(state = %saga.state(), reason = %reason, "checkout failed before payment");
                let failed = match &abort {
                    Abort::Step(err) if err.operation == Operation::Charge && err.timed_out => {
                        let token = saga.request().idempotency_key.to_string();
                        tracing::warn!(dedupe_token = %token, "charge result unknown");
                        SagaEvent::charge_unconfirmed(reason, token)
                    }
                    _ => SagaEvent::saga_failed(reason, abort.operation()),
                };
                if let Err(err) = saga.record(failed) {
                    tracing::error!(error = %err, "could not record saga failure");
                }
                matches!(abort, Abort::Cancelled)
            }
        };

        let event_published = self.publish(&saga, &trace).await;
        let outcome = Arc::new(saga.outcome(event_published));
        self.observe(&outcome, started);
        tracing::debug!(journal = ?saga.journal(), "saga journal");

        ticket.complete(Arc::clone(&outcome));
        SagaReport { outcome, cancelled }
    }

    /// Runs the steps before payment: cart, pricing and shipping quote.
    async fn prepare(
        &self,
        saga: &mut SagaInstance,
        trace: &TraceContext,
    ) -> Result<PricedOrder, Abort> {
        let timeout = self.config.dependency_timeout;
        let user_id = saga.request().user_id.clone();
        let target = saga.request().user_currency.clone();
        let address = saga.request().address.clone();

        let items = self
            .call(saga, trace, Operation::GetCart, timeout, |ctx| {
                self.deps.cart.get_cart(ctx, &user_id)
            })
            .await?;
        let cart = CartSnapshot::new(items)?;
        saga.record(SagaEvent::cart_fetched(cart.clone()))?;
        tracing::info!(lines = cart.len(), "cart fetched");

        let mut lines = Vec::with_capacity(cart.len());
        for item in cart.items() {
            let product = self
                .call(saga, trace, Operation::GetProduct, timeout, |ctx| {
                    self.deps.catalog.get_product(ctx, &item.product_id)
                })
                .await?;
            let unit_price = self
                .call(saga, trace, Operation::Convert, timeout, |ctx| {
                    self.deps.currency.convert(ctx, &product.price, &target)
                })
                .await?;
            lines.push(PricedLine {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price,
            });
        }
        saga.record(SagaEvent::order_priced(lines.clone()))?;
        tracing::info!(currency = %target, "order priced");

        let quote = self
            .call(saga, trace, Operation::Quote, timeout, |ctx| {
                self.deps.quote.quote(ctx, &address, cart.items())
            })
            .await?;
        let shipping_cost = self
            .call(saga, trace, Operation::Convert, timeout, |ctx| {
                self.deps.currency.convert(ctx, &quote, &target)
            })
            .await?;
        let priced = PricedOrder::new(target.clone(), lines, shipping_cost)?;
        saga.record(SagaEvent::shipping_quoted(priced.clone()))?;
        tracing::info!(total = %priced.total(), "shipping quoted");

        Ok(priced)
    }

    /// Captures payment. Attempted exactly once, deduplicated on the idempotency key.
    async fn charge(
        &self,
        saga: &mut SagaInstance,
        trace: &TraceContext,
        priced: &PricedOrder,
    ) -> Result<(), Abort> {
        let request = ChargeRequest {
            amount: priced.total().clone(),
            token: saga.request().payment_token.clone(),
            dedupe_token: saga.request().idempotency_key.to_string(),
        };
        let transaction_id = self
            .call(
                saga,
                trace,
                Operation::Charge,
                self.config.payment_timeout,
                |ctx| self.deps.payment.charge(ctx, &request),
            )
            .await?;
        saga.record(SagaEvent::payment_charged(transaction_id))?;
        tracing::info!(amount = %request.amount, "payment charged");
        Ok(())
    }

    /// Runs the post-payment steps concurrently. None of them can fail the order.
    async fn fulfil(
        &self,
        saga: &mut SagaInstance,
        trace: &TraceContext,
        priced: &PricedOrder,
    ) -> Result<(), SagaError> {
        let timeout = self.config.dependency_timeout;
        let request = saga.request().clone();
        let user = request.user_id.as_str();
        let ship = ShipRequest {
            address: request.address.clone(),
            items: priced.cart_items(),
            dedupe_token: saga.order_id().to_string(),
        };
        let confirmation = OrderConfirmation {
            order_id: saga.order_id(),
            priced_order: priced.clone(),
            shipping_address: request.address.clone(),
        };

        let (shipped, emptied, emailed) = tokio::join!(
            self.attempt(trace, user, Operation::ShipOrder, timeout, |ctx| {
                self.deps.shipping.ship_order(ctx, &ship)
            }),
            self.attempt(trace, user, Operation::EmptyCart, timeout, |ctx| {
                self.deps.cart.empty_cart(ctx, &request.user_id)
            }),
            self.attempt(trace, user, Operation::SendOrderConfirmation, timeout, |ctx| {
                self.deps
                    .email
                    .send_order_confirmation(ctx, &request.email, &confirmation)
            }),
        );

        saga.record_retries(Operation::ShipOrder, shipped.retries())?;
        saga.record_retries(Operation::EmptyCart, emptied.retries())?;
        match shipped.result {
            Ok(tracking_id) => saga.record(SagaEvent::order_shipped(tracking_id))?,
            Err(err) => self.skip(saga, err)?,
        }
        match emptied.result {
            Ok(()) => saga.record(SagaEvent::CartEmptied)?,
            Err(err) => self.skip(saga, err)?,
        }
        if let Err(err) = emailed.result {
            self.skip(saga, err)?;
        }

        saga.record(SagaEvent::saga_completed())?;
        tracing::info!(
            sub_failures = saga.sub_failures().len(),
            "checkout completed"
        );
        Ok(())
    }

    fn skip(&self, saga: &mut SagaInstance, err: ClientError) -> Result<(), SagaError> {
        tracing::warn!(operation = %err.operation, error = %err, "post-payment step failed");
        saga.record(SagaEvent::step_failed(err.operation, err.to_string()))
    }

    /// Publishes the order event. Returns whether it reached the log.
    async fn publish(&self, saga: &SagaInstance, trace: &TraceContext) -> bool {
        let event = match saga.to_event() {
            Ok(event) => event.with_baggage(trace.baggage().clone()),
            Err(err) => {
                tracing::error!(error = %err, "no order event for saga");
                return false;
            }
        };
        match self.publisher.publish(&event, &trace.child()).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "order event not published");
                false
            }
        }
    }

    fn observe(&self, outcome: &CheckoutOutcome, started: std::time::Instant) {
        match outcome.outcome {
            OrderOutcome::Completed => {
                metrics::counter!("checkout_completed_total").increment(1);
                if outcome.is_degraded() {
                    metrics::counter!("checkout_degraded_total").increment(1);
                }
            }
            OrderOutcome::Failed => metrics::counter!("checkout_failed_total").increment(1),
        }
        metrics::histogram!("checkout_duration_seconds", "outcome" => outcome.outcome.to_string())
            .record(started.elapsed().as_secs_f64());
    }

    /// Calls a dependency with retry and journals the retries on the saga.
    async fn call<T, F, Fut>(
        &self,
        saga: &mut SagaInstance,
        trace: &TraceContext,
        operation: Operation,
        timeout: Duration,
        call: F,
    ) -> Result<T, ClientError>
    where
        F: Fn(CallContext) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let user = saga.request().user_id.as_str().to_string();
        let attempted = self.attempt(trace, &user, operation, timeout, call).await;
        if let Err(err) = saga.record_retries(operation, attempted.retries()) {
            tracing::error!(error = %err, "could not journal retries");
        }
        attempted.result
    }

    /// Calls a dependency with retry. Every attempt gets a fresh deadline.
    async fn attempt<T, F, Fut>(
        &self,
        trace: &TraceContext,
        user_id: &str,
        operation: Operation,
        timeout: Duration,
        call: F,
    ) -> Attempted<T>
    where
        F: Fn(CallContext) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let call = &call;
        let invoker = &self.invoker;
        retry(&self.config.retry, operation, |_| {
            let ctx = CallContext::with_timeout(trace.clone(), timeout).for_user(user_id);
            async move { invoker.invoke(operation, &ctx, call).await }
        })
        .await
    }
}
