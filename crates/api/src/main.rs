//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use checkout::{
    CheckoutOrchestrator, EventPublisher, FaultPolicyProvider, FaultPolicyWatcher,
    LogEventPublisher,
};
use event_log::{InMemoryEventLog, PostgresEventLog};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Opens the order event log selected by `DATABASE_URL` and wraps it in a publisher.
async fn build_publisher(config: &Config) -> Result<Arc<dyn EventPublisher>, BoxError> {
    let publisher: Arc<dyn EventPublisher> = match &config.database_url {
        Some(url) => {
            let log = PostgresEventLog::connect(url).await?;
            log.run_migrations().await?;
            let publisher = LogEventPublisher::new(log)
                .with_topic(&config.topic)
                .with_retry(config.publish_retry_policy());
            publisher.ensure_topic(config.partitions).await?;
            tracing::info!(topic = %config.topic, "publishing order events to postgres");
            Arc::new(publisher)
        }
        None => {
            let publisher = LogEventPublisher::new(InMemoryEventLog::new())
                .with_topic(&config.topic)
                .with_retry(config.publish_retry_policy());
            publisher.ensure_topic(config.partitions).await?;
            tracing::warn!(topic = %config.topic, "DATABASE_URL not set, order events are kept in memory");
            Arc::new(publisher)
        }
    };
    Ok(publisher)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env()?;
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    api::describe_metrics();

    // 3. Fault policy, optionally reloaded from a file
    let faults = Arc::new(FaultPolicyProvider::disabled());
    if let Some(path) = &config.fault_policy_path {
        let watcher = FaultPolicyWatcher::new(
            path.clone(),
            config.fault_policy_poll_interval(),
            Arc::clone(&faults),
        );
        if let Err(e) = watcher.reload_once().await {
            tracing::warn!(path = %path.display(), error = %e, "initial fault policy load failed");
        }
        watcher.spawn();
    }

    // 4. Dependencies, publisher and orchestrator
    let deps = api::build_dependencies(&config.services).await?;
    let publisher = build_publisher(&config).await?;
    let orchestrator = CheckoutOrchestrator::new(deps, publisher, faults, config.orchestrator());

    // 5. Build the application
    let app = api::create_app(api::AppState::new(orchestrator), metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting checkout server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}
