//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use checkout::{OrchestratorConfig, RetryPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(()),
        }
    }
}

/// Base URLs of the remote dependency services.
///
/// A `None` entry is served by the in-memory demo implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAddrs {
    pub cart: Option<String>,
    pub catalog: Option<String>,
    pub currency: Option<String>,
    pub shipping: Option<String>,
    pub payment: Option<String>,
    pub email: Option<String>,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json` (default `pretty`)
/// - `RETRY_MAX_ATTEMPTS`, `RETRY_BASE_DELAY_MS`, `RETRY_MAX_DELAY_MS`, `RETRY_JITTER`
/// - `DEPENDENCY_TIMEOUT_MS`, `PAYMENT_TIMEOUT_MS`, `REQUEST_TIMEOUT_MS`
/// - `ORDER_EVENTS_TOPIC`, `ORDER_EVENTS_PARTITIONS`, `PUBLISH_MAX_ATTEMPTS`
/// - `DATABASE_URL`: Postgres log; unset selects the in-memory log
/// - `FAULT_POLICY_PATH`, `FAULT_POLICY_POLL_MS`
/// - `IDEMPOTENCY_CAPACITY`
/// - `CART_SERVICE_ADDR`, `CATALOG_SERVICE_ADDR`, `CURRENCY_SERVICE_ADDR`,
///   `SHIPPING_SERVICE_ADDR`, `PAYMENT_SERVICE_ADDR`, `EMAIL_SERVICE_ADDR`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,

    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter: bool,

    pub dependency_timeout_ms: u64,
    pub payment_timeout_ms: u64,
    pub request_timeout_ms: u64,

    pub topic: String,
    pub partitions: u32,
    pub publish_max_attempts: u32,
    pub database_url: Option<String>,

    pub fault_policy_path: Option<PathBuf>,
    pub fault_policy_poll_ms: u64,

    pub idempotency_capacity: usize,

    pub services: ServiceAddrs,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT", defaults.port)?,
            log_level: text("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse(&lookup, "LOG_FORMAT", defaults.log_format)?,

            retry_max_attempts: parse(&lookup, "RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts)?,
            retry_base_delay_ms: parse(
                &lookup,
                "RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            )?,
            retry_max_delay_ms: parse(&lookup, "RETRY_MAX_DELAY_MS", defaults.retry_max_delay_ms)?,
            retry_jitter: parse(&lookup, "RETRY_JITTER", defaults.retry_jitter)?,

            dependency_timeout_ms: parse(
                &lookup,
                "DEPENDENCY_TIMEOUT_MS",
                defaults.dependency_timeout_ms,
            )?,
            payment_timeout_ms: parse(&lookup, "PAYMENT_TIMEOUT_MS", defaults.payment_timeout_ms)?,
            request_timeout_ms: parse(&lookup, "REQUEST_TIMEOUT_MS", defaults.request_timeout_ms)?,

            topic: text("ORDER_EVENTS_TOPIC").unwrap_or(defaults.topic),
            partitions: parse(&lookup, "ORDER_EVENTS_PARTITIONS", defaults.partitions)?,
            publish_max_attempts: parse(
                &lookup,
                "PUBLISH_MAX_ATTEMPTS",
                defaults.publish_max_attempts,
            )?,
            database_url: text("DATABASE_URL"),

            fault_policy_path: text("FAULT_POLICY_PATH").map(PathBuf::from),
            fault_policy_poll_ms: parse_nonzero(
                &lookup,
                "FAULT_POLICY_POLL_MS",
                defaults.fault_policy_poll_ms,
            )?,

            idempotency_capacity: parse(
                &lookup,
                "IDEMPOTENCY_CAPACITY",
                defaults.idempotency_capacity,
            )?,

            services: ServiceAddrs {
                cart: text("CART_SERVICE_ADDR"),
                catalog: text("CATALOG_SERVICE_ADDR"),
                currency: text("CURRENCY_SERVICE_ADDR"),
                shipping: text("SHIPPING_SERVICE_ADDR"),
                payment: text("PAYMENT_SERVICE_ADDR"),
                email: text("EMAIL_SERVICE_ADDR"),
            },
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Backoff for dependency calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
        .with_jitter(self.retry_jitter)
    }

    /// Backoff for appends to the order event log.
    pub fn publish_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.publish_max_attempts,
            ..self.retry_policy()
        }
    }

    pub fn fault_policy_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fault_policy_poll_ms)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            retry: self.retry_policy(),
            dependency_timeout: Duration::from_millis(self.dependency_timeout_ms),
            payment_timeout: Duration::from_millis(self.payment_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            idempotency_capacity: self.idempotency_capacity,
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

impl Default for Config {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,

            retry_max_attempts: orchestrator.retry.max_attempts,
            retry_base_delay_ms: orchestrator.retry.base_delay.as_millis() as u64,
            retry_max_delay_ms: orchestrator.retry.max_delay.as_millis() as u64,
            retry_jitter: orchestrator.retry.jitter,

            dependency_timeout_ms: orchestrator.dependency_timeout.as_millis() as u64,
            payment_timeout_ms: orchestrator.payment_timeout.as_millis() as u64,
            request_timeout_ms: orchestrator.request_timeout.as_millis() as u64,

            topic: checkout::ORDERS_TOPIC.to_string(),
            partitions: 3,
            publish_max_attempts: 5,
            database_url: None,

            fault_policy_path: None,
            fault_policy_poll_ms: 1000,

            idempotency_capacity: orchestrator.idempotency_capacity,

            services: ServiceAddrs::default(),
        }
    }
}

/// Like [`parse`], but zero is rejected.
fn parse_nonzero(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match parse(lookup, key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        }),
        n => Ok(n),
    }
}
