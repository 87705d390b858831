/*!
Observability for the data store.

Structured JSON logging through `tracing-subscriber`, plus Prometheus
counters and a latency histogram when the `metrics` feature is enabled.
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::{Duration, Instant};
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, StoreError};

/// Filter directive used when `RUST_LOG` is not set
pub const DEFAULT_LOG_DIRECTIVE: &str = "bucketstore=info";

#[cfg(feature = "metrics")]
static METRICS: OnceLock<StoreMetrics> = OnceLock::new();

/// Metrics collected for data store operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct StoreMetrics {
    pub writes_total: Counter,
    pub reads_total: Counter,
    pub destroys_total: Counter,
    pub errors_total: Counter,
    pub decode_failures_total: Counter,
    pub operation_latency_seconds: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn register_counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| StoreError::storage(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| StoreError::storage(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
impl StoreMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let writes_total = register_counter(
            &registry,
            "bucketstore_writes_total",
            "Total objects written to the data store",
        )?;
        let reads_total = register_counter(
            &registry,
            "bucketstore_reads_total",
            "Total reads from the data store",
        )?;
        let destroys_total = register_counter(
            &registry,
            "bucketstore_destroys_total",
            "Total destroys issued to the data store",
        )?;
        let errors_total = register_counter(
            &registry,
            "bucketstore_errors_total",
            "Total failed data store operations",
        )?;
        let decode_failures_total = register_counter(
            &registry,
            "bucketstore_metadata_decode_failures_total",
            "Total metadata payloads that could not be decoded",
        )?;

        let operation_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "bucketstore_operation_latency_seconds",
            "Duration of data store operations in seconds",
        ))
        .map_err(|e| {
            StoreError::storage(format!("Failed to create operation_latency_seconds metric: {e}"))
        })?;
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .map_err(|e| {
                StoreError::storage(format!("Failed to register operation_latency_seconds: {e}"))
            })?;

        Ok(Self {
            writes_total,
            reads_total,
            destroys_total,
            errors_total,
            decode_failures_total,
            operation_latency_seconds,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    pub fn global() -> &'static StoreMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize data store metrics"))
    }

    /// Count an operation by name (`write`, `read` or `destroy`)
    pub fn record_operation(&self, operation: &str) {
        match operation {
            "write" => self.record_write(),
            "read" => self.record_read(),
            "destroy" => self.record_destroy(),
            _ => {}
        }
    }

    pub fn record_write(&self) {
        self.writes_total.inc();
    }

    pub fn record_read(&self) {
        self.reads_total.inc();
    }

    pub fn record_destroy(&self) {
        self.destroys_total.inc();
    }

    pub fn record_error(&self) {
        self.errors_total.inc();
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures_total.inc();
    }

    /// Record operation latency
    pub fn record_latency(&self, duration: Duration) {
        self.operation_latency_seconds.observe(duration.as_secs_f64());
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| StoreError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| StoreError::storage(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Measures one data store operation
#[cfg(feature = "metrics")]
pub struct MetricsTimer {
    start: Instant,
}

#[cfg(feature = "metrics")]
impl MetricsTimer {
    /// Count `operation` and start timing it
    pub fn start(operation: &str) -> Self {
        StoreMetrics::global().record_operation(operation);
        Self {
            start: Instant::now(),
        }
    }

    /// Complete the timer, recording latency
    pub fn finish(self) {
        StoreMetrics::global().record_latency(self.start.elapsed());
    }

    /// Complete the timer with an error, recording both latency and error
    pub fn finish_with_error(self) {
        let metrics = StoreMetrics::global();
        metrics.record_latency(self.start.elapsed());
        metrics.record_error();
    }
}

/// Build the data store's tracing subscriber without installing it
///
/// Log lines are JSON. The filter comes from `RUST_LOG`, with
/// `bucketstore=info` added as a default directive.
pub fn build_subscriber() -> Result<impl tracing::Subscriber + Send + Sync> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(false);

    let directive = DEFAULT_LOG_DIRECTIVE
        .parse()
        .map_err(|e| StoreError::validation(format!("Invalid log directive: {e}")))?;

    Ok(TracingRegistry::default()
        .with(EnvFilter::from_default_env().add_directive(directive))
        .with(fmt_layer))
}

/// Install the global tracing subscriber built by [`build_subscriber`]
///
/// # Errors
/// Fails if a global subscriber is already installed
pub fn init_observability() -> Result<()> {
    #[cfg(feature = "metrics")]
    StoreMetrics::global();

    set_global_default(build_subscriber()?).map_err(|e| {
        StoreError::storage(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("Data store observability initialized");
    Ok(())
}

/// Like [`init_observability`], but ignores an already-installed subscriber
pub fn init_default_observability() {
    if let Err(e) = init_observability() {
        tracing::debug!(error = %e, "Observability already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        let directive: std::result::Result<tracing_subscriber::filter::Directive, _> =
            DEFAULT_LOG_DIRECTIVE.parse();
        assert!(directive.is_ok());
    }

    #[test]
    fn test_subscriber_can_be_built_repeatedly() {
        let first = build_subscriber().unwrap();
        let second = build_subscriber().unwrap();

        tracing::subscriber::with_default(first, || {
            tracing::info!(bucket = "media", "scoped to this test");
        });
        tracing::subscriber::with_default(second, || {
            assert!(tracing::enabled!(target: "bucketstore", tracing::Level::INFO));
            assert!(!tracing::enabled!(target: "bucketstore", tracing::Level::TRACE));
        });
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_metrics_timer() {
        let before = StoreMetrics::global().errors_total.get();

        let timer = MetricsTimer::start("write");
        std::thread::sleep(Duration::from_millis(1));
        timer.finish();

        MetricsTimer::start("read").finish_with_error();
        assert!(StoreMetrics::global().errors_total.get() >= before + 1.0);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_metrics_gathering() {
        let metrics = StoreMetrics::global();
        metrics.record_write();
        metrics.record_decode_failure();

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("bucketstore_writes_total"));
        assert!(text.contains("bucketstore_metadata_decode_failures_total"));
    }
}
