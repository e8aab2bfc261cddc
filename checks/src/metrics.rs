//! Record failed relays.
//!
//! Every relay that fails during a check produces an [ErrorMetric]. Recording is
//! fire-and-forget: a [Recorder] must never block or fail the check that reports to it.

use chrono::{DateTime, Utc};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// A failed relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorMetric {
    pub timestamp: DateTime<Utc>,
    pub app_public_key: String,
    pub chain: String,
    pub node_public_key: String,
    pub elapsed: Duration,
    /// Size of the request payload in bytes.
    pub bytes: usize,
    pub method: String,
    pub message: String,
    /// Correlates every metric and log line of one check invocation.
    pub request_id: Uuid,
}

/// Receives [ErrorMetric]s.
pub trait Recorder: Clone + Send + Sync + 'static {
    fn record(&self, metric: ErrorMetric);
}

/// Writes every [ErrorMetric] to the log.
#[derive(Clone, Default)]
pub struct Log;

impl Recorder for Log {
    fn record(&self, metric: ErrorMetric) {
        warn!(
            timestamp = %metric.timestamp,
            app = metric.app_public_key.as_str(),
            chain = metric.chain.as_str(),
            node = metric.node_public_key.as_str(),
            elapsed = ?metric.elapsed,
            bytes = metric.bytes,
            method = metric.method.as_str(),
            request_id = %metric.request_id,
            "{}",
            metric.message
        );
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct Labels {
    chain: String,
    method: String,
}

/// Counts [ErrorMetric]s by chain and method, and logs them at debug level.
#[derive(Clone)]
pub struct Prometheus {
    errors: Family<Labels, Counter>,
}

impl Prometheus {
    pub fn new(registry: &mut Registry) -> Self {
        let errors = Family::<Labels, Counter>::default();
        registry.register("relay_errors", "failed relays", errors.clone());
        Self { errors }
    }
}

impl Recorder for Prometheus {
    fn record(&self, metric: ErrorMetric) {
        tracing::debug!(
            chain = metric.chain.as_str(),
            node = metric.node_public_key.as_str(),
            request_id = %metric.request_id,
            message = metric.message.as_str(),
            "relay failed"
        );
        self.errors
            .get_or_create(&Labels {
                chain: metric.chain,
                method: metric.method,
            })
            .inc();
    }
}

#[cfg(any(test, feature = "mocks"))]
pub mod mocks {
    use super::{ErrorMetric, Recorder};
    use std::sync::{Arc, Mutex};

    /// Keeps every [ErrorMetric] it receives.
    #[derive(Clone, Default)]
    pub struct Memory {
        metrics: Arc<Mutex<Vec<ErrorMetric>>>,
    }

    impl Memory {
        pub fn metrics(&self) -> Vec<ErrorMetric> {
            self.metrics.lock().unwrap().clone()
        }
    }

    impl Recorder for Memory {
        fn record(&self, metric: ErrorMetric) {
            self.metrics.lock().unwrap().push(metric);
        }
    }
}
