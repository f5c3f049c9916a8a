//! Compliance metrics emitter.
//!
//! Tallies are written as CloudWatch Embedded Metric Format lines: one JSON
//! object per tally carrying the metric definition in `_aws` and the value
//! under the metric's name.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::errors::ScanError;
use crate::models::records::MetricTally;

pub const METRICS_NAMESPACE: &str = "Compliance";
pub const METRICS_DIMENSION: &str = "InstanceId";

#[async_trait]
pub trait MetricsEmitter: Send + Sync {
    /// Publish one tally under `METRICS_NAMESPACE`, dimensioned by host.
    async fn put(&self, tally: &MetricTally) -> Result<(), ScanError>;
}

/// Emitter writing EMF lines to any writer, stdout in production.
pub struct EmfMetricsEmitter<W> {
    out: Mutex<W>,
}

impl EmfMetricsEmitter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> EmfMetricsEmitter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// EMF document for one tally.
pub fn emf_document(tally: &MetricTally, timestamp_millis: i64) -> serde_json::Value {
    let name = tally.bucket.metric_name();
    json!({
        "_aws": {
            "Timestamp": timestamp_millis,
            "CloudWatchMetrics": [{
                "Namespace": METRICS_NAMESPACE,
                "Dimensions": [[METRICS_DIMENSION]],
                "Metrics": [{"Name": name, "Unit": "Count"}],
            }],
        },
        METRICS_DIMENSION: tally.host_id,
        name: tally.count,
    })
}

#[async_trait]
impl<W: Write + Send> MetricsEmitter for EmfMetricsEmitter<W> {
    async fn put(&self, tally: &MetricTally) -> Result<(), ScanError> {
        let line = emf_document(tally, Utc::now().timestamp_millis()).to_string();
        let mut out = self
            .out
            .lock()
            .map_err(|_| ScanError::MetricsEmitFailed("Metrics writer poisoned".to_string()))?;
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| ScanError::MetricsEmitFailed(e.to_string()))
    }
}
