//! In-memory collaborators for tests and dry runs.
//!
//! Each fake satisfies its trait contract without external services and can
//! be told to fail, so every error disposition of the pipeline is reachable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::ScanError;
use crate::models::records::{MetricTally, SecurityFinding, TableRow};
use crate::models::scan::{Outcome, RuleDefinition, RuleResult, ScanContext, Severity};
use crate::services::findings::FindingsSubmitter;
use crate::services::ignore_list::{IgnoreListSource, IgnoreSet};
use crate::services::metrics::MetricsEmitter;
use crate::services::normalizer;
use crate::services::object_store::ObjectStore;
use crate::services::parameters::ParameterStore;
use crate::services::results_table::{last_per_key, ResultsTable};

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        let mut objects = self.objects.lock().unwrap();
        objects.insert((bucket.to_string(), key.to_string()), body.into());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ScanError> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ScanError::ObjectFetchFailed(format!("No such object {bucket}/{key}")))
    }
}

// ---------------------------------------------------------------------------
// StaticParameters
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct StaticParameters {
    values: HashMap<String, String>,
    unavailable: bool,
}

impl StaticParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    /// A store whose backend cannot be reached.
    pub fn unavailable() -> Self {
        Self {
            values: HashMap::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl ParameterStore for StaticParameters {
    async fn get(&self, name: &str, _decrypt: bool) -> Result<String, ScanError> {
        if self.unavailable {
            return Err(ScanError::ConfigUnavailable("Parameter store unreachable".to_string()));
        }
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ScanError::ConfigUnavailable(format!("Parameter {name} is not set")))
    }
}

// ---------------------------------------------------------------------------
// MemoryIgnoreList
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryIgnoreList {
    entries: Option<IgnoreSet>,
}

impl MemoryIgnoreList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: Some(entries.into_iter().map(Into::into).collect()),
        }
    }

    pub fn unavailable() -> Self {
        Self { entries: None }
    }
}

#[async_trait]
impl IgnoreListSource for MemoryIgnoreList {
    async fn load(&self) -> Result<IgnoreSet, ScanError> {
        self.entries
            .clone()
            .ok_or_else(|| ScanError::IgnoreListUnavailable("Ignore table unreachable".to_string()))
    }
}

// ---------------------------------------------------------------------------
// MemoryResultsTable
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryResultsTable {
    batches: Mutex<Vec<Vec<TableRow>>>,
    failing: bool,
}

impl MemoryResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn batches(&self) -> Vec<Vec<TableRow>> {
        self.batches.lock().unwrap().clone()
    }

    /// All rows written, across batches.
    pub fn rows(&self) -> Vec<TableRow> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl ResultsTable for MemoryResultsTable {
    async fn write_batch(&self, rows: &[TableRow]) -> Result<usize, ScanError> {
        if self.failing {
            return Err(ScanError::TableWriteFailed("Table unreachable".to_string()));
        }
        self.batches.lock().unwrap().push(rows.to_vec());
        Ok(last_per_key(rows).len())
    }
}

// ---------------------------------------------------------------------------
// MemoryMetrics
// ---------------------------------------------------------------------------

/// Records every `put` attempt, including ones it fails.
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    attempts: Mutex<Vec<MetricTally>>,
    failing: bool,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn attempts(&self) -> Vec<MetricTally> {
        self.attempts.lock().unwrap().clone()
    }

    /// Counts in emission order.
    pub fn counts(&self) -> Vec<u32> {
        self.attempts().iter().map(|t| t.count).collect()
    }
}

#[async_trait]
impl MetricsEmitter for MemoryMetrics {
    async fn put(&self, tally: &MetricTally) -> Result<(), ScanError> {
        self.attempts.lock().unwrap().push(tally.clone());
        if self.failing {
            return Err(ScanError::MetricsEmitFailed("Metrics endpoint throttled".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryFindings
// ---------------------------------------------------------------------------

/// Records accepted batches; can reject the n-th call (1-based).
#[derive(Debug, Default)]
pub struct MemoryFindings {
    batches: Mutex<Vec<Vec<SecurityFinding>>>,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl MemoryFindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_call(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<SecurityFinding>> {
        self.batches.lock().unwrap().clone()
    }

    /// All findings accepted, across batches.
    pub fn findings(&self) -> Vec<SecurityFinding> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FindingsSubmitter for MemoryFindings {
    async fn submit(&self, findings: &[SecurityFinding]) -> Result<(), ScanError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(ScanError::FindingsSubmitFailed(format!(
                "Aggregator unavailable on batch {call}"
            )));
        }
        self.batches.lock().unwrap().push(findings.to_vec());
        Ok(())
    }
}

/// A high-severity finding for `idref` on a fixed host and report.
pub fn sample_finding(idref: &str) -> SecurityFinding {
    let context = ScanContext {
        host_id: "i-0abc".to_string(),
        account_id: "123456789012".to_string(),
        region: "us-east-1".to_string(),
        bucket: "scap-reports".to_string(),
        object_key: "i-0abc/scan.xml".to_string(),
        test_version: Some("0.1.72".to_string()),
        profile_title: Some("DISA STIG".to_string()),
    };
    let result = RuleResult {
        idref: idref.to_string(),
        severity: Severity::High,
        outcome: Outcome::Fail,
        time: Some("2024-01-15T10:30:00+05:00".to_string()),
    };
    let rule = RuleDefinition {
        id: idref.to_string(),
        title: format!("Rule {idref}"),
        description: format!("Description of {idref}"),
    };
    match normalizer::finding(&context, &result, Some(&rule)) {
        Ok(finding) => finding,
        Err(e) => unreachable!("sample finding is always normalizable: {e}"),
    }
}
