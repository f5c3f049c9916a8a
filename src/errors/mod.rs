//! Unified error type for a scan invocation.
//!
//! Every failure a collaborator or the parser can raise is one `ScanError`
//! variant. Whether it aborts the invocation is decided by `is_fatal`.

/// Scan error kinds, one per failure class of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("Ignore list unavailable: {0}")]
    IgnoreListUnavailable(String),

    #[error("Object fetch failed: {0}")]
    ObjectFetchFailed(String),

    #[error("Malformed report: {0}")]
    MalformedReport(String),

    #[error("Report has no TestResult")]
    MissingTestResult,

    #[error("Report has {0} TestResult elements, expected exactly one")]
    MultipleTestResults(usize),

    #[error("Rule not found: {0}")]
    MissingRule(String),

    #[error("Finding normalization failed: {0}")]
    NormalizationFailed(String),

    #[error("Metrics emit failed: {0}")]
    MetricsEmitFailed(String),

    #[error("Table write failed: {0}")]
    TableWriteFailed(String),

    #[error("Findings submit failed: {0}")]
    FindingsSubmitFailed(String),
}

impl ScanError {
    /// Fatal kinds abort the invocation before anything is emitted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidTrigger(_)
                | Self::ConfigUnavailable(_)
                | Self::IgnoreListUnavailable(_)
                | Self::ObjectFetchFailed(_)
                | Self::MalformedReport(_)
                | Self::MissingTestResult
                | Self::MultipleTestResults(_)
        )
    }

    /// Stable machine-readable code for logs and summaries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTrigger(_) => "INVALID_TRIGGER",
            Self::ConfigUnavailable(_) => "CONFIG_UNAVAILABLE",
            Self::IgnoreListUnavailable(_) => "IGNORE_LIST_UNAVAILABLE",
            Self::ObjectFetchFailed(_) => "OBJECT_FETCH_FAILED",
            Self::MalformedReport(_) => "MALFORMED_REPORT",
            Self::MissingTestResult => "MISSING_TEST_RESULT",
            Self::MultipleTestResults(_) => "MULTIPLE_TEST_RESULTS",
            Self::MissingRule(_) => "MISSING_RULE",
            Self::NormalizationFailed(_) => "NORMALIZATION_FAILED",
            Self::MetricsEmitFailed(_) => "METRICS_EMIT_FAILED",
            Self::TableWriteFailed(_) => "TABLE_WRITE_FAILED",
            Self::FindingsSubmitFailed(_) => "FINDINGS_SUBMIT_FAILED",
        }
    }

    /// Process exit code for an error that ends the invocation.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidTrigger(_) => 2,
            Self::ConfigUnavailable(_) => 3,
            Self::IgnoreListUnavailable(_) => 4,
            Self::ObjectFetchFailed(_) => 5,
            Self::MalformedReport(_) | Self::MissingTestResult | Self::MultipleTestResults(_) => 6,
            _ => 1,
        }
    }
}
