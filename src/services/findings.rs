//! Security-findings aggregator submission.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::ScanError;
use crate::models::records::SecurityFinding;
use crate::services::deadline::Deadline;

/// Largest batch the aggregator accepts in one import call.
pub const FINDINGS_BATCH_SIZE: usize = 100;

#[async_trait]
pub trait FindingsSubmitter: Send + Sync {
    /// Import one batch of at most `FINDINGS_BATCH_SIZE` findings.
    async fn submit(&self, findings: &[SecurityFinding]) -> Result<(), ScanError>;
}

/// Submit `findings` in order, chunked to `FINDINGS_BATCH_SIZE`.
///
/// Stops at the first failing chunk; chunks already accepted stay submitted.
/// Returns the number of findings submitted.
pub async fn submit_in_batches(
    submitter: &dyn FindingsSubmitter,
    findings: &[SecurityFinding],
    deadline: &Deadline,
) -> Result<usize, ScanError> {
    let mut submitted = 0;
    for chunk in findings.chunks(FINDINGS_BATCH_SIZE) {
        deadline
            .bound(submitter.submit(chunk), ScanError::FindingsSubmitFailed)
            .await?;
        submitted += chunk.len();
        tracing::debug!(batch = chunk.len(), submitted, "Submitted findings batch");
    }
    Ok(submitted)
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BatchImportRequest<'a> {
    findings: &'a [SecurityFinding],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BatchImportResponse {
    #[serde(default)]
    failed_count: u32,
    #[serde(default)]
    success_count: u32,
    #[serde(default)]
    failed_findings: Vec<FailedFinding>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FailedFinding {
    id: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Aggregator reached over HTTP at `{endpoint}/findings/import`.
#[derive(Debug, Clone)]
pub struct HttpFindingsSubmitter {
    http: Client,
    endpoint: String,
}

impl HttpFindingsSubmitter {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().build()?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FindingsSubmitter for HttpFindingsSubmitter {
    async fn submit(&self, findings: &[SecurityFinding]) -> Result<(), ScanError> {
        let resp = self
            .http
            .post(format!("{}/findings/import", self.endpoint))
            .json(&BatchImportRequest { findings })
            .send()
            .await
            .map_err(|e| ScanError::FindingsSubmitFailed(format!("Import request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ScanError::FindingsSubmitFailed(format!(
                "Import rejected (HTTP {status}): {body}"
            )));
        }

        let outcome: BatchImportResponse = resp.json().await.map_err(|e| {
            ScanError::FindingsSubmitFailed(format!("Failed to parse import response: {e}"))
        })?;

        // Per-finding rejections do not fail the batch.
        for failed in &outcome.failed_findings {
            tracing::warn!(
                finding_id = %failed.id,
                error_code = failed.error_code.as_deref().unwrap_or(""),
                error_message = failed.error_message.as_deref().unwrap_or(""),
                "Aggregator rejected finding"
            );
        }
        tracing::info!(
            success_count = outcome.success_count,
            failed_count = outcome.failed_count,
            "Findings batch imported"
        );
        Ok(())
    }
}
