//! Normalized output records: table rows, metric tallies and findings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::scan::Severity;

// -- Results table --

/// One failing rule-result as stored in the results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(rename = "InstanceId")]
    pub host_id: String,
    #[serde(rename = "SCAP_Rule_Name")]
    pub rule_id: String,
    pub time: String,
    pub severity: String,
    pub result: String,
    pub report_url: String,
}

// -- Metrics --

/// Severity bucket of an emitted metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricBucket {
    High,
    Medium,
    Low,
}

impl MetricBucket {
    pub fn metric_name(&self) -> &'static str {
        match self {
            Self::High => "SCAP High Finding",
            Self::Medium => "SCAP Medium Finding",
            Self::Low => "SCAP Low Finding",
        }
    }
}

/// Count of failing, non-ignored rule-results for one host and bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTally {
    pub host_id: String,
    pub bucket: MetricBucket,
    pub count: u32,
}

/// Failure counters by severity for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub unknown: u32,
}

impl SeverityCounts {
    /// Count one failure; severities outside the known set land in `unknown`.
    pub fn record(&mut self, severity: &Severity) {
        match severity {
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Unknown | Severity::Other(_) => self.unknown += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.high + self.medium + self.low + self.unknown
    }

    /// The emitted tallies, always high, medium, low in that order.
    pub fn tallies(&self, host_id: &str) -> [MetricTally; 3] {
        [
            (MetricBucket::High, self.high),
            (MetricBucket::Medium, self.medium),
            (MetricBucket::Low, self.low),
        ]
        .map(|(bucket, count)| MetricTally {
            host_id: host_id.to_string(),
            bucket,
            count,
        })
    }
}

// -- Findings aggregator --

/// A finding in the aggregator's 2018-10-08 schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityFinding {
    pub schema_version: String,
    pub id: String,
    pub product_arn: String,
    pub generator_id: String,
    pub aws_account_id: String,
    pub types: Vec<String>,
    pub first_observed_at: String,
    pub last_observed_at: String,
    pub created_at: String,
    pub updated_at: String,
    pub severity: FindingSeverity,
    pub title: String,
    pub description: String,
    pub remediation: Remediation,
    pub product_fields: BTreeMap<String, String>,
    pub resources: Vec<FindingResource>,
    pub compliance: Compliance,
    pub workflow_state: String,
    pub workflow: Workflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FindingSeverity {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Remediation {
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Recommendation {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FindingResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub id: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Compliance {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Workflow {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_start_at_zero() {
        let counts = SeverityCounts::default();
        assert_eq!(counts.total(), 0);
        let tallies = counts.tallies("i-1");
        assert!(tallies.iter().all(|t| t.count == 0));
    }

    #[test]
    fn other_severity_counts_as_unknown() {
        let mut counts = SeverityCounts::default();
        counts.record(&Severity::High);
        counts.record(&Severity::Unknown);
        counts.record(&Severity::Other("info".to_string()));
        assert_eq!(counts.high, 1);
        assert_eq!(counts.unknown, 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn tallies_in_fixed_order() {
        let counts = SeverityCounts {
            high: 3,
            medium: 2,
            low: 1,
            unknown: 9,
        };
        let tallies = counts.tallies("i-1");
        let names: Vec<_> = tallies.iter().map(|t| t.bucket.metric_name()).collect();
        assert_eq!(names, ["SCAP High Finding", "SCAP Medium Finding", "SCAP Low Finding"]);
        assert_eq!(tallies.map(|t| t.count), [3, 2, 1]);
    }

    #[test]
    fn table_row_field_names() {
        let row = TableRow {
            host_id: "i-1".to_string(),
            rule_id: "r.h".to_string(),
            time: "2024-01-15T10:30:00+05:00".to_string(),
            severity: "high".to_string(),
            result: "fail".to_string(),
            report_url: "s3://b/i-1/scan.html".to_string(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["InstanceId"], "i-1");
        assert_eq!(json["SCAP_Rule_Name"], "r.h");
        assert_eq!(json["report_url"], "s3://b/i-1/scan.html");
    }
}
