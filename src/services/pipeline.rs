//! Scan pipeline orchestrating one object-created event end to end.
//!
//! Loads the aggregator flag and ignore list, fetches and parses the report,
//! walks its rule-results once to build every output batch, then flushes
//! metrics, table rows and findings. Failures before the walk are fatal;
//! failures while flushing are logged and reported in the summary.

use std::time::Duration;

use serde::Serialize;

use crate::errors::ScanError;
use crate::models::event::{InvocationIdentity, ObjectCreatedEvent};
use crate::models::records::{SecurityFinding, SeverityCounts, TableRow};
use crate::models::scan::{host_id_from_key, Outcome, ScanContext};
use crate::parsers::{TestResult, XccdfDocument};
use crate::services::deadline::Deadline;
use crate::services::findings::submit_in_batches;
use crate::services::ignore_list::IgnoreSet;
use crate::services::normalizer::{self, ACTIVE_PROFILE_ID};
use crate::services::parameters::ENABLE_FINDINGS_PARAMETER;
use crate::ScanHandles;

/// Non-fatal problem recorded during an invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ScanIssue {
    pub stage: String,
    pub rule_id: Option<String>,
    pub code: String,
    pub message: String,
}

impl ScanIssue {
    fn new(stage: &str, rule_id: Option<&str>, error: &ScanError) -> Self {
        Self {
            stage: stage.to_string(),
            rule_id: rule_id.map(String::from),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Summary of one processed report.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub host_id: String,
    pub object_key: String,
    pub rule_results: usize,
    pub failures: usize,
    pub ignored: usize,
    pub rows_written: usize,
    pub findings_submitted: usize,
    pub aggregator_enabled: bool,
    pub counts: SeverityCounts,
    pub sink_errors: Vec<ScanIssue>,
}

/// Output of the single pass over a report's rule-results.
#[derive(Debug, Default)]
pub struct ScanBatches {
    pub rows: Vec<TableRow>,
    pub findings: Vec<SecurityFinding>,
    pub counts: SeverityCounts,
    /// Still enabled after the pass; a failed normalization turns it off.
    pub aggregator_enabled: bool,
    pub rule_results: usize,
    pub ignored: usize,
    pub issues: Vec<ScanIssue>,
}

/// Walk `test_result` in document order and build every output batch.
pub fn collect_batches(
    document: &XccdfDocument,
    test_result: &TestResult<'_>,
    context: &ScanContext,
    ignore: &IgnoreSet,
    aggregator_enabled: bool,
) -> Result<ScanBatches, ScanError> {
    let mut batches = ScanBatches {
        aggregator_enabled,
        ..ScanBatches::default()
    };

    for result in test_result.rule_results() {
        let result = result?;
        batches.rule_results += 1;

        if result.outcome != Outcome::Fail {
            continue;
        }
        if ignore.contains(result.short_id()) {
            tracing::debug!(rule_id = %result.idref, "Failure suppressed by ignore list");
            batches.ignored += 1;
            continue;
        }

        batches.rows.push(normalizer::table_row(context, &result));
        batches.counts.record(&result.severity);

        if !batches.aggregator_enabled || !normalizer::is_finding_eligible(&result.severity) {
            continue;
        }
        let rule = document.find_rule(&result.idref);
        match normalizer::finding(context, &result, rule.as_ref()) {
            Ok(finding) => batches.findings.push(finding),
            Err(e) => {
                tracing::warn!(
                    rule_id = %result.idref,
                    error = %e,
                    "Finding normalization failed, aggregator disabled for this invocation"
                );
                batches.issues.push(ScanIssue::new("normalize", Some(result.idref.as_str()), &e));
                batches.aggregator_enabled = false;
            }
        }
    }

    Ok(batches)
}

/// Orchestrator holding the per-process collaborator handles.
pub struct ScanPipeline {
    handles: ScanHandles,
    budget: Duration,
}

impl ScanPipeline {
    /// `budget` bounds a whole invocation; every collaborator call gets
    /// whatever is left of it.
    pub fn new(handles: ScanHandles, budget: Duration) -> Self {
        Self { handles, budget }
    }

    /// Process the object named by `event`.
    pub async fn process(
        &self,
        event: &ObjectCreatedEvent,
        invoked_function_arn: &str,
    ) -> Result<ScanSummary, ScanError> {
        let deadline = Deadline::after(self.budget);
        let object = event.object()?;
        let identity = InvocationIdentity::from_function_arn(invoked_function_arn)?;
        let host_id = host_id_from_key(&object.key).to_string();
        tracing::info!(
            bucket = %object.bucket,
            object_key = %object.key,
            host_id = %host_id,
            "Processing scan report"
        );

        let flag = deadline
            .bound(
                self.handles.parameters.get(ENABLE_FINDINGS_PARAMETER, true),
                ScanError::ConfigUnavailable,
            )
            .await?;
        let aggregator_enabled = flag == "yes";

        let ignore = deadline
            .bound(self.handles.ignore_list.load(), ScanError::IgnoreListUnavailable)
            .await?;
        tracing::debug!(entries = ignore.len(), aggregator_enabled, "Loaded ignore list");

        let body = deadline
            .bound(
                self.handles.objects.get(&object.bucket, &object.key),
                ScanError::ObjectFetchFailed,
            )
            .await?;
        let document = XccdfDocument::parse(&body)?;
        let test_result = document.select_test_result()?;

        let context = ScanContext {
            host_id,
            account_id: identity.account_id,
            region: identity.region,
            bucket: object.bucket,
            object_key: object.key,
            test_version: test_result.version().map(String::from),
            profile_title: document.find_profile(ACTIVE_PROFILE_ID).map(|p| p.title),
        };

        let batches = collect_batches(
            &document,
            &test_result,
            &context,
            &ignore,
            aggregator_enabled,
        )?;
        Ok(self.flush(&context, batches, &deadline).await)
    }

    async fn flush(
        &self,
        context: &ScanContext,
        batches: ScanBatches,
        deadline: &Deadline,
    ) -> ScanSummary {
        let mut sink_errors = batches.issues;

        for tally in batches.counts.tallies(&context.host_id) {
            if let Err(e) = deadline
                .bound(self.handles.metrics.put(&tally), ScanError::MetricsEmitFailed)
                .await
            {
                tracing::warn!(
                    metric = tally.bucket.metric_name(),
                    error = %e,
                    "Failed to emit metric"
                );
                sink_errors.push(ScanIssue::new("metrics", None, &e));
            }
        }

        let mut rows_written = 0;
        if !batches.rows.is_empty() {
            match deadline
                .bound(
                    self.handles.results.write_batch(&batches.rows),
                    ScanError::TableWriteFailed,
                )
                .await
            {
                Ok(written) => rows_written = written,
                Err(e) => {
                    tracing::error!(
                        rows = batches.rows.len(),
                        error = %e,
                        "Failed to write results batch"
                    );
                    sink_errors.push(ScanIssue::new("table", None, &e));
                }
            }
        }

        let mut findings_submitted = 0;
        if batches.aggregator_enabled && !batches.findings.is_empty() {
            let submitter = self.handles.findings.as_ref();
            match submit_in_batches(submitter, &batches.findings, deadline).await {
                Ok(submitted) => findings_submitted = submitted,
                Err(e) => {
                    tracing::error!(
                        findings = batches.findings.len(),
                        error = %e,
                        "Failed to submit findings"
                    );
                    sink_errors.push(ScanIssue::new("findings", None, &e));
                }
            }
        }

        ScanSummary {
            host_id: context.host_id.clone(),
            object_key: context.object_key.clone(),
            rule_results: batches.rule_results,
            failures: batches.rows.len(),
            ignored: batches.ignored,
            rows_written,
            findings_submitted,
            aggregator_enabled: batches.aggregator_enabled,
            counts: batches.counts,
            sink_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::XCCDF_NS;

    fn context() -> ScanContext {
        ScanContext {
            host_id: "i-0abc".to_string(),
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            bucket: "scap-reports".to_string(),
            object_key: "i-0abc/scan.xml".to_string(),
            test_version: Some("1".to_string()),
            profile_title: Some("STIG".to_string()),
        }
    }

    fn report(rule_results: &str, rules: &str) -> XccdfDocument {
        let xml = format!(
            r#"<Benchmark xmlns="{XCCDF_NS}">{rules}<TestResult version="1">{rule_results}</TestResult></Benchmark>"#
        );
        XccdfDocument::parse(xml.as_bytes()).unwrap()
    }

    fn rule_result(idref: &str, severity: &str, outcome: &str) -> String {
        format!(
            r#"<rule-result idref="{idref}" severity="{severity}" time="2024-01-15T10:30:00+05:00"><result>{outcome}</result></rule-result>"#
        )
    }

    fn rule(id: &str) -> String {
        format!(r#"<Rule id="{id}"><title>T {id}</title><description>D {id}</description></Rule>"#)
    }

    fn collect(doc: &XccdfDocument, ignore: &IgnoreSet, aggregator_enabled: bool) -> ScanBatches {
        let test_result = doc.select_test_result().unwrap();
        collect_batches(doc, &test_result, &context(), ignore, aggregator_enabled).unwrap()
    }

    #[test]
    fn counts_include_ineligible_severities() {
        let doc = report(
            &[
                rule_result("r.h", "high", "fail"),
                rule_result("r.u", "unknown", "fail"),
                rule_result("r.p", "high", "pass"),
            ]
            .concat(),
            &rule("r.h"),
        );
        let batches = collect(&doc, &IgnoreSet::new(), true);

        assert_eq!(batches.rule_results, 3);
        assert_eq!(batches.rows.len(), 2);
        assert_eq!(batches.findings.len(), 1);
        assert_eq!(batches.counts.high, 1);
        assert_eq!(batches.counts.unknown, 1);
        assert!(batches.aggregator_enabled);
    }

    #[test]
    fn ignore_list_matches_short_id() {
        let doc = report(
            &[
                rule_result("a.b.keep", "low", "fail"),
                rule_result("a.b.drop", "low", "fail"),
            ]
            .concat(),
            &[rule("a.b.keep"), rule("a.b.drop")].concat(),
        );
        let ignore: IgnoreSet = ["drop".to_string()].into_iter().collect();
        let batches = collect(&doc, &ignore, true);

        assert_eq!(batches.rows.len(), 1);
        assert_eq!(batches.rows[0].rule_id, "a.b.keep");
        assert_eq!(batches.ignored, 1);
        assert_eq!(batches.counts.low, 1);
    }

    #[test]
    fn full_idref_in_ignore_list_does_not_match() {
        let doc = report(&rule_result("a.b.drop", "low", "fail"), &rule("a.b.drop"));
        let ignore: IgnoreSet = ["a.b.drop".to_string()].into_iter().collect();
        let batches = collect(&doc, &ignore, true);
        assert_eq!(batches.rows.len(), 1);
    }

    #[test]
    fn missing_rule_disables_aggregator_but_keeps_rows() {
        let doc = report(
            &[
                rule_result("r.first", "high", "fail"),
                rule_result("r.orphan", "high", "fail"),
                rule_result("r.after", "medium", "fail"),
            ]
            .concat(),
            &[rule("r.first"), rule("r.after")].concat(),
        );
        let batches = collect(&doc, &IgnoreSet::new(), true);

        assert_eq!(batches.rows.len(), 3);
        assert_eq!(batches.findings.len(), 1);
        assert!(!batches.aggregator_enabled);
        assert_eq!(batches.issues.len(), 1);
        assert_eq!(batches.issues[0].code, "MISSING_RULE");
        assert_eq!(batches.issues[0].rule_id.as_deref(), Some("r.orphan"));
        assert_eq!(batches.counts.high, 2);
        assert_eq!(batches.counts.medium, 1);
    }

    #[test]
    fn disabled_aggregator_builds_no_findings() {
        let doc = report(&rule_result("r.h", "high", "fail"), &rule("r.h"));
        let batches = collect(&doc, &IgnoreSet::new(), false);
        assert_eq!(batches.rows.len(), 1);
        assert!(batches.findings.is_empty());
        assert!(batches.issues.is_empty());
    }

    #[test]
    fn rows_and_findings_keep_document_order() {
        let ids = ["r.c", "r.a", "r.b"];
        let doc = report(
            &ids.map(|id| rule_result(id, "medium", "fail")).concat(),
            &ids.map(rule).concat(),
        );
        let batches = collect(&doc, &IgnoreSet::new(), true);

        let row_ids: Vec<&str> = batches.rows.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(row_ids, ids);
        let finding_ids: Vec<&str> = batches.findings.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(
            finding_ids,
            ["r.c_i-0abc/scan.xml", "r.a_i-0abc/scan.xml", "r.b_i-0abc/scan.xml"]
        );
    }
}
