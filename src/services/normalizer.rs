//! Finding normalizer.
//!
//! Pure conversion of one failing rule-result, in the context of its scan,
//! into the results-table row and the aggregator finding.

use std::collections::BTreeMap;

use crate::errors::ScanError;
use crate::models::records::{
    Compliance, FindingResource, FindingSeverity, Recommendation, Remediation, SecurityFinding,
    TableRow, Workflow,
};
use crate::models::scan::{RuleDefinition, RuleResult, ScanContext, Severity};

/// Severities the aggregator's taxonomy accepts.
pub const FINDING_SEVERITIES: [Severity; 3] = [Severity::High, Severity::Medium, Severity::Low];

/// Profile whose title is reported as the finding provider.
pub const ACTIVE_PROFILE_ID: &str = "xccdf_org.ssgproject.content_profile_stig";

pub const FINDING_SCHEMA_VERSION: &str = "2018-10-08";

const FINDING_TYPE: &str = "Software and Configuration Checks";
const RESOURCE_TYPE: &str = "AwsEc2Instance";

pub fn is_finding_eligible(severity: &Severity) -> bool {
    FINDING_SEVERITIES.contains(severity)
}

/// Drop everything from the last `+` and append `.000Z`.
///
/// No other validation: `2024-01-15T10:30:00+05:00` becomes
/// `2024-01-15T10:30:00.000Z`.
pub fn normalize_finding_time(raw: &str) -> String {
    let base = match raw.rfind('+') {
        Some(pos) => &raw[..pos],
        None => raw,
    };
    format!("{base}.000Z")
}

/// Results-table row for a failing rule-result.
pub fn table_row(context: &ScanContext, result: &RuleResult) -> TableRow {
    TableRow {
        host_id: context.host_id.clone(),
        rule_id: result.idref.clone(),
        time: result.time.clone().unwrap_or_default(),
        severity: result.severity.as_str().to_string(),
        result: result.outcome.as_str().to_string(),
        report_url: context.report_url(),
    }
}

/// Aggregator finding for a failing rule-result.
///
/// `rule` is the definition resolved for `result.idref`; `None` means the
/// report does not define it.
pub fn finding(
    context: &ScanContext,
    result: &RuleResult,
    rule: Option<&RuleDefinition>,
) -> Result<SecurityFinding, ScanError> {
    if !is_finding_eligible(&result.severity) {
        return Err(ScanError::NormalizationFailed(format!(
            "Severity '{}' of {} has no finding label",
            result.severity, result.idref
        )));
    }
    let rule = rule.ok_or_else(|| ScanError::MissingRule(result.idref.clone()))?;
    let provider_name = context.profile_title.clone().ok_or_else(|| {
        ScanError::NormalizationFailed(format!("Profile {ACTIVE_PROFILE_ID} not found in report"))
    })?;
    let time = result.time.as_deref().ok_or_else(|| {
        ScanError::NormalizationFailed(format!("rule-result {} has no time", result.idref))
    })?;
    let observed_at = normalize_finding_time(time);

    let product_fields = BTreeMap::from([
        ("ProviderName".to_string(), provider_name),
        (
            "ProviderVersion".to_string(),
            context.test_version.clone().unwrap_or_default(),
        ),
    ]);

    Ok(SecurityFinding {
        schema_version: FINDING_SCHEMA_VERSION.to_string(),
        id: format!("{}_{}", result.idref, context.object_key),
        product_arn: format!(
            "arn:aws:securityhub:{}:{}:product/{}/default",
            context.region, context.account_id, context.account_id
        ),
        generator_id: format!("OpenSCAP {}", result.idref),
        aws_account_id: context.account_id.clone(),
        types: vec![FINDING_TYPE.to_string()],
        first_observed_at: observed_at.clone(),
        last_observed_at: observed_at.clone(),
        created_at: observed_at.clone(),
        updated_at: observed_at,
        severity: FindingSeverity {
            label: result.severity.as_str().to_uppercase(),
        },
        title: rule.title.clone(),
        description: format!("{} ", rule.description),
        remediation: Remediation {
            recommendation: Recommendation {
                text: format!("For remediation please see: {}", context.report_url()),
            },
        },
        product_fields,
        resources: vec![FindingResource {
            resource_type: RESOURCE_TYPE.to_string(),
            id: context.host_id.clone(),
            region: context.region.clone(),
        }],
        compliance: Compliance {
            status: "FAILED".to_string(),
        },
        workflow_state: "NEW".to_string(),
        workflow: Workflow {
            status: "NEW".to_string(),
        },
    })
}
