//! Per-invocation scan entities: context, rule-results and rule definitions.

use serde::Serialize;

/// Rule-result severity as reported by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Severity {
    High,
    Medium,
    Low,
    Unknown,
    Other(String),
}

impl Severity {
    /// Map the `severity` attribute; a missing attribute is `unknown` per XCCDF.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("high") => Self::High,
            Some("medium") => Self::Medium,
            Some("low") => Self::Low,
            Some("unknown") | None => Self::Unknown,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
            Self::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one rule evaluation (`<result>` text).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
    NotApplicable,
    NotChecked,
    NotSelected,
    Error,
    Informational,
    Fixed,
    Unknown,
}

impl Outcome {
    /// Unrecognized text maps to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "pass" => Self::Pass,
            "fail" => Self::Fail,
            "notapplicable" => Self::NotApplicable,
            "notchecked" => Self::NotChecked,
            "notselected" => Self::NotSelected,
            "error" => Self::Error,
            "informational" => Self::Informational,
            "fixed" => Self::Fixed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::NotApplicable => "notapplicable",
            Self::NotChecked => "notchecked",
            Self::NotSelected => "notselected",
            Self::Error => "error",
            Self::Informational => "informational",
            Self::Fixed => "fixed",
            Self::Unknown => "unknown",
        }
    }
}

/// One `rule-result` element of the consumed `TestResult`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult {
    pub idref: String,
    pub severity: Severity,
    pub outcome: Outcome,
    pub time: Option<String>,
}

impl RuleResult {
    /// Ignore-list key: suffix after the last `.`, or the whole id.
    pub fn short_id(&self) -> &str {
        short_rule_id(&self.idref)
    }
}

/// Suffix after the last `.` of a rule id, or the id itself when undotted.
pub fn short_rule_id(idref: &str) -> &str {
    match idref.rfind('.') {
        Some(pos) => &idref[pos + 1..],
        None => idref,
    }
}

/// Human text of a `Rule` element.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// A `Profile` element's identity and title.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDefinition {
    pub id: String,
    pub title: String,
}

/// Immutable facts about the object being processed.
#[derive(Debug, Clone, Serialize)]
pub struct ScanContext {
    pub host_id: String,
    pub account_id: String,
    pub region: String,
    pub bucket: String,
    pub object_key: String,
    pub test_version: Option<String>,
    pub profile_title: Option<String>,
}

impl ScanContext {
    /// Key of the HTML rendering published next to the XML report.
    pub fn report_html_key(&self) -> String {
        self.object_key.replace(".xml", ".html")
    }

    /// Location of the HTML report for the same scan.
    pub fn report_url(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.report_html_key())
    }
}

/// First path segment of an object key.
pub fn host_id_from_key(object_key: &str) -> &str {
    object_key.split('/').next().unwrap_or(object_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(key: &str) -> ScanContext {
        ScanContext {
            host_id: host_id_from_key(key).to_string(),
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            bucket: "scap-reports".to_string(),
            object_key: key.to_string(),
            test_version: None,
            profile_title: None,
        }
    }

    #[test]
    fn short_id_is_suffix_after_last_dot() {
        assert_eq!(
            short_rule_id("xccdf_org.ssgproject.content_rule_sshd_disable_root_login"),
            "content_rule_sshd_disable_root_login"
        );
        assert_eq!(short_rule_id("r.h"), "h");
        assert_eq!(short_rule_id("plain_rule"), "plain_rule");
        assert_eq!(short_rule_id("trailing."), "");
    }

    #[test]
    fn severity_parse() {
        assert_eq!(Severity::parse(Some("high")), Severity::High);
        assert_eq!(Severity::parse(Some("medium")), Severity::Medium);
        assert_eq!(Severity::parse(Some("low")), Severity::Low);
        assert_eq!(Severity::parse(Some("unknown")), Severity::Unknown);
        assert_eq!(Severity::parse(None), Severity::Unknown);
        assert_eq!(Severity::parse(Some("info")), Severity::Other("info".to_string()));
        assert_eq!(Severity::parse(Some("info")).as_str(), "info");
    }

    #[test]
    fn outcome_parse_trims_and_defaults() {
        assert_eq!(Outcome::parse(" fail\n"), Outcome::Fail);
        assert_eq!(Outcome::parse("notapplicable"), Outcome::NotApplicable);
        assert_eq!(Outcome::parse("bogus"), Outcome::Unknown);
        assert_eq!(Outcome::Fixed.as_str(), "fixed");
    }

    #[test]
    fn host_id_is_first_segment() {
        assert_eq!(host_id_from_key("i-0abc/2024/scan.xml"), "i-0abc");
        assert_eq!(host_id_from_key("scan.xml"), "scan.xml");
    }

    #[test]
    fn report_url_replaces_every_xml() {
        let ctx = context("i-0abc/report.xml.d/scan.xml");
        assert_eq!(ctx.report_url(), "s3://scap-reports/i-0abc/report.html.d/scan.html");
    }

    #[test]
    fn report_url_substitution_is_idempotent() {
        let ctx = context("i-0abc/scan.xml");
        let once = ctx.report_html_key();
        assert_eq!(once.replace(".xml", ".html"), once);
    }
}
