//! XCCDF 1.2 report parser.
//!
//! Reads the whole report into a compact element tree with namespace-resolved
//! names, then answers the lookups the pipeline needs: the single `TestResult`,
//! its `rule-result` children in document order, and `Rule`/`Profile`
//! definitions by id. Only elements bound to the XCCDF 1.2 namespace match.

use std::collections::HashMap;

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::errors::ScanError;
use crate::models::scan::{Outcome, ProfileDefinition, RuleDefinition, RuleResult, Severity};

/// XCCDF 1.2 namespace URI.
pub const XCCDF_NS: &str = "http://checklists.nist.gov/xccdf/1.2";

/// Deepest element nesting accepted in a report.
pub const MAX_DEPTH: usize = 1024;

#[derive(Debug)]
enum Content {
    Element(usize),
    Text(String),
}

#[derive(Debug)]
struct Element {
    xccdf: bool,
    name: String,
    attributes: Vec<(String, String)>,
    content: Vec<Content>,
}

/// A parsed XCCDF report.
#[derive(Debug)]
pub struct XccdfDocument {
    elements: Vec<Element>,
    rules: HashMap<String, usize>,
    profiles: HashMap<String, usize>,
}

/// The `TestResult` element consumed for this report.
#[derive(Debug, Clone, Copy)]
pub struct TestResult<'a> {
    doc: &'a XccdfDocument,
    index: usize,
}

impl XccdfDocument {
    /// Parse raw report bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ScanError> {
        let mut reader = NsReader::from_reader(data);
        let mut buf = Vec::new();
        let mut elements: Vec<Element> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let mut has_root = false;

        loop {
            let (ns, event) = reader
                .read_resolved_event_into(&mut buf)
                .map_err(|e| ScanError::MalformedReport(e.to_string()))?;
            let xccdf =
                matches!(ns, ResolveResult::Bound(uri) if uri.as_ref() == XCCDF_NS.as_bytes());

            match event {
                Event::Start(start) => {
                    if open.len() >= MAX_DEPTH {
                        return Err(ScanError::MalformedReport(format!(
                            "Elements nested deeper than {MAX_DEPTH} levels"
                        )));
                    }
                    let element = read_element(&start, xccdf)?;
                    let index = attach(&mut elements, &open, &mut has_root, element)?;
                    open.push(index);
                }
                Event::Empty(start) => {
                    let element = read_element(&start, xccdf)?;
                    attach(&mut elements, &open, &mut has_root, element)?;
                }
                Event::End(_) => {
                    open.pop();
                }
                Event::Text(text) => {
                    let value = unescape(utf8(&text)?)
                        .map_err(|e| ScanError::MalformedReport(e.to_string()))?;
                    append_text(&mut elements, &open, &value);
                }
                Event::CData(cdata) => {
                    append_text(&mut elements, &open, utf8(&cdata)?);
                }
                Event::GeneralRef(reference) => {
                    let entity = format!("&{};", utf8(&reference)?);
                    let value = unescape(&entity)
                        .map_err(|e| ScanError::MalformedReport(e.to_string()))?;
                    append_text(&mut elements, &open, &value);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !has_root {
            return Err(ScanError::MalformedReport("Document has no root element".to_string()));
        }
        if !open.is_empty() {
            return Err(ScanError::MalformedReport("Unexpected end of document".to_string()));
        }

        let mut rules = HashMap::new();
        let mut profiles = HashMap::new();
        for (index, element) in elements.iter().enumerate() {
            if !element.xccdf {
                continue;
            }
            let index_by_id = match element.name.as_str() {
                "Rule" => &mut rules,
                "Profile" => &mut profiles,
                _ => continue,
            };
            if let Some(id) = attribute_of(element, "id") {
                index_by_id.entry(id.to_string()).or_insert(index);
            }
        }

        Ok(Self {
            elements,
            rules,
            profiles,
        })
    }

    /// The report's single `TestResult`.
    pub fn select_test_result(&self) -> Result<TestResult<'_>, ScanError> {
        let mut found = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.xccdf && e.name == "TestResult")
            .map(|(index, _)| index);

        let index = found.next().ok_or(ScanError::MissingTestResult)?;
        let extra = found.count();
        if extra > 0 {
            return Err(ScanError::MultipleTestResults(extra + 1));
        }
        Ok(TestResult { doc: self, index })
    }

    /// The `Rule` with the given id, with its first `title` and `description`.
    pub fn find_rule(&self, idref: &str) -> Option<RuleDefinition> {
        let index = *self.rules.get(idref)?;
        Some(RuleDefinition {
            id: idref.to_string(),
            title: self.child_text(index, "title").unwrap_or_default(),
            description: self.child_text(index, "description").unwrap_or_default(),
        })
    }

    /// The `Profile` with the given id.
    pub fn find_profile(&self, profile_id: &str) -> Option<ProfileDefinition> {
        let index = *self.profiles.get(profile_id)?;
        Some(ProfileDefinition {
            id: profile_id.to_string(),
            title: self.child_text(index, "title").unwrap_or_default(),
        })
    }

    fn attribute(&self, index: usize, name: &str) -> Option<&str> {
        attribute_of(&self.elements[index], name)
    }

    fn children<'a>(&'a self, index: usize, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.elements[index].content.iter().filter_map(move |content| match content {
            Content::Element(child)
                if self.elements[*child].xccdf && self.elements[*child].name == name =>
            {
                Some(*child)
            }
            _ => None,
        })
    }

    fn child_text(&self, index: usize, name: &str) -> Option<String> {
        let child = self.children(index, name).next()?;
        Some(self.text_content(child).trim().to_string())
    }

    /// Concatenated text of `index` and all its descendants, in document order.
    fn text_content(&self, index: usize) -> String {
        let mut out = String::new();
        let mut pending: Vec<&Content> = self.elements[index].content.iter().rev().collect();
        while let Some(content) = pending.pop() {
            match content {
                Content::Text(text) => out.push_str(text),
                Content::Element(child) => {
                    pending.extend(self.elements[*child].content.iter().rev());
                }
            }
        }
        out
    }

    fn rule_result(&self, index: usize) -> Result<RuleResult, ScanError> {
        let idref = self.attribute(index, "idref").ok_or_else(|| {
            ScanError::MalformedReport("rule-result without idref".to_string())
        })?;
        let outcome = self
            .children(index, "result")
            .next()
            .map(|result| Outcome::parse(&self.text_content(result)))
            .unwrap_or(Outcome::Unknown);

        Ok(RuleResult {
            idref: idref.to_string(),
            severity: Severity::parse(self.attribute(index, "severity")),
            outcome,
            time: self.attribute(index, "time").map(String::from),
        })
    }
}

impl<'a> TestResult<'a> {
    pub fn id(&self) -> Option<&'a str> {
        self.doc.attribute(self.index, "id")
    }

    /// `TestResult/@version`, the benchmark version that was evaluated.
    pub fn version(&self) -> Option<&'a str> {
        self.doc.attribute(self.index, "version")
    }

    /// `rule-result` children in document order.
    pub fn rule_results(&self) -> impl Iterator<Item = Result<RuleResult, ScanError>> + 'a {
        let doc = self.doc;
        doc.children(self.index, "rule-result")
            .map(move |index| doc.rule_result(index))
    }
}

fn read_element(start: &BytesStart<'_>, xccdf: bool) -> Result<Element, ScanError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| {
            ScanError::MalformedReport(format!("Bad attribute on <{name}>: {e}"))
        })?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = unescape(utf8(&attr.value)?)
            .map_err(|e| ScanError::MalformedReport(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        xccdf,
        name,
        attributes,
        content: Vec::new(),
    })
}

fn attach(
    elements: &mut Vec<Element>,
    open: &[usize],
    has_root: &mut bool,
    element: Element,
) -> Result<usize, ScanError> {
    let index = elements.len();
    match open.last() {
        Some(&parent) => elements[parent].content.push(Content::Element(index)),
        None if !*has_root => *has_root = true,
        None => {
            return Err(ScanError::MalformedReport(
                "Document has more than one root element".to_string(),
            ))
        }
    }
    elements.push(element);
    Ok(index)
}

fn append_text(elements: &mut [Element], open: &[usize], text: &str) {
    let Some(&parent) = open.last() else {
        return;
    };
    let content = &mut elements[parent].content;
    if let Some(Content::Text(last)) = content.last_mut() {
        last.push_str(text);
    } else {
        content.push(Content::Text(text.to_string()));
    }
}

fn attribute_of<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
    element
        .attributes
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn utf8(bytes: &[u8]) -> Result<&str, ScanError> {
    std::str::from_utf8(bytes)
        .map_err(|e| ScanError::MalformedReport(format!("Invalid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = include_bytes!("../../tests/fixtures/xccdf_sample.xml");

    fn doc(body: &str) -> String {
        format!(r#"<Benchmark xmlns="{XCCDF_NS}" id="b">{body}</Benchmark>"#)
    }

    #[test]
    fn selects_test_result_version() {
        let document = XccdfDocument::parse(SAMPLE).unwrap();
        let test_result = document.select_test_result().unwrap();
        assert_eq!(test_result.version(), Some("0.1.72"));
        assert_eq!(
            test_result.id(),
            Some("xccdf_org.open-scap_testresult_xccdf_org.ssgproject.content_profile_stig")
        );
    }

    #[test]
    fn rule_results_in_document_order() {
        let document = XccdfDocument::parse(SAMPLE).unwrap();
        let results: Vec<RuleResult> = document
            .select_test_result()
            .unwrap()
            .rule_results()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].idref, "xccdf_org.ssgproject.content_rule_sshd_disable_root_login");
        assert_eq!(results[0].outcome, Outcome::Fail);
        assert_eq!(results[0].severity, Severity::Medium);
        assert_eq!(results[0].time.as_deref(), Some("2024-01-15T10:30:00+05:00"));
        assert_eq!(results[1].outcome, Outcome::Pass);
        assert_eq!(results[2].outcome, Outcome::NotApplicable);
        assert_eq!(results[2].severity, Severity::Low);
    }

    #[test]
    fn finds_rule_text_including_nested_markup() {
        let document = XccdfDocument::parse(SAMPLE).unwrap();
        let rule = document
            .find_rule("xccdf_org.ssgproject.content_rule_sshd_disable_root_login")
            .unwrap();
        assert_eq!(rule.title, "Disable SSH Root Login");
        assert!(rule.description.starts_with("The root user should never"));
        assert!(rule.description.contains("/etc/ssh/sshd_config: PermitRootLogin no"));
    }

    #[test]
    fn resolves_entities_and_cdata() {
        let document = XccdfDocument::parse(SAMPLE).unwrap();
        let telnet = document
            .find_rule("xccdf_org.ssgproject.content_rule_package_telnet-server_removed")
            .unwrap();
        assert_eq!(
            telnet.description,
            "The telnet-server package & its daemon transmit credentials in clear text <unencrypted>."
        );
        let banner = document
            .find_rule("xccdf_org.ssgproject.content_rule_banner_etc_issue")
            .unwrap();
        assert_eq!(banner.description, "Edit /etc/issue & replace the default text.");
    }

    #[test]
    fn finds_profile_by_id() {
        let document = XccdfDocument::parse(SAMPLE).unwrap();
        let profile = document
            .find_profile("xccdf_org.ssgproject.content_profile_stig")
            .unwrap();
        assert_eq!(profile.title, "DISA STIG for Red Hat Enterprise Linux 9");
        assert!(document.find_profile("xccdf_org.ssgproject.content_profile_cis").is_none());
    }

    #[test]
    fn unknown_rule_is_none() {
        let document = XccdfDocument::parse(SAMPLE).unwrap();
        assert!(document.find_rule("xccdf_org.ssgproject.content_rule_missing").is_none());
    }

    #[test]
    fn missing_test_result() {
        let document = XccdfDocument::parse(doc("<Rule id=\"r\"/>").as_bytes()).unwrap();
        assert!(matches!(
            document.select_test_result(),
            Err(ScanError::MissingTestResult)
        ));
    }

    #[test]
    fn multiple_test_results_rejected() {
        let xml = doc(r#"<TestResult id="a" version="1"/><TestResult id="b" version="1"/>"#);
        let document = XccdfDocument::parse(xml.as_bytes()).unwrap();
        assert!(matches!(
            document.select_test_result(),
            Err(ScanError::MultipleTestResults(2))
        ));
    }

    #[test]
    fn elements_outside_namespace_do_not_match() {
        let xml = r#"<Benchmark xmlns="urn:other"><TestResult version="1"/></Benchmark>"#;
        let document = XccdfDocument::parse(xml.as_bytes()).unwrap();
        assert!(matches!(
            document.select_test_result(),
            Err(ScanError::MissingTestResult)
        ));
    }

    #[test]
    fn prefixed_namespace_matches() {
        let xml = format!(
            r#"<x:Benchmark xmlns:x="{XCCDF_NS}"><x:TestResult version="2"><x:rule-result idref="a.b" severity="high" time="t"><x:result>fail</x:result></x:rule-result></x:TestResult></x:Benchmark>"#
        );
        let document = XccdfDocument::parse(xml.as_bytes()).unwrap();
        let test_result = document.select_test_result().unwrap();
        let results: Vec<_> = test_result.rule_results().collect::<Result<_, _>>().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].short_id(), "b");
    }

    #[test]
    fn missing_severity_is_unknown() {
        let xml = doc(
            r#"<TestResult version="1"><rule-result idref="r.x"><result>fail</result></rule-result></TestResult>"#,
        );
        let document = XccdfDocument::parse(xml.as_bytes()).unwrap();
        let result = document
            .select_test_result()
            .unwrap()
            .rule_results()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(result.severity, Severity::Unknown);
        assert_eq!(result.time, None);
    }

    #[test]
    fn rule_result_without_idref_is_malformed() {
        let xml = doc(
            r#"<TestResult version="1"><rule-result><result>fail</result></rule-result></TestResult>"#,
        );
        let document = XccdfDocument::parse(xml.as_bytes()).unwrap();
        let first = document.select_test_result().unwrap().rule_results().next().unwrap();
        assert!(matches!(first, Err(ScanError::MalformedReport(_))));
    }

    #[test]
    fn malformed_xml_rejected() {
        let result = XccdfDocument::parse(b"<Benchmark><TestResult></Benchmark>");
        assert!(matches!(result, Err(ScanError::MalformedReport(_))));
    }

    #[test]
    fn truncated_xml_rejected() {
        let xml = format!(r#"<Benchmark xmlns="{XCCDF_NS}"><TestResult version="1">"#);
        assert!(XccdfDocument::parse(xml.as_bytes()).is_err());
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(
            XccdfDocument::parse(b""),
            Err(ScanError::MalformedReport(_))
        ));
    }

    fn nested_description(levels: usize) -> String {
        let body = format!(
            r#"<Rule id="r.deep"><title>Deep</title><description>{}text{}</description></Rule>"#,
            "<b>".repeat(levels),
            "</b>".repeat(levels)
        );
        doc(&body)
    }

    #[test]
    fn nesting_beyond_limit_rejected() {
        let xml = nested_description(200_000);
        assert!(matches!(
            XccdfDocument::parse(xml.as_bytes()),
            Err(ScanError::MalformedReport(_))
        ));
    }

    #[test]
    fn deep_nesting_within_limit_keeps_text() {
        let xml = nested_description(MAX_DEPTH - 3);
        let document = XccdfDocument::parse(xml.as_bytes()).unwrap();
        let rule = document.find_rule("r.deep").unwrap();
        assert_eq!(rule.description, "text");
    }
}
