//! Compliance report parsers.
//!
//! Reports are parsed into a document model the pipeline queries for
//! rule-results and the definitions they reference.

pub mod xccdf;

pub use xccdf::{TestResult, XccdfDocument, XCCDF_NS};
