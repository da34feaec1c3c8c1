//! Feedback Collaborators
//!
//! Deterministic probes that score a candidate text and render the result
//! as extra guidance for the next prompt.
//!
//! A probe never fails: when it cannot score a text it returns a report
//! with `available: false` and a human-readable `reason`.
//!
//! # Architecture
//!
//! ```text
//! Candidate text → FeedbackProbe::probe → FeedbackReport → format_for_prompt → next prompt
//! ```

pub mod readability;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use readability::GradeLevelProbe;

/// Result of running one probe on one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub mechanism: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
}

impl FeedbackReport {
    pub fn available(mechanism: &str, metrics: BTreeMap<String, f64>) -> Self {
        Self {
            mechanism: mechanism.to_string(),
            available: true,
            reason: None,
            metrics,
        }
    }

    pub fn unavailable(mechanism: &str, reason: &str) -> Self {
        Self {
            mechanism: mechanism.to_string(),
            available: false,
            reason: Some(reason.to_string()),
            metrics: BTreeMap::new(),
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// A deterministic scorer for candidate text.
pub trait FeedbackProbe: Send + Sync {
    /// Stable mechanism name, e.g. `grade_level`.
    fn mechanism(&self) -> &'static str;

    /// Score `text`, optionally against a reference text.
    fn probe(&self, text: &str, reference: Option<&str>) -> FeedbackReport;

    /// Render a report as one line of prompt guidance.
    fn format_for_prompt(&self, report: &FeedbackReport) -> String {
        if !report.available {
            return format!(
                "{} unavailable ({}).",
                report.mechanism,
                report.reason.as_deref().unwrap_or("unavailable")
            );
        }
        let metrics = report
            .metrics
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}: {metrics}.", report.mechanism)
    }
}

/// Run every probe on `text`, in probe order.
pub fn probe_all(
    probes: &[Box<dyn FeedbackProbe>],
    text: &str,
    reference: Option<&str>,
) -> Vec<FeedbackReport> {
    probes.iter().map(|p| p.probe(text, reference)).collect()
}

/// Render reports with their matching probes, one line each.
///
/// Reports whose mechanism has no matching probe use the default rendering
/// of the first probe, or are skipped when no probes exist.
pub fn format_reports(probes: &[Box<dyn FeedbackProbe>], reports: &[FeedbackReport]) -> String {
    reports
        .iter()
        .filter_map(|report| {
            probes
                .iter()
                .find(|p| p.mechanism() == report.mechanism)
                .or_else(|| probes.first())
                .map(|p| p.format_for_prompt(report))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthProbe;

    impl FeedbackProbe for LengthProbe {
        fn mechanism(&self) -> &'static str {
            "length"
        }

        fn probe(&self, text: &str, _reference: Option<&str>) -> FeedbackReport {
            if text.is_empty() {
                return FeedbackReport::unavailable("length", "empty_text");
            }
            let mut metrics = BTreeMap::new();
            metrics.insert("chars".to_string(), text.len() as f64);
            FeedbackReport::available("length", metrics)
        }
    }

    #[test]
    fn test_default_format_available() {
        let report = LengthProbe.probe("abcd", None);
        assert_eq!(LengthProbe.format_for_prompt(&report), "length: chars=4.");
    }

    #[test]
    fn test_default_format_unavailable() {
        let report = LengthProbe.probe("", None);
        assert!(!report.available);
        assert_eq!(
            LengthProbe.format_for_prompt(&report),
            "length unavailable (empty_text)."
        );
    }

    #[test]
    fn test_probe_all_and_format_reports() {
        let probes: Vec<Box<dyn FeedbackProbe>> = vec![Box::new(LengthProbe)];
        let reports = probe_all(&probes, "xy", None);
        assert_eq!(reports.len(), 1);
        assert_eq!(format_reports(&probes, &reports), "length: chars=2.");
    }

    #[test]
    fn test_report_serde_skips_empty_fields() {
        let json = serde_json::to_value(FeedbackReport::available("x", BTreeMap::new())).unwrap();
        assert!(json.get("reason").is_none());
        assert!(json.get("metrics").is_none());
    }
}
