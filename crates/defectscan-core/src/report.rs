//! Per-analysis summary statistics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{DetectionMethod, Finding, Severity};

/// Aggregate view of one document's findings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_findings: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub by_method: BTreeMap<String, usize>,
    /// `None` when there are no findings.
    pub mean_confidence: Option<f64>,
    pub highest_severity: Option<Severity>,
    /// `hybrid` if any finding involved the secondary signal, else `rule_based`.
    pub processing_method: String,
}

impl AnalysisSummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut by_category = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        let mut by_method = BTreeMap::new();

        for f in findings {
            *by_category.entry(f.category.clone()).or_insert(0) += 1;
            *by_severity
                .entry(f.severity.as_str().to_string())
                .or_insert(0) += 1;
            *by_method
                .entry(f.detection_method.as_str().to_string())
                .or_insert(0) += 1;
        }

        let mean_confidence = if findings.is_empty() {
            None
        } else {
            Some(findings.iter().map(|f| f.confidence).sum::<f64>() / findings.len() as f64)
        };

        let any_secondary = findings
            .iter()
            .any(|f| f.detection_method != DetectionMethod::RuleBased);

        Self {
            total_findings: findings.len(),
            by_category,
            by_severity,
            by_method,
            mean_confidence,
            highest_severity: findings.iter().map(|f| f.severity).max(),
            processing_method: if any_secondary { "hybrid" } else { "rule_based" }.to_string(),
        }
    }

    /// Number of findings at `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.by_severity
            .get(severity.as_str())
            .copied()
            .unwrap_or(0)
    }
}
