//! Defect classification for building-survey documents
//!
//! Turns cleaned survey text into typed, scored, severity-tagged findings:
//! - Segmenter: splits text into sentence-like units
//! - Pattern classifier: ordered keyword/regex rules per defect category
//! - Scorer & merger: confidence, severity, and reconciliation with an
//!   optional secondary signal (e.g. a sentiment model used as a
//!   "problem detected" proxy)
//!
//! Document-to-text extraction (`extract`) and per-analysis summaries
//! (`report`) live here as well; persistence is a separate crate.
//!
//! The engine is synchronous and holds no mutable state between documents.
//! A single [`DefectEngine`] can be shared across threads.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod classify;
pub mod config;
pub mod engine;
pub mod extract;
pub mod report;
pub mod scoring;
pub mod segment;
pub mod signal;

pub use classify::{classify, RawMatch};
pub use config::{
    CategoryConfig, CompiledCategory, ConfigError, EngineConfig, PatternRule, ScoringConfig,
    SeverityConfig, SpecificityBoost, Taxonomy, MAX_CONFIDENCE,
};
pub use engine::{Capabilities, DefectEngine, DocumentAnalysis, RunState, VerdictError};
pub use extract::{clean_text, extract_bytes, extract_file, DocumentFormat, ExtractionError};
pub use report::AnalysisSummary;
pub use scoring::{infer_severity, rule_confidence, score_and_merge};
pub use segment::{segment, Segmenter, TextUnit};
pub use signal::{
    DisabledSignal, SecondarySignal, Sentiment, SentimentLabel, SentimentModel, SentimentSignal,
    SignalError, SignalVerdict,
};

// ============================================================================
// Findings
// ============================================================================

/// Severity of a finding, inferred from the wording of its sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which evidence produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Pattern rules only
    RuleBased,
    /// Secondary signal only (its category matched no rule in this unit)
    SecondaryOnly,
    /// Pattern rule corroborated by the secondary signal
    Hybrid,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::RuleBased => "rule_based",
            DetectionMethod::SecondaryOnly => "secondary_only",
            DetectionMethod::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected defect mention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub category: String,
    /// Text matched by the winning pattern rule; absent for secondary-only findings.
    pub matched_term: Option<String>,
    /// Source sentence, trimmed, original casing.
    pub sentence: String,
    /// In `[0, MAX_CONFIDENCE]`.
    pub confidence: f64,
    pub severity: Severity,
    pub detection_method: DetectionMethod,
}

// ============================================================================
// Convenience pipeline
// ============================================================================

/// Classify `text` with the built-in taxonomy and no secondary signal.
pub fn analyze_text(text: &str) -> Result<Vec<Finding>, ConfigError> {
    let engine = DefectEngine::rule_based(EngineConfig::default().compile()?);
    Ok(engine.analyze(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_method_serializes_as_snake_case() {
        let json = serde_json::to_string(&DetectionMethod::SecondaryOnly).unwrap();
        assert_eq!(json, "\"secondary_only\"");
        assert_eq!(DetectionMethod::RuleBased.to_string(), "rule_based");
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"High\"");
    }

    #[test]
    fn analyze_text_uses_builtin_taxonomy() {
        let findings =
            analyze_text("Mold growth was detected on the north-facing exterior wall.").unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, "Mold");
    }
}
