//! Classification engine
//!
//! Runs segment → classify → score/merge over one document at a time. The
//! engine owns only immutable state (the compiled taxonomy and the signal
//! strategy), so a single instance can classify many documents concurrently.
//!
//! Failure policy:
//! - empty or fragment-only text yields no findings, never an error
//! - an unavailable/slow secondary signal is switched off for the rest of
//!   the document and the run continues rule-based
//! - a malformed or invalid verdict is discarded for that unit only; the
//!   unit keeps its rule-based findings

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classify::{classify, RawMatch};
use crate::config::Taxonomy;
use crate::scoring::score_and_merge;
use crate::segment::TextUnit;
use crate::signal::{DisabledSignal, SecondarySignal, SignalError, SignalVerdict};
use crate::Finding;

/// Why a secondary verdict was discarded
#[derive(Debug, thiserror::Error)]
pub enum VerdictError {
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error("secondary signal proposed unknown category `{0}`")]
    UnknownCategory(String),
    #[error("secondary signal confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),
}

/// Per-document mutable state; never shared between documents.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Set once the secondary signal has failed for this document.
    pub signal_degraded: bool,
    /// Verdicts discarded as malformed or invalid.
    pub verdicts_rejected: usize,
}

/// What the engine can do with its current strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub rule_based: bool,
    pub secondary_signal: bool,
    pub hybrid: bool,
}

/// Findings plus bookkeeping for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub findings: Vec<Finding>,
    pub units_examined: usize,
    pub verdicts_rejected: usize,
    pub signal_degraded: bool,
    /// True if an abort request stopped the run early.
    pub aborted: bool,
}

/// Defect classification engine
#[derive(Clone)]
pub struct DefectEngine {
    taxonomy: Arc<Taxonomy>,
    signal: Arc<dyn SecondarySignal>,
}

impl DefectEngine {
    pub fn new(taxonomy: Taxonomy, signal: Arc<dyn SecondarySignal>) -> Self {
        Self {
            taxonomy: Arc::new(taxonomy),
            signal,
        }
    }

    /// Engine without a secondary signal.
    pub fn rule_based(taxonomy: Taxonomy) -> Self {
        Self::new(taxonomy, Arc::new(DisabledSignal))
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn capabilities(&self) -> Capabilities {
        let enabled = self.signal.is_enabled();
        Capabilities {
            rule_based: true,
            secondary_signal: enabled,
            hybrid: enabled,
        }
    }

    /// Classify a whole document.
    pub fn analyze(&self, text: &str) -> Vec<Finding> {
        self.analyze_document(text, &AtomicBool::new(false)).findings
    }

    /// Like [`analyze`](Self::analyze), but stops before the next unit once `abort` is set.
    pub fn analyze_with_abort(&self, text: &str, abort: &AtomicBool) -> Vec<Finding> {
        self.analyze_document(text, abort).findings
    }

    pub fn analyze_document(&self, text: &str, abort: &AtomicBool) -> DocumentAnalysis {
        let units = self.taxonomy.segmenter().segment(text);
        let mut run = RunState::default();
        let mut findings = Vec::new();
        let mut examined = 0;
        let mut aborted = false;

        for unit in &units {
            if abort.load(Ordering::Relaxed) {
                warn!(
                    remaining = units.len() - examined,
                    "abort requested; returning partial findings"
                );
                aborted = true;
                break;
            }
            examined += 1;
            findings.extend(self.analyze_unit(unit, &mut run));
        }

        info!(
            units = units.len(),
            findings = findings.len(),
            rejected = run.verdicts_rejected,
            signal_degraded = run.signal_degraded,
            "document classified"
        );

        DocumentAnalysis {
            findings,
            units_examined: examined,
            verdicts_rejected: run.verdicts_rejected,
            signal_degraded: run.signal_degraded,
            aborted,
        }
    }

    /// Classify a single unit. Signal trouble only ever costs the verdict.
    pub fn analyze_unit(&self, unit: &TextUnit, run: &mut RunState) -> Vec<Finding> {
        let raw = classify(&self.taxonomy, unit);
        let verdict = match self.consult_signal(unit, &raw, run) {
            Ok(v) => v,
            Err(err) => {
                warn!(
                    unit = unit.index,
                    signal = self.signal.name(),
                    error = %err,
                    "discarding secondary verdict"
                );
                run.verdicts_rejected += 1;
                None
            }
        };
        debug!(
            unit = unit.index,
            matches = raw.len(),
            corroborated = verdict.is_some(),
            "unit classified"
        );
        score_and_merge(&self.taxonomy, unit, &raw, verdict.as_ref())
    }

    fn consult_signal(
        &self,
        unit: &TextUnit,
        raw: &[RawMatch],
        run: &mut RunState,
    ) -> Result<Option<SignalVerdict>, VerdictError> {
        if run.signal_degraded || !self.signal.is_enabled() {
            return Ok(None);
        }

        let primary = raw.first().map(|m| m.category.as_str());
        let verdict = match self.signal.assess(unit, primary) {
            Ok(v) => v,
            Err(err) if err.disables_signal() => {
                warn!(
                    signal = self.signal.name(),
                    error = %err,
                    "secondary signal disabled for the rest of this document"
                );
                run.signal_degraded = true;
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        match verdict {
            Some(v) if !self.taxonomy.has_category(&v.category) => {
                Err(VerdictError::UnknownCategory(v.category))
            }
            Some(v) if !v.confidence.is_finite() || !(0.0..=1.0).contains(&v.confidence) => {
                Err(VerdictError::InvalidConfidence(v.confidence))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::DetectionMethod;
    use std::sync::atomic::AtomicUsize;

    fn taxonomy() -> Taxonomy {
        EngineConfig::default().compile().unwrap()
    }

    /// Returns a fixed verdict for every unit that has a primary category.
    struct Echo(f64);

    impl SecondarySignal for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn assess(
            &self,
            _unit: &TextUnit,
            primary: Option<&str>,
        ) -> Result<Option<SignalVerdict>, SignalError> {
            Ok(primary.map(|c| SignalVerdict {
                category: c.to_string(),
                confidence: self.0,
            }))
        }
    }

    /// Fails with `Unavailable` and counts how often it was asked.
    struct Down(AtomicUsize);

    impl SecondarySignal for Down {
        fn name(&self) -> &'static str {
            "down"
        }

        fn assess(
            &self,
            _unit: &TextUnit,
            _primary: Option<&str>,
        ) -> Result<Option<SignalVerdict>, SignalError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(SignalError::Unavailable("connection refused".to_string()))
        }
    }

    /// Proposes a category outside the taxonomy for units mentioning "roof".
    struct Rogue;

    impl SecondarySignal for Rogue {
        fn name(&self) -> &'static str {
            "rogue"
        }

        fn assess(
            &self,
            unit: &TextUnit,
            _primary: Option<&str>,
        ) -> Result<Option<SignalVerdict>, SignalError> {
            if unit.folded().contains("roof") {
                Ok(Some(SignalVerdict {
                    category: "Roofing".to_string(),
                    confidence: 0.9,
                }))
            } else {
                Ok(None)
            }
        }
    }

    const REPORT: &str = "Leaking pipe in the roof void. \
        Damp staining on the bedroom ceiling. \
        The wiring in the loft is original.";

    #[test]
    fn empty_document_is_not_an_error() {
        let engine = DefectEngine::rule_based(taxonomy());
        assert!(engine.analyze("").is_empty());
        assert!(engine.analyze("123. Page 4.").is_empty());
    }

    #[test]
    fn findings_follow_document_order() {
        let engine = DefectEngine::rule_based(taxonomy());
        let cats: Vec<String> = engine
            .analyze(REPORT)
            .into_iter()
            .map(|f| f.category)
            .collect();
        assert_eq!(cats, vec!["Plumbing", "Damp", "Electrical"]);
    }

    #[test]
    fn enabled_signal_produces_hybrid_findings() {
        let engine = DefectEngine::new(taxonomy(), Arc::new(Echo(0.8)));
        assert!(engine.capabilities().hybrid);
        let findings = engine.analyze(REPORT);
        assert_eq!(findings.len(), 3);
        assert!(findings
            .iter()
            .all(|f| f.detection_method == DetectionMethod::Hybrid));
    }

    #[test]
    fn unavailable_signal_degrades_once_per_document() {
        let down = Arc::new(Down(AtomicUsize::new(0)));
        let engine = DefectEngine::new(taxonomy(), down.clone());
        let analysis = engine.analyze_document(REPORT, &AtomicBool::new(false));

        assert!(analysis.signal_degraded);
        assert_eq!(analysis.findings.len(), 3);
        assert!(analysis
            .findings
            .iter()
            .all(|f| f.detection_method == DetectionMethod::RuleBased));
        assert_eq!(down.0.load(Ordering::SeqCst), 1);

        // the next document gets a fresh run
        engine.analyze(REPORT);
        assert_eq!(down.0.load(Ordering::SeqCst), 2);
    }

    /// Answers every unit with an unusable response.
    struct Garbled;

    impl SecondarySignal for Garbled {
        fn name(&self) -> &'static str {
            "garbled"
        }

        fn assess(
            &self,
            _unit: &TextUnit,
            _primary: Option<&str>,
        ) -> Result<Option<SignalVerdict>, SignalError> {
            Err(SignalError::Malformed("unknown label `NEUTRAL`".to_string()))
        }
    }

    #[test]
    fn unknown_signal_category_keeps_rule_findings() {
        let engine = DefectEngine::new(taxonomy(), Arc::new(Rogue));
        let analysis = engine.analyze_document(REPORT, &AtomicBool::new(false));
        assert_eq!(analysis.verdicts_rejected, 1);
        assert!(!analysis.signal_degraded);
        let cats: Vec<&str> = analysis
            .findings
            .iter()
            .map(|f| f.category.as_str())
            .collect();
        assert_eq!(cats, vec!["Plumbing", "Damp", "Electrical"]);
        assert!(analysis
            .findings
            .iter()
            .all(|f| f.detection_method == DetectionMethod::RuleBased));
    }

    #[test]
    fn malformed_answers_fall_back_to_rules() {
        let with_signal = DefectEngine::new(taxonomy(), Arc::new(Garbled));
        let analysis = with_signal.analyze_document(REPORT, &AtomicBool::new(false));

        let rule_only = DefectEngine::rule_based(taxonomy()).analyze(REPORT);
        assert_eq!(analysis.findings, rule_only);
        assert_eq!(analysis.verdicts_rejected, 3);
        assert!(!analysis.signal_degraded);
    }

    #[test]
    fn abort_returns_partial_results() {
        let engine = DefectEngine::rule_based(taxonomy());
        let abort = AtomicBool::new(true);
        let analysis = engine.analyze_document(REPORT, &abort);
        assert!(analysis.aborted);
        assert_eq!(analysis.units_examined, 0);
        assert!(engine.analyze_with_abort(REPORT, &abort).is_empty());
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DefectEngine>();
    }
}
