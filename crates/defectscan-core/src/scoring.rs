//! Confidence scoring, severity inference, and merging with the secondary signal

use crate::classify::RawMatch;
use crate::config::{Taxonomy, MAX_CONFIDENCE};
use crate::segment::TextUnit;
use crate::signal::SignalVerdict;
use crate::{DetectionMethod, Finding, Severity};

/// Rule confidence for a match of `category` in the (lower-cased) `folded` text.
///
/// Starts at the base confidence; the first specificity phrase bound to the
/// same category adds its boost. The result is capped at `boost_cap`.
/// A phrase bound to another category never raises this one, even when it
/// appears in the same sentence.
pub fn rule_confidence(taxonomy: &Taxonomy, category: &str, folded: &str) -> f64 {
    let boost = taxonomy
        .boosts
        .iter()
        .find(|b| b.category == category && b.regex.is_match(folded))
        .map(|b| b.boost)
        .unwrap_or(0.0);
    (taxonomy.base_confidence + boost).min(taxonomy.boost_cap)
}

/// Severity from vocabulary: High words first, then Medium, otherwise Low.
pub fn infer_severity(taxonomy: &Taxonomy, folded: &str) -> Severity {
    if taxonomy.high_severity.iter().any(|w| folded.contains(w.as_str())) {
        Severity::High
    } else if taxonomy
        .medium_severity
        .iter()
        .any(|w| folded.contains(w.as_str()))
    {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Turn one unit's raw matches (plus an optional secondary verdict) into findings.
///
/// Findings follow the order of `raw`; a secondary-only finding, if any, comes last.
pub fn score_and_merge(
    taxonomy: &Taxonomy,
    unit: &TextUnit,
    raw: &[RawMatch],
    verdict: Option<&SignalVerdict>,
) -> Vec<Finding> {
    if raw.is_empty() && verdict.is_none() {
        return Vec::new();
    }

    let folded = unit.folded();
    let severity = infer_severity(taxonomy, &folded);
    let mut findings = Vec::with_capacity(raw.len() + 1);
    let mut corroborated = false;

    for m in raw {
        let rule_conf = rule_confidence(taxonomy, &m.category, &folded);
        let (confidence, method) = match verdict {
            Some(v) if v.category == m.category => {
                corroborated = true;
                let merged = (rule_conf + v.confidence) / 2.0 + taxonomy.agreement_bonus;
                (merged.min(taxonomy.hybrid_cap), DetectionMethod::Hybrid)
            }
            _ => (rule_conf, DetectionMethod::RuleBased),
        };
        findings.push(Finding {
            category: m.category.clone(),
            matched_term: Some(m.matched_term.clone()),
            sentence: unit.text.clone(),
            confidence: clamp_confidence(confidence),
            severity,
            detection_method: method,
        });
    }

    if let Some(v) = verdict {
        if !corroborated {
            findings.push(Finding {
                category: v.category.clone(),
                matched_term: None,
                sentence: unit.text.clone(),
                confidence: clamp_confidence(v.confidence),
                severity,
                detection_method: DetectionMethod::SecondaryOnly,
            });
        }
    }

    findings
}

fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, MAX_CONFIDENCE)
}
