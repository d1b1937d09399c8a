//! Engine configuration: taxonomy, scoring tables, severity vocabulary
//!
//! `EngineConfig` is the serde-facing form (TOML or JSON). `compile()`
//! validates it and produces an immutable [`Taxonomy`] with every pattern
//! compiled up front, so a malformed taxonomy fails before any document is
//! processed.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::segment::Segmenter;

/// Upper bound for any finding's confidence.
pub const MAX_CONFIDENCE: f64 = 0.95;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("taxonomy defines no categories")]
    NoCategories,
    #[error("category #{0} has an empty name")]
    EmptyCategoryName(usize),
    #[error("category `{0}` is defined more than once")]
    DuplicateCategory(String),
    #[error("category `{0}` has no patterns")]
    NoPatterns(String),
    #[error("invalid pattern `{pattern}` in `{context}`: {message}")]
    InvalidPattern {
        context: String,
        pattern: String,
        message: String,
    },
    #[error("specificity boost `{phrase}` refers to unknown category `{category}`")]
    UnknownBoostCategory { phrase: String, category: String },
    #[error("`{name}` = {value} is out of range ({range})")]
    OutOfRange {
        name: String,
        value: f64,
        range: &'static str,
    },
    #[error("min_unit_chars must be at least 1")]
    ZeroMinUnitChars,
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format `{0}` (expected .toml or .json)")]
    UnsupportedFormat(String),
}

// ============================================================================
// Serde-facing configuration
// ============================================================================

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Units with fewer trimmed chars are discarded by the segmenter.
    pub min_unit_chars: usize,
    /// Defect categories in match order.
    pub categories: Vec<CategoryConfig>,
    pub scoring: ScoringConfig,
    pub severity: SeverityConfig,
}

/// One defect category and its ordered pattern list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub base_confidence: f64,
    /// Cap on rule confidence after a specificity boost.
    pub boost_cap: f64,
    /// Added to the mean of rule and signal confidence when they agree.
    pub agreement_bonus: f64,
    pub hybrid_cap: f64,
    pub specificity_boosts: Vec<SpecificityBoost>,
}

/// A phrase that raises confidence for matches of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificityBoost {
    pub phrase: String,
    pub category: String,
    pub boost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    /// Checked first; any hit means High.
    pub high: Vec<String>,
    pub medium: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn category(name: &str, patterns: &[&str]) -> CategoryConfig {
    CategoryConfig {
        name: name.to_string(),
        patterns: strings(patterns),
    }
}

fn boost(phrase: &str, category: &str, boost: f64) -> SpecificityBoost {
    SpecificityBoost {
        phrase: phrase.to_string(),
        category: category.to_string(),
        boost,
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_unit_chars: 15,
            categories: vec![
                category("Cracks", &["cracks?", "fissures?", "splits?", "fractures?"]),
                category(
                    "Damp",
                    &[
                        "damp(ness)?",
                        "moist(ure)?",
                        "wet(ness)?",
                        "humid(ity)?",
                        "condensation",
                        "water damage",
                    ],
                ),
                category(
                    "Corrosion",
                    &[
                        "rust(ing|ed|y)?",
                        "corro(sion|sive|ded)",
                        "oxid(ation|ised|ized)",
                        "deterioration",
                    ],
                ),
                category(
                    "Mold",
                    &["mou?ld", "fung(us|al|i)", "mildew", "spores", "black spots"],
                ),
                category(
                    "Structural",
                    &[
                        "structural (damage|defects?|failure|movement|stress)",
                        "beams?",
                        "load[- ]bearing",
                        "deflection",
                        "subsidence",
                        "settlement",
                    ],
                ),
                category(
                    "Electrical",
                    &[
                        "electrical",
                        "wiring",
                        "circuits?",
                        "outlets?",
                        "gfci",
                        "fuse ?(box|board)",
                        "voltage",
                    ],
                ),
                category(
                    "Plumbing",
                    &[
                        "plumbing",
                        "pipes?",
                        "leak(age|s|ing)?",
                        "drain(age)?",
                        "blockage",
                        "water pressure",
                        "sewage",
                    ],
                ),
            ],
            scoring: ScoringConfig::default(),
            severity: SeverityConfig::default(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_confidence: 0.7,
            boost_cap: 0.9,
            agreement_bonus: 0.1,
            hybrid_cap: MAX_CONFIDENCE,
            specificity_boosts: vec![
                boost("structural crack", "Cracks", 0.2),
                boost("water damage", "Damp", 0.2),
                boost("electrical hazard", "Electrical", 0.25),
                boost("safety hazard", "Electrical", 0.2),
                boost("foundation", "Structural", 0.15),
            ],
        }
    }
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            high: strings(&[
                "critical",
                "severe",
                "dangerous",
                "urgent",
                "immediate",
                "hazard",
                "safety",
                "major",
            ]),
            medium: strings(&["significant", "moderate", "concern", "notable"]),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "toml" => Self::from_toml_str(&text),
            "json" => Self::from_json_str(&text),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Validate and compile into an immutable taxonomy.
    pub fn compile(&self) -> Result<Taxonomy, ConfigError> {
        if self.min_unit_chars == 0 {
            return Err(ConfigError::ZeroMinUnitChars);
        }
        if self.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }

        let mut seen = HashSet::new();
        let mut categories = Vec::with_capacity(self.categories.len());
        for (idx, cat) in self.categories.iter().enumerate() {
            let name = cat.name.trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyCategoryName(idx));
            }
            if !seen.insert(name.to_string()) {
                return Err(ConfigError::DuplicateCategory(name.to_string()));
            }
            if cat.patterns.is_empty() {
                return Err(ConfigError::NoPatterns(name.to_string()));
            }
            let rules = cat
                .patterns
                .iter()
                .map(|p| {
                    Ok(PatternRule {
                        source: p.clone(),
                        regex: compile_pattern(p, name)?,
                    })
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;
            categories.push(CompiledCategory {
                name: name.to_string(),
                rules,
            });
        }

        let s = &self.scoring;
        unit_range("scoring.base_confidence", s.base_confidence)?;
        unit_range("scoring.agreement_bonus", s.agreement_bonus)?;
        cap_range("scoring.boost_cap", s.boost_cap)?;
        cap_range("scoring.hybrid_cap", s.hybrid_cap)?;
        if s.base_confidence > s.boost_cap {
            return Err(ConfigError::OutOfRange {
                name: "scoring.base_confidence".to_string(),
                value: s.base_confidence,
                range: "must not exceed scoring.boost_cap",
            });
        }

        let mut boosts = Vec::with_capacity(s.specificity_boosts.len());
        for b in &s.specificity_boosts {
            if !seen.contains(b.category.trim()) {
                return Err(ConfigError::UnknownBoostCategory {
                    phrase: b.phrase.clone(),
                    category: b.category.clone(),
                });
            }
            unit_range(&format!("specificity boost `{}`", b.phrase), b.boost)?;
            boosts.push(CompiledBoost {
                category: b.category.trim().to_string(),
                boost: b.boost,
                regex: compile_pattern(&b.phrase, "specificity_boosts")?,
            });
        }

        Ok(Taxonomy {
            min_unit_chars: self.min_unit_chars,
            categories,
            base_confidence: s.base_confidence,
            boost_cap: s.boost_cap,
            agreement_bonus: s.agreement_bonus,
            hybrid_cap: s.hybrid_cap,
            boosts,
            high_severity: fold_words(&self.severity.high),
            medium_severity: fold_words(&self.severity.medium),
            source: self.clone(),
        })
    }
}

fn compile_pattern(pattern: &str, context: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern {
            context: context.to_string(),
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn unit_range(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name: name.to_string(),
            value,
            range: "[0, 1]",
        })
    }
}

fn cap_range(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=MAX_CONFIDENCE).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name: name.to_string(),
            value,
            range: "[0, 0.95]",
        })
    }
}

fn fold_words(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

// ============================================================================
// Compiled taxonomy
// ============================================================================

/// A compiled pattern bound to its category
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub source: String,
    pub regex: Regex,
}

#[derive(Debug, Clone)]
pub struct CompiledCategory {
    pub name: String,
    pub rules: Vec<PatternRule>,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledBoost {
    pub(crate) category: String,
    pub(crate) boost: f64,
    pub(crate) regex: Regex,
}

/// Validated, immutable configuration shared by every classification call
#[derive(Debug, Clone)]
pub struct Taxonomy {
    min_unit_chars: usize,
    categories: Vec<CompiledCategory>,
    pub(crate) base_confidence: f64,
    pub(crate) boost_cap: f64,
    pub(crate) agreement_bonus: f64,
    pub(crate) hybrid_cap: f64,
    pub(crate) boosts: Vec<CompiledBoost>,
    pub(crate) high_severity: Vec<String>,
    pub(crate) medium_severity: Vec<String>,
    source: EngineConfig,
}

impl Taxonomy {
    pub fn categories(&self) -> &[CompiledCategory] {
        &self.categories
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c.name == name)
    }

    pub fn min_unit_chars(&self) -> usize {
        self.min_unit_chars
    }

    pub fn segmenter(&self) -> Segmenter {
        Segmenter::new(self.min_unit_chars)
    }

    /// The configuration this taxonomy was compiled from.
    pub fn config(&self) -> &EngineConfig {
        &self.source
    }
}
