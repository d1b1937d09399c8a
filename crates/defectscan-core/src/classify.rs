//! Pattern classification
//!
//! Each category's rules are tried in order against the lower-cased unit;
//! the first hit wins for that category and the rest of its rules are
//! skipped. Categories are independent, so one unit can match several.
//! Matching is plain containment (`crack` matches "cracked"), not
//! whole-word.

use serde::{Deserialize, Serialize};

use crate::config::Taxonomy;
use crate::segment::TextUnit;

/// A category hit before scoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMatch {
    pub category: String,
    /// The text the winning rule matched, lower-cased.
    pub matched_term: String,
}

/// Match `unit` against every category, in taxonomy order.
pub fn classify(taxonomy: &Taxonomy, unit: &TextUnit) -> Vec<RawMatch> {
    let folded = unit.folded();
    let mut matches = Vec::new();

    for category in taxonomy.categories() {
        let hit = category
            .rules
            .iter()
            .find_map(|rule| rule.regex.find(&folded));
        if let Some(m) = hit {
            matches.push(RawMatch {
                category: category.name.clone(),
                matched_term: m.as_str().to_string(),
            });
        }
    }

    matches
}
