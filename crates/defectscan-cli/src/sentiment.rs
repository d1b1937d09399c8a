//! HTTP sentiment service client
//!
//! Speaks the common text-classification inference format:
//! request `{"inputs": "<text>"}`, response `[{"label": "NEGATIVE", "score": 0.98}, ...]`
//! (optionally nested one level deeper, one list per input).

use defectscan_core::{Sentiment, SentimentLabel, SentimentModel, SignalError};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ScoredLabel {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Flat(Vec<ScoredLabel>),
    Nested(Vec<Vec<ScoredLabel>>),
}

/// Parse an inference response, keeping the highest-scoring label.
fn parse_response(body: &str) -> Result<Sentiment, SignalError> {
    let parsed: InferenceResponse =
        serde_json::from_str(body).map_err(|e| SignalError::Malformed(e.to_string()))?;
    let labels = match parsed {
        InferenceResponse::Flat(v) => v,
        InferenceResponse::Nested(v) => v.into_iter().next().unwrap_or_default(),
    };
    let best = labels
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or_else(|| SignalError::Malformed("empty label list".to_string()))?;

    let label = match best.label.to_ascii_uppercase().as_str() {
        "NEGATIVE" | "NEG" => SentimentLabel::Negative,
        "POSITIVE" | "POS" => SentimentLabel::Positive,
        "NEUTRAL" | "NEU" => SentimentLabel::Neutral,
        other => return Err(SignalError::Malformed(format!("unknown label `{other}`"))),
    };
    Ok(Sentiment {
        label,
        score: best.score,
    })
}

/// Remote sentiment classifier
pub struct HttpSentimentModel {
    client: reqwest::blocking::Client,
    url: String,
    timeout: Duration,
}

impl HttpSentimentModel {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SignalError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SignalError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }
}

impl SentimentModel for HttpSentimentModel {
    fn classify(&self, text: &str) -> Result<Sentiment, SignalError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "inputs": text }))
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    SignalError::Timeout {
                        elapsed_ms: self.timeout.as_millis(),
                        limit_ms: self.timeout.as_millis(),
                    }
                } else {
                    SignalError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignalError::Unavailable(format!(
                "{} returned {status}",
                self.url
            )));
        }
        let body = response
            .text()
            .map_err(|e| SignalError::Unavailable(e.to_string()))?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_response_picks_best_label() {
        let s = parse_response(
            r#"[{"label":"POSITIVE","score":0.1},{"label":"NEGATIVE","score":0.9}]"#,
        )
        .unwrap();
        assert_eq!(s.label, SentimentLabel::Negative);
        assert_eq!(s.score, 0.9);
    }

    #[test]
    fn nested_response_is_accepted() {
        let s = parse_response(r#"[[{"label":"positive","score":0.97}]]"#).unwrap();
        assert_eq!(s.label, SentimentLabel::Positive);
    }

    #[test]
    fn three_class_neutral_is_understood() {
        let s = parse_response(
            r#"[{"label":"neutral","score":0.6},{"label":"negative","score":0.3}]"#,
        )
        .unwrap();
        assert_eq!(s.label, SentimentLabel::Neutral);
    }

    #[test]
    fn bad_bodies_are_malformed() {
        for body in ["{}", "[]", r#"[{"label":"MIXED","score":0.5}]"#] {
            assert!(
                matches!(parse_response(body), Err(SignalError::Malformed(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn unreachable_service_is_unavailable() {
        // Port 9 (discard) on localhost is not expected to run an HTTP server.
        let model =
            HttpSentimentModel::new("http://127.0.0.1:9/classify", Duration::from_millis(500))
                .unwrap();
        let err = model.classify("Damp in the cellar").unwrap_err();
        assert!(err.disables_signal(), "{err}");
    }
}
