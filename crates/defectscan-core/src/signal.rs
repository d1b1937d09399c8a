//! Secondary signal strategies
//!
//! A secondary signal corroborates or disputes rule-based matches. It never
//! invents a category on its own: the sentiment strategy only reports the
//! category the pattern rules already assigned to the unit (`primary`).
//!
//! Two strategies:
//! - [`DisabledSignal`]: rule-based only
//! - [`SentimentSignal`]: wraps a [`SentimentModel`] with a per-call timeout;
//!   negative sentiment is read as "problem detected"
//!
//! The sentiment call runs on its own thread and the caller waits at most
//! the timeout. An overrunning call is abandoned; its thread finishes in the
//! background and the late answer is dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::MAX_CONFIDENCE;
use crate::segment::TextUnit;

/// A category guess from the secondary signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalVerdict {
    pub category: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalError {
    /// The backing classifier could not be reached or failed to initialise.
    #[error("secondary signal unavailable: {0}")]
    Unavailable(String),
    #[error("secondary signal timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u128, limit_ms: u128 },
    /// The classifier answered, but with something unusable.
    #[error("malformed secondary signal response: {0}")]
    Malformed(String),
}

impl SignalError {
    /// Errors after which the signal is switched off for the rest of the run.
    pub fn disables_signal(&self) -> bool {
        matches!(self, SignalError::Unavailable(_) | SignalError::Timeout { .. })
    }
}

/// Strategy interface for the optional auxiliary classifier
pub trait SecondarySignal: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Assess one unit. `primary` is the first category the pattern rules matched.
    fn assess(
        &self,
        unit: &TextUnit,
        primary: Option<&str>,
    ) -> Result<Option<SignalVerdict>, SignalError>;
}

/// Rule-based only
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSignal;

impl SecondarySignal for DisabledSignal {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn assess(
        &self,
        _unit: &TextUnit,
        _primary: Option<&str>,
    ) -> Result<Option<SignalVerdict>, SignalError> {
        Ok(None)
    }
}

// ============================================================================
// Sentiment-backed signal
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    /// Three-class models only.
    Neutral,
    Negative,
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentLabel::Positive => f.write_str("POSITIVE"),
            SentimentLabel::Neutral => f.write_str("NEUTRAL"),
            SentimentLabel::Negative => f.write_str("NEGATIVE"),
        }
    }
}

/// Output of a binary sentiment classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f64,
}

/// A stateless sentiment classifier (local model or remote service)
pub trait SentimentModel: Send + Sync {
    fn classify(&self, text: &str) -> Result<Sentiment, SignalError>;
}

/// Sentiment used as a "problem detected" proxy
pub struct SentimentSignal<M> {
    model: Arc<M>,
    timeout: Duration,
    /// Multiplier applied to the negative-sentiment score.
    score_scale: f64,
}

impl<M: SentimentModel + 'static> SentimentSignal<M> {
    pub fn new(model: M, timeout: Duration) -> Self {
        Self {
            model: Arc::new(model),
            timeout,
            score_scale: 1.2,
        }
    }

    pub fn with_score_scale(mut self, scale: f64) -> Self {
        self.score_scale = scale;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the model on a worker thread, waiting no longer than the timeout.
    fn classify_bounded(&self, text: &str) -> Result<Sentiment, SignalError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        let (tx, rx) = mpsc::sync_channel(1);

        let started = Instant::now();
        thread::Builder::new()
            .name("sentiment-call".to_string())
            .spawn(move || {
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(model.classify(&text));
            })
            .map_err(|e| SignalError::Unavailable(format!("cannot spawn sentiment call: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(SignalError::Timeout {
                elapsed_ms: started.elapsed().as_millis(),
                limit_ms: self.timeout.as_millis(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(SignalError::Unavailable(
                "sentiment model panicked".to_string(),
            )),
        }
    }
}

impl<M: SentimentModel + 'static> SecondarySignal for SentimentSignal<M> {
    fn name(&self) -> &'static str {
        "sentiment"
    }

    fn assess(
        &self,
        unit: &TextUnit,
        primary: Option<&str>,
    ) -> Result<Option<SignalVerdict>, SignalError> {
        // Without a rule-recognised category there is nothing to corroborate.
        let Some(category) = primary else {
            return Ok(None);
        };

        let sentiment = self.classify_bounded(&unit.text)?;

        if !sentiment.score.is_finite() || !(0.0..=1.0).contains(&sentiment.score) {
            return Err(SignalError::Malformed(format!(
                "sentiment score {} outside [0, 1]",
                sentiment.score
            )));
        }

        match sentiment.label {
            SentimentLabel::Negative => Ok(Some(SignalVerdict {
                category: category.to_string(),
                confidence: (sentiment.score * self.score_scale).min(MAX_CONFIDENCE),
            })),
            SentimentLabel::Positive | SentimentLabel::Neutral => Ok(None),
        }
    }
}
