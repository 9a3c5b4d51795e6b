use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.80;
pub const JUDGE_CONFIDENCE: f64 = 1.0;
pub const VERDICT_FIELD: &str = "final_verdict";

const PROBABILITY_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Authentic,
    Artificial,
}

impl Label {
    /// Wording used by the classifier endpoint.
    pub fn display_name(&self) -> &'static str {
        match self {
            Label::Authentic => "Real",
            Label::Artificial => "AI Generated",
        }
    }

    /// Wording used by the judge endpoints.
    pub fn short_name(&self) -> &'static str {
        match self {
            Label::Authentic => "real",
            Label::Artificial => "artificial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    Classifier,
    Judge,
    /// The judge answer was not usable and the safe default was applied.
    JudgeFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub label: Label,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub source: VerdictSource,
}

impl Verdict {
    pub fn is_fallback(&self) -> bool {
        self.source == VerdictSource::JudgeFallback
    }

    pub fn confidence_percent(&self) -> f64 {
        self.confidence * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityPair {
    pub real: f64,
    pub artificial: f64,
}

impl ProbabilityPair {
    pub fn new(real: f64, artificial: f64) -> Result<Self> {
        let in_range = |p: f64| p.is_finite() && (0.0..=1.0).contains(&p);
        if !in_range(real) || !in_range(artificial) {
            return Err(DetectorError::Inference(format!(
                "probabilities out of range: real={}, artificial={}",
                real, artificial
            )));
        }
        if ((real + artificial) - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(DetectorError::Inference(format!(
                "probabilities do not sum to 1: real={}, artificial={}",
                real, artificial
            )));
        }

        Ok(Self { real, artificial })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    threshold: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ThresholdPolicy {
    pub fn new(threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DetectorError::Config(format!(
                "confidence threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn decide(&self, probabilities: ProbabilityPair) -> Verdict {
        if probabilities.real >= self.threshold {
            Verdict {
                label: Label::Authentic,
                confidence: probabilities.real,
                source: VerdictSource::Classifier,
            }
        } else {
            Verdict {
                label: Label::Artificial,
                confidence: probabilities.artificial,
                source: VerdictSource::Classifier,
            }
        }
    }
}

/// What the external judge said, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Judgment {
    Real,
    Fake,
    /// Parsed, but the verdict field held something else.
    Unrecognized(String),
    Malformed(String),
}

pub fn parse_judgment(text: &str) -> Judgment {
    let cleaned = strip_code_fences(text);

    let value = match serde_json::from_str::<serde_json::Value>(&cleaned) {
        Ok(value) => value,
        Err(e) => return Judgment::Malformed(format!("response is not JSON: {}", e)),
    };

    match value.get(VERDICT_FIELD) {
        Some(serde_json::Value::String(verdict)) => match verdict.to_uppercase().as_str() {
            "REAL" => Judgment::Real,
            "FAKE" => Judgment::Fake,
            other => Judgment::Unrecognized(other.to_string()),
        },
        Some(other) => Judgment::Malformed(format!("{} is not a string: {}", VERDICT_FIELD, other)),
        None => Judgment::Malformed(format!("missing {} field", VERDICT_FIELD)),
    }
}

pub fn normalize_judgment(judgment: &Judgment) -> Verdict {
    match judgment {
        Judgment::Real => Verdict {
            label: Label::Authentic,
            confidence: JUDGE_CONFIDENCE,
            source: VerdictSource::Judge,
        },
        Judgment::Fake => Verdict {
            label: Label::Artificial,
            confidence: JUDGE_CONFIDENCE,
            source: VerdictSource::Judge,
        },
        Judgment::Unrecognized(value) => {
            warn!("Judge returned unrecognized verdict {:?}, defaulting to artificial", value);
            fallback()
        }
        Judgment::Malformed(reason) => {
            warn!("Judge response unusable ({}), defaulting to artificial", reason);
            fallback()
        }
    }
}

fn fallback() -> Verdict {
    Verdict {
        label: Label::Artificial,
        confidence: JUDGE_CONFIDENCE,
        source: VerdictSource::JudgeFallback,
    }
}

fn strip_code_fences(text: &str) -> String {
    text.trim()
        .replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}
