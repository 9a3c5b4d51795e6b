use serde::{Deserialize, Serialize};

use crate::{
    resource::{LoadState, ResourceManager},
    verdict::Verdict,
};

/// `/api/detect` success body.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ClassifierReport {
    pub prediction: String,
    /// Percentage with two decimals, e.g. `"92.34%"`.
    pub confidence: String,
}

impl From<&Verdict> for ClassifierReport {
    fn from(verdict: &Verdict) -> Self {
        Self {
            prediction: verdict.label.display_name().to_string(),
            confidence: format!("{:.2}%", verdict.confidence_percent()),
        }
    }
}

/// `/api/analyze` and `/api/audit` success body.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ForensicReport {
    pub success: bool,
    pub prediction: ForensicPrediction,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ForensicPrediction {
    pub label: String,
    pub score: f64,
    /// Present when the judge answer was unusable and the default label was applied.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inconclusive: bool,
}

impl From<&Verdict> for ForensicReport {
    fn from(verdict: &Verdict) -> Self {
        Self {
            success: true,
            prediction: ForensicPrediction {
                label: verdict.label.short_name().to_string(),
                score: verdict.confidence_percent(),
                inconclusive: verdict.is_fallback(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DetailError {
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeError {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<ResourceHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge: Option<ResourceHealth>,
}

/// Lifecycle snapshot of one managed resource.
#[derive(Debug, Serialize, PartialEq)]
pub struct ResourceHealth {
    pub name: String,
    pub state: LoadState,
    pub load_attempts: usize,
    pub load_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl<R: Send + Sync> From<&ResourceManager<R>> for ResourceHealth {
    fn from(manager: &ResourceManager<R>) -> Self {
        Self {
            name: manager.name().to_string(),
            state: manager.state(),
            load_attempts: manager.load_attempts(),
            load_failures: manager.load_failures(),
            last_error: manager.last_error(),
        }
    }
}

impl HealthReport {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            classifier: None,
            judge: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyReport {
    pub data_uri: String,
}
