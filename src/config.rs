use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    analysis::ela::DEFAULT_ELA_QUALITY,
    error::{DetectorError, Result},
    judge::gemini::{DEFAULT_API_KEY_VAR, DEFAULT_ENDPOINT, DEFAULT_MODEL},
    verdict::DEFAULT_CONFIDENCE_THRESHOLD,
};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub model_dir: PathBuf,
    pub confidence_threshold: f64,
    pub ela_quality: u8,
    pub judge_model: String,
    pub judge_endpoint: String,
    /// Name of the environment variable holding the judge API key.
    pub judge_api_key_var: String,
    pub judge_timeout: Option<Duration>,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            model_dir: PathBuf::from("models/ai-image-detector"),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            ela_quality: DEFAULT_ELA_QUALITY,
            judge_model: DEFAULT_MODEL.to_string(),
            judge_endpoint: DEFAULT_ENDPOINT.to_string(),
            judge_api_key_var: DEFAULT_API_KEY_VAR.to_string(),
            judge_timeout: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port)?,
            model_dir: lookup("MODEL_DIR").map(PathBuf::from).unwrap_or(defaults.model_dir),
            confidence_threshold: parse_or(&lookup, "CONFIDENCE_THRESHOLD", defaults.confidence_threshold)?,
            ela_quality: parse_or(&lookup, "ELA_QUALITY", defaults.ela_quality)?,
            judge_model: lookup("JUDGE_MODEL").unwrap_or(defaults.judge_model),
            judge_endpoint: lookup("JUDGE_ENDPOINT").unwrap_or(defaults.judge_endpoint),
            judge_api_key_var: lookup("JUDGE_API_KEY_VAR").unwrap_or(defaults.judge_api_key_var),
            judge_timeout: match lookup("JUDGE_TIMEOUT_SECS") {
                Some(raw) => Some(Duration::from_secs(parse_value("JUDGE_TIMEOUT_SECS", &raw)?)),
                None => None,
            },
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DetectorError::Config(format!(
                "CONFIDENCE_THRESHOLD must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(1..=100).contains(&self.ela_quality) {
            return Err(DetectorError::Config(format!(
                "ELA_QUALITY must be within 1..=100, got {}",
                self.ela_quality
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(DetectorError::Config("MAX_UPLOAD_BYTES must be positive".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| DetectorError::Config(format!("{} has an invalid value: {:?}", key, raw)))
}
