//! Runtime settings.
//!
//! Loaded from an optional JSON file, then overridden from the environment:
//! ```json
//! {
//!   "detection": { "delay_threshold_days": 2.0, "anomaly": { "seed": 7 } },
//!   "retrieval": { "top_k": 5 },
//!   "synthesis": { "model": "gemini-2.5-flash", "timeout_secs": 20 }
//! }
//! ```
//! Missing sections and fields take their defaults. The API key is only read
//! from the environment and never serialized.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::detection::DetectionConfig;
use crate::retrieval::RetrievalConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub detection: DetectionConfig,
    pub retrieval: RetrievalConfig,
    pub synthesis: SynthesisConfig,
}

impl Settings {
    /// Loads settings from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Applies overrides from the process environment.
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Blank values are ignored; values that
    /// fail to parse are errors.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GEMINI_API_KEY") {
            self.synthesis.api_key = Some(key);
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.synthesis.model = model;
        }
        if let Some(url) = get("GEMINI_BASE_URL") {
            self.synthesis.base_url = url;
        }
        if let Some(v) = get("LIVEOPS_SYNTH_TIMEOUT_SECS") {
            self.synthesis.timeout_secs = parse("LIVEOPS_SYNTH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("LIVEOPS_DELAY_THRESHOLD_DAYS") {
            self.detection.delay_threshold_days = parse("LIVEOPS_DELAY_THRESHOLD_DAYS", &v)?;
        }
        if let Some(v) = get("LIVEOPS_ANOMALY_SEED") {
            self.detection.anomaly.seed = parse("LIVEOPS_ANOMALY_SEED", &v)?;
        }
        if let Some(v) = get("LIVEOPS_ANOMALY_CONTAMINATION") {
            self.detection.anomaly.contamination = parse("LIVEOPS_ANOMALY_CONTAMINATION", &v)?;
        }
        Ok(self)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} has an invalid value `{value}`"))
}
