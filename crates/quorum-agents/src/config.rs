//! Backend and run configuration loaded from a TOML file with an environment
//! overlay, plus the checks that run before any stage is called.

use anyhow::{Context, Result};
use coordination::PipelineKind;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::OpenAiCompatibleBackend;
use crate::contracts::{RetryPolicy, StructuredCaller, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
use crate::modes::errors::OrchestrationError;
use crate::modes::types::StageSpec;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "x-ai/grok-4.1-fast";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_DEBATE_ITERATIONS: u32 = 2;
pub const DEFAULT_SEQUENTIAL_ITERATIONS: u32 = 3;

/// Backend and run settings.
///
/// Precedence is CLI flag > environment > TOML file > built-in default.
/// The CLI applies its own overrides after [`QuorumConfig::load`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    /// OpenAI-compatible API root, without `/chat/completions`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout_secs: u64,
    /// Attempts per structured call, including the first.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub debate_iterations: u32,
    /// Default for the sequential and both cognitive pipelines.
    pub sequential_iterations: u32,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            debate_iterations: DEFAULT_DEBATE_ITERATIONS,
            sequential_iterations: DEFAULT_SEQUENTIAL_ITERATIONS,
        }
    }
}

impl QuorumConfig {
    /// Defaults, overlaid by `path` when given, then by the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml_str(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(base.apply_env(|key| std::env::var(key).ok()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid TOML")
    }

    /// Overlay environment values read through `lookup`.
    ///
    /// `OPENROUTER_API_KEY` wins over `OPENAI_API_KEY`. Empty values are ignored.
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get("QUORUM_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = get("QUORUM_MODEL") {
            self.model = model;
        }
        if let Some(key) = get("OPENROUTER_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        self
    }

    pub fn default_iterations(&self, kind: PipelineKind) -> u32 {
        match kind {
            PipelineKind::Debate => self.debate_iterations,
            PipelineKind::Sequential
            | PipelineKind::CognitiveUser
            | PipelineKind::CognitiveDualloop => self.sequential_iterations,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// Fail fast before any stage runs.
    pub fn validate(&self, iterations: u32) -> Result<(), OrchestrationError> {
        if iterations < 1 {
            return Err(OrchestrationError::Configuration(format!(
                "iterations must be >= 1 (got {iterations})"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(OrchestrationError::Configuration("model id is empty".into()));
        }
        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(OrchestrationError::Configuration(
                "missing API key: set OPENROUTER_API_KEY or OPENAI_API_KEY".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(OrchestrationError::Configuration(
                "max_retries must be >= 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(OrchestrationError::Configuration(
                "request_timeout_secs must be >= 1".into(),
            ));
        }
        for stage in StageSpec::ALL {
            if !(0.0..=2.0).contains(&stage.temperature) {
                return Err(OrchestrationError::Configuration(format!(
                    "stage {} temperature {} outside [0, 2]",
                    stage.name, stage.temperature
                )));
            }
        }
        Ok(())
    }

    /// Structured caller over the HTTP backend described by this config.
    pub fn caller(&self) -> Result<StructuredCaller, OrchestrationError> {
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let backend = OpenAiCompatibleBackend::new(&self.base_url, api_key)?;
        Ok(StructuredCaller::new(
            Arc::new(backend),
            &self.model,
            self.request_timeout(),
            self.retry_policy(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = QuorumConfig::default();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_policy().delay_after(2), Duration::from_millis(3000));
        assert_eq!(cfg.default_iterations(PipelineKind::Debate), 2);
        assert_eq!(cfg.default_iterations(PipelineKind::Sequential), 3);
        assert_eq!(cfg.default_iterations(PipelineKind::CognitiveDualloop), 3);
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let cfg = QuorumConfig::from_toml_str(
            r#"
model = "local/llama"
request_timeout_secs = 30
"#,
        )
        .unwrap();
        assert_eq!(cfg.model, "local/llama");
        assert_eq!(cfg.request_timeout_secs, 30);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn env_beats_file_and_openrouter_key_wins() {
        let cfg = QuorumConfig::from_toml_str("model = \"from-file\"")
            .unwrap()
            .apply_env(env(&[
                ("QUORUM_MODEL", "from-env"),
                ("OPENAI_API_KEY", "openai"),
                ("OPENROUTER_API_KEY", "router"),
            ]));
        assert_eq!(cfg.model, "from-env");
        assert_eq!(cfg.api_key.as_deref(), Some("router"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let cfg = QuorumConfig::default().apply_env(env(&[("QUORUM_MODEL", "  ")]));
        assert_eq!(cfg.model, DEFAULT_MODEL);
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let ok = QuorumConfig {
            api_key: Some("k".into()),
            ..Default::default()
        };
        assert!(ok.validate(1).is_ok());
        assert!(ok.validate(0).is_err());

        let no_key = QuorumConfig::default();
        let err = no_key.validate(1).unwrap_err();
        assert!(err.to_string().contains("missing API key"));

        let no_retries = QuorumConfig {
            max_retries: 0,
            ..ok.clone()
        };
        assert!(no_retries.validate(1).is_err());
    }

    #[test]
    fn unknown_toml_type_is_an_error() {
        assert!(QuorumConfig::from_toml_str("max_retries = \"three\"").is_err());
    }
}
