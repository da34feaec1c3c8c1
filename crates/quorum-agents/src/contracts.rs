//! Structured call contract: one request, one validated JSON object, bounded retry.
//!
//! Every stage of every refinement engine talks to the model through
//! [`StructuredCaller`]. A call either yields a typed payload whose declared
//! required keys are all present, or fails with the last error observed
//! after the retry budget is spent. No default payload is ever substituted.
//!
//! ## Extraction
//!
//! ```text
//! raw reply
//!   → trim
//!   → if it starts with ``` : drop leading fence line (optionally `json`) and trailing fence
//!   → parse as JSON; an object wins
//!   → else parse the first greedy `{ ... }` span (multiline); an object wins
//!   → else MalformedResponse { raw }
//! ```
//!
//! ## Retry
//!
//! Transport, timeout, and malformed-response failures share one budget of
//! `max_attempts`. After failed attempt `n` (when `n < max_attempts`) the
//! caller sleeps `base_delay × n`; the final attempt never sleeps.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use coordination::{JsonObject, Judgment};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{GenerationBackend, GenerationRequest};
use crate::modes::errors::OrchestrationError;
use crate::modes::types::StageSpec;
use crate::prompts::PromptPair;

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```(?:json)?\s*").expect("LEADING_FENCE regex should compile"));

static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("TRAILING_FENCE regex should compile"));

static BRACE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("BRACE_SPAN regex should compile"));

/// Extract exactly one JSON object from a model reply.
///
/// The error embeds the original, untrimmed text.
pub fn extract_json_object(text: &str) -> Result<JsonObject, OrchestrationError> {
    let mut raw = text.trim().to_string();
    if raw.starts_with("```") {
        raw = LEADING_FENCE.replace(&raw, "").into_owned();
        raw = TRAILING_FENCE.replace(&raw, "").into_owned();
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&raw) {
        return Ok(map);
    }

    let Some(span) = BRACE_SPAN.find(&raw) else {
        return Err(OrchestrationError::malformed("no JSON object found", text));
    };
    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(OrchestrationError::malformed(
            "brace-delimited span is not a JSON object",
            text,
        )),
        Err(e) => Err(OrchestrationError::malformed(
            format!("invalid JSON object: {e}"),
            text,
        )),
    }
}

/// Fail with `MalformedResponse` unless every required key is present and non-null.
pub fn require_keys(
    object: &JsonObject,
    required: &[&str],
    raw: &str,
) -> Result<(), OrchestrationError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| object.get(*key).map_or(true, Value::is_null))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(OrchestrationError::malformed(
            format!("missing required keys: {}", missing.join(", ")),
            raw,
        ))
    }
}

// ── Payload contracts ────────────────────────────────────────────────────────

/// A typed stage reply with its declared required keys.
pub trait StagePayload: DeserializeOwned + Send + 'static {
    /// Keys that must be present (and non-null) in the reply object.
    const REQUIRED_KEYS: &'static [&'static str];
}

impl StagePayload for JsonObject {
    const REQUIRED_KEYS: &'static [&'static str] = &[];
}

impl StagePayload for Judgment {
    const REQUIRED_KEYS: &'static [&'static str] = &["overall_judgment", "scores"];
}

/// A typed payload together with the raw object it was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Structured<T> {
    pub value: T,
    pub raw: JsonObject,
}

// ── Retry policy ─────────────────────────────────────────────────────────────

/// Default attempt budget per structured call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default linear back-off unit.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1500);

/// Bounded linear back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Sleep after failed attempt `n` is `base_delay × n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

// ── Caller ───────────────────────────────────────────────────────────────────

/// Issues structured calls against one backend and model.
///
/// Cheap to clone; fan-out tasks each take their own copy.
#[derive(Clone)]
pub struct StructuredCaller {
    backend: Arc<dyn GenerationBackend>,
    model: Arc<str>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl StructuredCaller {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        model: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            model: Arc::from(model),
            timeout,
            retry,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run one stage call and decode its typed payload.
    pub async fn call<T: StagePayload>(
        &self,
        stage: &StageSpec,
        prompt: &PromptPair,
    ) -> Result<Structured<T>, OrchestrationError> {
        self.call_with_keys(stage.name, prompt, stage.temperature, T::REQUIRED_KEYS)
            .await
    }

    /// Run one call with an explicit required-key set.
    ///
    /// Extraction, key validation, and typed decoding all happen inside the
    /// retry loop, so a reply missing a key is retried like any other
    /// malformed reply.
    pub async fn call_with_keys<T: DeserializeOwned>(
        &self,
        stage: &'static str,
        prompt: &PromptPair,
        temperature: f32,
        required: &[&str],
    ) -> Result<Structured<T>, OrchestrationError> {
        let request = GenerationRequest {
            stage,
            model: self.model.to_string(),
            system: prompt.system.clone(),
            user: prompt.user.clone(),
            temperature,
            timeout: self.timeout,
        };
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt::<T>(&request, required).await {
                Ok(structured) => {
                    debug!(stage, attempt, "structured call succeeded");
                    return Ok(structured);
                }
                Err(err) if err.is_retriable() && attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        stage,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "structured call failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(stage, attempt, error = %err, "structured call gave up");
                    return Err(err);
                }
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        request: &GenerationRequest,
        required: &[&str],
    ) -> Result<Structured<T>, OrchestrationError> {
        let text = tokio::time::timeout(request.timeout, self.backend.generate(request))
            .await
            .map_err(|_| OrchestrationError::Timeout(request.timeout))??;

        let object = extract_json_object(&text)?;
        require_keys(&object, required, &text)?;
        let value = serde_json::from_value::<T>(Value::Object(object.clone())).map_err(|e| {
            OrchestrationError::malformed(format!("unexpected payload shape: {e}"), text.as_str())
        })?;
        Ok(Structured { value, raw: object })
    }
}
