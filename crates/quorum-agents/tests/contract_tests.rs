//! Structured-call retry behaviour on virtual time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coordination::Judgment;
use quorum_agents::backend::{GenerationBackend, GenerationRequest};
use quorum_agents::contracts::{RetryPolicy, StructuredCaller};
use quorum_agents::modes::{OrchestrationError, StageSpec};
use quorum_agents::prompts::PromptPair;
use tokio::time::Instant;

use common::{caller, ScriptedBackend};

fn prompt() -> PromptPair {
    PromptPair {
        system: "Output JSON only.".into(),
        user: "Judge this.".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn malformed_reply_exhausts_three_attempts() {
    let backend = ScriptedBackend::new(|_, _| Ok("not json at all".into()));
    let caller = caller(backend.clone(), 3);

    let start = Instant::now();
    let err = caller
        .call::<Judgment>(&StageSpec::SELF_JUDGE, &prompt())
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(backend.count("self_judge"), 3);
    assert!(matches!(err, OrchestrationError::MalformedResponse { .. }));
    assert_eq!(err.raw_response(), Some("not json at all"));
    // 1.5s after attempt 1, 3.0s after attempt 2, nothing after attempt 3.
    assert!(elapsed >= Duration::from_millis(4500), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(4600), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_the_last_error() {
    let backend = ScriptedBackend::new(|_, nth| {
        Err(OrchestrationError::Transport(format!("connection reset #{nth}")))
    });
    let caller = caller(backend.clone(), 4);

    let err = caller
        .call::<Judgment>(&StageSpec::SELF_JUDGE, &prompt())
        .await
        .unwrap_err();

    assert_eq!(backend.count("self_judge"), 4);
    match err {
        OrchestrationError::Transport(msg) => assert_eq!(msg, "connection reset #4"),
        other => panic!("expected Transport, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn missing_required_key_is_retried_then_succeeds() {
    let backend = ScriptedBackend::new(|_, nth| {
        Ok(if nth == 1 {
            r#"{"overall_judgment": "fine"}"#.into()
        } else {
            r#"{"overall_judgment": "fine", "scores": {"faithfulness": 9}}"#.into()
        })
    });
    let caller = caller(backend.clone(), 3);

    let judged = caller
        .call::<Judgment>(&StageSpec::SELF_JUDGE, &prompt())
        .await
        .unwrap();

    assert_eq!(backend.count("self_judge"), 2);
    assert_eq!(judged.value.scores.faithfulness, Some(9.0));
    assert_eq!(judged.raw["overall_judgment"], "fine");
}

#[tokio::test]
async fn configuration_errors_are_not_retried() {
    let backend = ScriptedBackend::new(|_, _| {
        Err(OrchestrationError::Configuration("bad key".into()))
    });
    let caller = caller(backend.clone(), 3);

    let err = caller
        .call::<Judgment>(&StageSpec::SELF_JUDGE, &prompt())
        .await
        .unwrap_err();

    assert_eq!(backend.count("self_judge"), 1);
    assert!(!err.is_retriable());
}

/// Never answers.
struct Silent;

#[async_trait]
impl GenerationBackend for Silent {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, OrchestrationError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn per_call_timeout_is_retried_like_transport() {
    let caller = StructuredCaller::new(
        Arc::new(Silent),
        "test-model",
        Duration::from_secs(2),
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1500),
        },
    );

    let start = Instant::now();
    let err = caller
        .call::<Judgment>(&StageSpec::SELF_JUDGE, &prompt())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Timeout(d) if d == Duration::from_secs(2)));
    // 2s timeout + 1.5s backoff + 2s timeout.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(5500), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(5600), "elapsed {elapsed:?}");
}
