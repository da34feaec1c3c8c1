//! Scripted in-process backend shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quorum_agents::backend::{GenerationBackend, GenerationRequest};
use quorum_agents::contracts::{RetryPolicy, StructuredCaller};
use quorum_agents::modes::OrchestrationError;

type Script = dyn Fn(&GenerationRequest, usize) -> Result<String, OrchestrationError> + Send + Sync;

/// One recorded backend call.
#[derive(Debug, Clone)]
pub struct Call {
    pub stage: &'static str,
    pub user: String,
    pub temperature: f32,
}

/// Replies through a closure given the request and the 1-based call number
/// for that stage.
pub struct ScriptedBackend {
    script: Box<Script>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&GenerationRequest, usize) -> Result<String, OrchestrationError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, stage: &str) -> usize {
        self.calls().iter().filter(|c| c.stage == stage).count()
    }

    pub fn prompts_for(&self, stage: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.stage == stage)
            .map(|c| c.user)
            .collect()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, OrchestrationError> {
        let nth = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                stage: request.stage,
                user: request.user.clone(),
                temperature: request.temperature,
            });
            calls.iter().filter(|c| c.stage == request.stage).count()
        };
        (self.script)(request, nth)
    }
}

pub fn caller(backend: Arc<ScriptedBackend>, max_attempts: u32) -> StructuredCaller {
    StructuredCaller::new(
        backend,
        "test-model",
        Duration::from_secs(30),
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1500),
        },
    )
}

/// Agent key named in a debate prompt's priority line.
pub fn agent_of(request: &GenerationRequest) -> &'static str {
    if request.user.contains("priority is: faithfulness") || request.user.contains("priority: faithfulness") {
        "faithful"
    } else if request.user.contains("priority is: readability") || request.user.contains("priority: readability") {
        "readable"
    } else {
        "modern"
    }
}
