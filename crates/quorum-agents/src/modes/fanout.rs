//! Parallel task executor: JoinSet fan-out/fan-in over an agent roster.
//!
//! ```text
//! roster [a, b, c]
//!   → JoinSet::spawn(task(a)), spawn(task(b)), spawn(task(c))   (one permit per agent)
//!   → join_next() until all complete, or the first error
//!   → AgentResults in registry order
//! ```
//!
//! ## Failure policy
//!
//! The first task error aborts every outstanding task, waits for the aborted
//! tasks to wind down, and is returned unchanged. No partial result map is ever produced. There is no retry at
//! this layer; retries live inside the structured call each task makes.

use std::future::Future;
use std::sync::Arc;

use coordination::{Agent, AgentRoster};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::modes::errors::OrchestrationError;
use crate::modes::types::StageSpec;

// ── AgentResults ─────────────────────────────────────────────────────────────

/// One value per agent key, always iterated in registry order.
///
/// Serializes as a JSON object whose keys follow registry order.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResults<T> {
    entries: Vec<(String, T)>,
}

impl<T> AgentResults<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build from `(key, value)` pairs already in registry order.
    pub fn from_entries(entries: Vec<(String, T)>) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Transform every value, keeping keys and order.
    pub fn map<U>(&self, mut f: impl FnMut(&str, &T) -> U) -> AgentResults<U> {
        AgentResults {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), f(k, v)))
                .collect(),
        }
    }
}

impl<T> Default for AgentResults<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AgentResults<T> {
    /// Take the first entry's value, dropping the rest.
    pub fn into_lead(self) -> Option<T> {
        self.entries.into_iter().next().map(|(_, v)| v)
    }
}

impl<T> IntoIterator for AgentResults<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<T: Serialize> Serialize for AgentResults<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ── Executor ─────────────────────────────────────────────────────────────────

/// Run `task` once per agent, concurrently, and wait for all of them.
///
/// `task` is called synchronously for each agent in registry order to build
/// its future, so it may borrow from the caller; the futures themselves are
/// spawned and must be `'static`.
pub async fn run_agent_tasks<T, F, Fut>(
    roster: &AgentRoster,
    task: F,
) -> Result<AgentResults<T>, OrchestrationError>
where
    F: Fn(Agent) -> Fut,
    Fut: Future<Output = Result<T, OrchestrationError>> + Send + 'static,
    T: Send + 'static,
{
    let workers = roster.len();
    let sem = Arc::new(Semaphore::new(workers.max(1)));
    let mut join_set: JoinSet<(usize, Result<T, OrchestrationError>)> = JoinSet::new();

    for (position, agent) in roster.iter().enumerate() {
        let sem = sem.clone();
        let fut = task(agent.clone());
        join_set.spawn(async move {
            let _permit = match sem.acquire().await {
                Ok(permit) => permit,
                Err(e) => return (position, Err(OrchestrationError::TaskAborted(e.to_string()))),
            };
            (position, fut.await)
        });
    }

    let mut slots: Vec<Option<T>> = (0..workers).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        let (position, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                join_set.abort_all();
                warn!(error = %e, "agent task panicked; aborting fan-out");
                drain(&mut join_set).await;
                return Err(OrchestrationError::TaskAborted(e.to_string()));
            }
        };
        let key = roster.agents()[position].key.as_str();
        match result {
            Ok(value) => {
                debug!(agent = key, "agent task complete");
                slots[position] = Some(value);
            }
            Err(err) => {
                join_set.abort_all();
                warn!(agent = key, error = %err, "agent task failed; aborting fan-out");
                drain(&mut join_set).await;
                return Err(err);
            }
        }
    }

    let mut entries = Vec::with_capacity(workers);
    for (agent, slot) in roster.iter().zip(slots) {
        let value = slot.ok_or_else(|| {
            OrchestrationError::TaskAborted(format!("no result for agent {}", agent.key))
        })?;
        entries.push((agent.key.clone(), value));
    }
    Ok(AgentResults::from_entries(entries))
}

/// Run one stage over `roster` the way the stage table says: every agent
/// concurrently when the stage fans out, otherwise only the lead agent,
/// in-line.
pub async fn run_stage<T, F, Fut>(
    stage: &StageSpec,
    roster: &AgentRoster,
    task: F,
) -> Result<AgentResults<T>, OrchestrationError>
where
    F: Fn(Agent) -> Fut,
    Fut: Future<Output = Result<T, OrchestrationError>> + Send + 'static,
    T: Send + 'static,
{
    if stage.fan_out {
        return run_agent_tasks(roster, task).await;
    }
    let lead = roster.agents().first().ok_or_else(|| {
        OrchestrationError::Configuration(format!("stage {} has no agent to run", stage.name))
    })?;
    let value = task(lead.clone()).await?;
    Ok(AgentResults::from_entries(vec![(lead.key.clone(), value)]))
}

/// Wait for aborted tasks to finish unwinding so none outlives the stage.
async fn drain<T: 'static>(join_set: &mut JoinSet<T>) {
    while join_set.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn results_follow_registry_order_not_completion_order() {
        let roster = AgentRoster::debate();
        // First agent finishes last.
        let results = run_agent_tasks(&roster, |agent| async move {
            let delay = match agent.key.as_str() {
                "faithful" => 30,
                "readable" => 10,
                _ => 0,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, OrchestrationError>(format!("{}-done", agent.key))
        })
        .await
        .unwrap();

        let keys: Vec<&str> = results.keys().collect();
        assert_eq!(keys, vec!["faithful", "readable", "modern"]);
        assert_eq!(results.get("faithful").unwrap(), "faithful-done");
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn single_failure_fails_the_stage() {
        let roster = AgentRoster::debate();
        let result: Result<AgentResults<u32>, _> = run_agent_tasks(&roster, |agent| async move {
            if agent.key == "readable" {
                Err(OrchestrationError::Transport("boom".into()))
            } else {
                Ok(1u32)
            }
        })
        .await;

        match result {
            Err(OrchestrationError::Transport(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn failure_waits_for_aborted_siblings() {
        let roster = AgentRoster::debate();
        let dropped = Arc::new(AtomicBool::new(false));
        let result: Result<AgentResults<u32>, _> = run_agent_tasks(&roster, |agent| {
            let guard = (agent.key == "faithful").then(|| DropFlag(dropped.clone()));
            async move {
                if let Some(_guard) = guard {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    return Ok(1);
                }
                if agent.key == "modern" {
                    return Err(OrchestrationError::Transport("down".into()));
                }
                Ok(2)
            }
        })
        .await;

        assert!(result.is_err());
        assert!(dropped.load(Ordering::SeqCst), "slow task still alive after return");
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_aborted() {
        let roster = AgentRoster::sequential();
        let result: Result<AgentResults<u32>, _> = run_agent_tasks(&roster, |agent| async move {
            if agent.key.is_empty() {
                return Ok::<u32, OrchestrationError>(0);
            }
            panic!("worker exploded")
        })
        .await;
        assert!(matches!(result, Err(OrchestrationError::TaskAborted(_))));
    }

    #[tokio::test]
    async fn single_call_stage_runs_only_the_lead_agent() {
        let roster = AgentRoster::debate();
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let results = run_stage(&StageSpec::FINAL_SYNTHESIS, &roster, |agent| {
            calls.lock().unwrap().push(agent.key.clone());
            async move { Ok::<_, OrchestrationError>(agent.key.len()) }
        })
        .await
        .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["faithful".to_string()]);
        assert_eq!(results.into_lead(), Some("faithful".len()));
    }

    #[tokio::test]
    async fn fan_out_stage_runs_every_agent() {
        let roster = AgentRoster::debate();
        let results = run_stage(&StageSpec::DEBATE_ROUND, &roster, |agent| async move {
            Ok::<_, OrchestrationError>(agent.priority)
        })
        .await
        .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn agent_results_serialize_in_insertion_order() {
        let mut results = AgentResults::new();
        results.insert("modern", 3);
        results.insert("faithful", 1);
        results.insert("modern", 4);
        let json = serde_json::to_string(&results).unwrap();
        assert_eq!(json, r#"{"modern":4,"faithful":1}"#);
    }

    #[test]
    fn map_keeps_keys() {
        let results = AgentResults::from_entries(vec![("a".to_string(), 2), ("b".to_string(), 5)]);
        let doubled = results.map(|_, v| v * 2);
        assert_eq!(doubled.get("b"), Some(&10));
    }
}
