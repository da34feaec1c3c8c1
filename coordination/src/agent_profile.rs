//! Agent registry: the fixed roster of refinement roles.
//!
//! Agents are defined once at process start and shared read-only by every
//! unit of work in a run. Registry order is the tie-break for display and
//! aggregation; completion order never is.
//!
//! # Rosters
//!
//! - **Debate**: three agents, one per scoring axis (faithful, readable, modern)
//! - **Sequential**: one synthetic agent with a balanced priority

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ScoreAxis;

/// Optimization axis an agent privileges when several agents are in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Stay close to the source meaning and structure.
    Faithfulness,
    /// Favor flow and ease of reading.
    Readability,
    /// Favor contemporary wording over archaic phrasing.
    Modernity,
    /// No single axis; used by the single-agent pipeline.
    Balanced,
}

impl Priority {
    /// The scoring axis this priority maps to, if any.
    pub fn axis(self) -> Option<ScoreAxis> {
        match self {
            Self::Faithfulness => Some(ScoreAxis::Faithfulness),
            Self::Readability => Some(ScoreAxis::Readability),
            Self::Modernity => Some(ScoreAxis::Modernity),
            Self::Balanced => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Faithfulness => write!(f, "faithfulness"),
            Self::Readability => write!(f, "readability"),
            Self::Modernity => write!(f, "modernity"),
            Self::Balanced => write!(f, "balanced"),
        }
    }
}

/// A named role that produces and critiques candidate text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identity used in maps and logs.
    pub key: String,
    /// Human-readable name.
    #[serde(rename = "name")]
    pub display_name: String,
    /// Axis this agent privileges.
    pub priority: Priority,
}

impl Agent {
    pub fn new(key: &str, display_name: &str, priority: Priority) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            priority,
        }
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.key, self.priority)
    }
}

/// Errors raised while building a roster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("agent roster must contain at least one agent")]
    Empty,

    #[error("duplicate agent key: {0}")]
    DuplicateKey(String),
}

/// Ordered, immutable list of participating agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentRoster {
    agents: Vec<Agent>,
}

impl AgentRoster {
    /// Build a roster, rejecting empty lists and duplicate keys.
    pub fn new(agents: Vec<Agent>) -> Result<Self, RosterError> {
        if agents.is_empty() {
            return Err(RosterError::Empty);
        }
        for (idx, agent) in agents.iter().enumerate() {
            if agents[..idx].iter().any(|a| a.key == agent.key) {
                return Err(RosterError::DuplicateKey(agent.key.clone()));
            }
        }
        Ok(Self { agents })
    }

    /// The three-agent debate quorum.
    pub fn debate() -> Self {
        Self {
            agents: vec![
                Agent::new("faithful", "Faithfulness-First", Priority::Faithfulness),
                Agent::new("readable", "Readability-First", Priority::Readability),
                Agent::new("modern", "Modernity-First", Priority::Modernity),
            ],
        }
    }

    /// The single synthetic agent used by the sequential pipeline.
    pub fn sequential() -> Self {
        Self {
            agents: vec![Agent::new(
                "sequential",
                "Sequential Translator",
                Priority::Balanced,
            )],
        }
    }

    /// The single agent of the phrase-level cognitive loop.
    pub fn cognitive_user() -> Self {
        Self {
            agents: vec![Agent::new(
                "cognitive_user",
                "User Cognitive Loop Translator",
                Priority::Balanced,
            )],
        }
    }

    /// The single agent of the meaning/wording dual-loop.
    pub fn cognitive_dualloop() -> Self {
        Self {
            agents: vec![Agent::new(
                "cognitive_dualloop",
                "Dual-Loop Cognitive Translator",
                Priority::Balanced,
            )],
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Agent> {
        self.agents.iter()
    }

    /// Look up an agent by key.
    pub fn get(&self, key: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.key == key)
    }

    /// Registry position of an agent key.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.agents.iter().position(|a| a.key == key)
    }

    /// Agent keys in registry order.
    pub fn keys(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.key.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a AgentRoster {
    type Item = &'a Agent;
    type IntoIter = std::slice::Iter<'a, Agent>;

    fn into_iter(self) -> Self::IntoIter {
        self.agents.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debate_roster_order() {
        let roster = AgentRoster::debate();
        assert_eq!(roster.keys(), vec!["faithful", "readable", "modern"]);
        assert_eq!(roster.position("modern"), Some(2));
    }

    #[test]
    fn test_debate_priorities_are_distinct() {
        let roster = AgentRoster::debate();
        let axes: Vec<_> = roster.iter().filter_map(|a| a.priority.axis()).collect();
        assert_eq!(axes.len(), 3);
        assert_ne!(axes[0], axes[1]);
        assert_ne!(axes[1], axes[2]);
        assert_ne!(axes[0], axes[2]);
    }

    #[test]
    fn test_sequential_roster_is_single_balanced_agent() {
        let roster = AgentRoster::sequential();
        assert_eq!(roster.len(), 1);
        let agent = roster.get("sequential").unwrap();
        assert_eq!(agent.priority, Priority::Balanced);
        assert_eq!(agent.priority.axis(), None);
    }

    #[test]
    fn test_cognitive_rosters_use_pipeline_keys() {
        assert_eq!(AgentRoster::cognitive_user().keys(), vec!["cognitive_user"]);
        let dual = AgentRoster::cognitive_dualloop();
        assert_eq!(dual.keys(), vec!["cognitive_dualloop"]);
        assert_eq!(dual.agents()[0].display_name, "Dual-Loop Cognitive Translator");
    }

    #[test]
    fn test_empty_roster_rejected() {
        assert_eq!(AgentRoster::new(vec![]).unwrap_err(), RosterError::Empty);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err = AgentRoster::new(vec![
            Agent::new("a", "A", Priority::Faithfulness),
            Agent::new("a", "A again", Priority::Modernity),
        ])
        .unwrap_err();
        assert_eq!(err, RosterError::DuplicateKey("a".to_string()));
    }

    #[test]
    fn test_agent_serializes_with_name_field() {
        let agent = Agent::new("faithful", "Faithfulness-First", Priority::Faithfulness);
        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(json["key"], "faithful");
        assert_eq!(json["name"], "Faithfulness-First");
        assert_eq!(json["priority"], "faithfulness");
    }

    #[test]
    fn test_priority_display() {
        assert_eq!(Priority::Faithfulness.to_string(), "faithfulness");
        assert_eq!(Priority::Balanced.to_string(), "balanced");
    }
}
