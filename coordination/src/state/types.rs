//! Core data types for refinement state.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::feedback::FeedbackReport;

/// A JSON object as returned by a generation backend.
pub type JsonObject = Map<String, Value>;

/// Lowest valid score on any axis.
pub const MIN_SCORE: f64 = 1.0;
/// Highest valid score on any axis.
pub const MAX_SCORE: f64 = 10.0;

// ── Axes and scores ──────────────────────────────────────────────────

/// Quality axis every candidate is scored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreAxis {
    Faithfulness,
    Readability,
    Modernity,
}

impl ScoreAxis {
    pub const ALL: [ScoreAxis; 3] = [Self::Faithfulness, Self::Readability, Self::Modernity];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Faithfulness => "faithfulness",
            Self::Readability => "readability",
            Self::Modernity => "modernity",
        }
    }
}

impl std::fmt::Display for ScoreAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a single score, accepting numbers and numeric strings.
///
/// The value is kept as given, so `8.5` stays below a threshold of 9.
/// Anything outside [`MIN_SCORE`]..=[`MAX_SCORE`] or unparseable is `None`.
pub fn score_from_value(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (MIN_SCORE..=MAX_SCORE).contains(&raw).then_some(raw)
}

fn lenient_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(score_from_value(&value))
}

/// Whole scores serialize as integers; fractional ones as given.
fn serialize_score<S>(score: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match score {
        Some(v) if v.fract() == 0.0 => serializer.serialize_u8(*v as u8),
        Some(v) => serializer.serialize_f64(*v),
        None => serializer.serialize_none(),
    }
}

/// Per-axis scores. A missing or invalid axis is `None`, never an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisScores {
    #[serde(default, deserialize_with = "lenient_score", serialize_with = "serialize_score")]
    pub faithfulness: Option<f64>,
    #[serde(default, deserialize_with = "lenient_score", serialize_with = "serialize_score")]
    pub readability: Option<f64>,
    #[serde(default, deserialize_with = "lenient_score", serialize_with = "serialize_score")]
    pub modernity: Option<f64>,
}

impl AxisScores {
    /// Whole-number scores on every axis.
    pub fn new(faithfulness: u8, readability: u8, modernity: u8) -> Self {
        Self {
            faithfulness: Some(f64::from(faithfulness)),
            readability: Some(f64::from(readability)),
            modernity: Some(f64::from(modernity)),
        }
    }

    /// Build from an arbitrary JSON value. Non-objects yield empty scores.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        let axis = |a: ScoreAxis| obj.get(a.as_str()).and_then(score_from_value);
        Self {
            faithfulness: axis(ScoreAxis::Faithfulness),
            readability: axis(ScoreAxis::Readability),
            modernity: axis(ScoreAxis::Modernity),
        }
    }

    pub fn get(&self, axis: ScoreAxis) -> Option<f64> {
        match axis {
            ScoreAxis::Faithfulness => self.faithfulness,
            ScoreAxis::Readability => self.readability,
            ScoreAxis::Modernity => self.modernity,
        }
    }

    pub fn is_empty(&self) -> bool {
        ScoreAxis::ALL.iter().all(|a| self.get(*a).is_none())
    }

    /// `faithfulness=8, readability=n/a, modernity=9`
    pub fn score_line(&self) -> String {
        ScoreAxis::ALL
            .iter()
            .map(|axis| match self.get(*axis) {
                Some(score) => format!("{axis}={score}"),
                None => format!("{axis}=n/a"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Field deserializer for score maps that may be missing, null, or malformed.
pub fn lenient_scores<'de, D>(deserializer: D) -> Result<AxisScores, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(AxisScores::from_value(&value))
}

/// Field deserializer for free text that may arrive as a string or a list.
///
/// Lists are joined with `"; "`. Null becomes the empty string.
pub fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(text_from_value(&value))
}

/// Free text from any JSON value: lists joined with `"; "`, null empty.
pub fn text_from_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(text_from_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

// ── Judgment ─────────────────────────────────────────────────────────

/// Self-assessment of one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    #[serde(
        rename = "overall_judgment",
        alias = "overall_assessment",
        default,
        deserialize_with = "lenient_text"
    )]
    pub overall_assessment: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub strengths: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub issues: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub revision_plan: String,
    #[serde(default, deserialize_with = "lenient_scores")]
    pub scores: AxisScores,
}

impl Judgment {
    /// Assessment, issues, and plan as one lowercased corpus for keyword matching.
    pub fn keyword_corpus(&self) -> String {
        [
            self.overall_assessment.as_str(),
            self.issues.as_str(),
            self.revision_plan.as_str(),
        ]
        .join(" ")
        .to_lowercase()
    }
}

// ── Iteration log ────────────────────────────────────────────────────

/// One candidate produced during refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 0 for initial generation, 1.. for refinement iterations.
    pub iteration: u32,
    /// Candidate text.
    pub text: String,
    /// Full structured reply from the stage that produced the text.
    pub payload: JsonObject,
    /// Judgment attached by a self-judge stage, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judgment: Option<Judgment>,
    /// Deterministic feedback computed on the text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedback: Vec<FeedbackReport>,
}

impl IterationRecord {
    pub fn new(iteration: u32, text: impl Into<String>, payload: JsonObject) -> Self {
        Self {
            iteration,
            text: text.into(),
            payload,
            judgment: None,
            feedback: Vec::new(),
        }
    }

    pub fn with_judgment(mut self, judgment: Judgment) -> Self {
        self.judgment = Some(judgment);
        self
    }

    pub fn with_feedback(mut self, feedback: Vec<FeedbackReport>) -> Self {
        self.feedback = feedback;
        self
    }

    /// Self-reported scores from the producing stage's payload.
    pub fn self_scores(&self) -> AxisScores {
        self.payload
            .get("self_scores")
            .map(AxisScores::from_value)
            .unwrap_or_default()
    }
}

/// Errors raised when appending to an [`IterationLog`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("iteration {got} appended after iteration {last}")]
    NonMonotonic { last: u32, got: u32 },
}

/// Append-only, strictly increasing sequence of iteration records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IterationLog {
    records: Vec<IterationRecord>,
}

/// A selection index after validation against the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSelection {
    /// 1-based position in the log.
    pub position: usize,
    /// True when the requested value was unusable and the last record was chosen.
    pub fell_back: bool,
}

impl IterationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: IterationRecord) -> Result<(), LogError> {
        if let Some(last) = self.records.last() {
            if record.iteration <= last.iteration {
                return Err(LogError::NonMonotonic {
                    last: last.iteration,
                    got: record.iteration,
                });
            }
        }
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IterationRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }

    /// Record at a 1-based position.
    pub fn at_position(&self, position: usize) -> Option<&IterationRecord> {
        position.checked_sub(1).and_then(|i| self.records.get(i))
    }

    /// Validate a model-supplied selection against the log.
    ///
    /// Accepts integers, integral floats, and integer strings in `1..=len`.
    /// Anything else falls back to the last record. Returns `None` only
    /// when the log is empty.
    pub fn resolve_selection(&self, requested: Option<&Value>) -> Option<ResolvedSelection> {
        let len = self.records.len();
        if len == 0 {
            return None;
        }
        let parsed = requested.and_then(|value| match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        });
        match parsed {
            Some(idx) if idx >= 1 && (idx as usize) <= len => Some(ResolvedSelection {
                position: idx as usize,
                fell_back: false,
            }),
            _ => Some(ResolvedSelection {
                position: len,
                fell_back: true,
            }),
        }
    }
}

impl<'a> IntoIterator for &'a IterationLog {
    type Item = &'a IterationRecord;
    type IntoIter = std::slice::Iter<'a, IterationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// ── Selection ────────────────────────────────────────────────────────

/// Outcome of choosing one candidate from an iteration log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// 1-based iteration that was chosen.
    pub selected_iteration: usize,
    /// Final text after selection (and polish, if any).
    pub final_text: String,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub scores: AxisScores,
    /// Set when the requested index was invalid and the last record was used.
    #[serde(default)]
    pub index_fallback: bool,
}
