//! Flesch–Kincaid grade level and reading ease.
//!
//! Uses a heuristic English syllable counter; good enough to tell a
//! stiff draft from a plain one, not a linguistic tool.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{FeedbackProbe, FeedbackReport};

static SENTENCE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[.!?]+").expect("SENTENCE_BOUNDARY regex should compile")
});

static WORD_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z'’]+").expect("WORD_TOKEN regex should compile"));

const MECHANISM: &str = "grade_level";
const MIN_WORDS: usize = 3;

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y')
}

/// Heuristic syllable count: vowel groups, minus a trailing silent `e`.
pub fn count_syllables(word: &str) -> usize {
    let mut chars: Vec<char> = word.trim().to_lowercase().chars().collect();
    if chars.is_empty() {
        return 0;
    }
    let n = chars.len();
    if n > 2 && chars[n - 1] == 'e' && !is_vowel(chars[n - 2]) {
        chars.pop();
    }
    let mut count = 0;
    let mut prev_vowel = false;
    for c in chars {
        let vowel = is_vowel(c);
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }
    count.max(1)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Flesch–Kincaid readability probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradeLevelProbe;

impl FeedbackProbe for GradeLevelProbe {
    fn mechanism(&self) -> &'static str {
        MECHANISM
    }

    fn probe(&self, text: &str, _reference: Option<&str>) -> FeedbackReport {
        let text = text.trim();
        if text.is_empty() {
            return FeedbackReport::unavailable(MECHANISM, "empty_text");
        }

        let words: Vec<&str> = WORD_TOKEN.find_iter(text).map(|m| m.as_str()).collect();
        if words.len() < MIN_WORDS {
            return FeedbackReport::unavailable(MECHANISM, "too_few_words");
        }
        let sentences = SENTENCE_BOUNDARY
            .split(text)
            .filter(|s| !s.trim().is_empty())
            .count()
            .max(1);

        let word_count = words.len() as f64;
        let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();
        let wps = word_count / sentences as f64;
        let spw = syllables as f64 / word_count;

        let grade = 0.39 * wps + 11.8 * spw - 15.59;
        let ease = 206.835 - 1.015 * wps - 84.6 * spw;

        let mut metrics = BTreeMap::new();
        metrics.insert("word_count".to_string(), word_count);
        metrics.insert("sentence_count".to_string(), sentences as f64);
        metrics.insert("syllable_count".to_string(), syllables as f64);
        metrics.insert("avg_words_per_sentence".to_string(), round2(wps));
        metrics.insert("avg_syllables_per_word".to_string(), round2(spw));
        metrics.insert("flesch_kincaid_grade".to_string(), round2(grade));
        metrics.insert("flesch_reading_ease".to_string(), round2(ease));
        FeedbackReport::available(MECHANISM, metrics)
    }

    fn format_for_prompt(&self, report: &FeedbackReport) -> String {
        if !report.available {
            return format!(
                "Grade-level readability unavailable ({}).",
                report.reason.as_deref().unwrap_or("unavailable")
            );
        }
        let fmt = |name: &str| {
            report
                .metric(name)
                .map(|v| format!("{v:.1}"))
                .unwrap_or_else(|| "n/a".to_string())
        };
        format!(
            "Readability: Flesch-Kincaid grade={}, reading_ease={}, avg_words_per_sentence={}. \
             Lower grade = easier reading. Reading ease >60 is plain English.",
            fmt("flesch_kincaid_grade"),
            fmt("flesch_reading_ease"),
            fmt("avg_words_per_sentence"),
        )
    }
}
