//! Answer evaluation — pluggable, trait-based scorer for submitted answers.
//!
//! Default: `LengthHeuristicEvaluator`, a deliberately naive placeholder that
//! classifies by answer length. Production deployments are expected to swap in
//! an LLM-backed scorer without touching the session engine.
//!
//! `AppState` carries the evaluator as `Arc<dyn AnswerEvaluator>`.

use crate::models::knowledge::RubricItem;
use crate::models::session::RubricLevel;

/// Result of scoring one answer.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub level: RubricLevel,
    pub comment: String,
}

/// The evaluator seam. Implementations must be cheap and non-blocking; the
/// session engine calls this inline while holding a session entry.
pub trait AnswerEvaluator: Send + Sync {
    fn evaluate(&self, answer_text: &str, rubric: Option<&RubricItem>) -> Evaluation;
}

/// Reference evaluator: classifies by answer length in characters.
///
/// length > excellent_threshold → excellent,
/// length > average_threshold   → average,
/// otherwise (including empty)  → poor.
///
/// The thresholds are arbitrary placeholders, kept configurable rather than
/// calibrated. If a rubric carries a phrase for the assessed level, that
/// phrase replaces the default comment.
pub struct LengthHeuristicEvaluator {
    pub excellent_threshold: usize,
    pub average_threshold: usize,
}

impl Default for LengthHeuristicEvaluator {
    fn default() -> Self {
        Self {
            excellent_threshold: 40,
            average_threshold: 15,
        }
    }
}

impl AnswerEvaluator for LengthHeuristicEvaluator {
    fn evaluate(&self, answer_text: &str, rubric: Option<&RubricItem>) -> Evaluation {
        let length = answer_text.chars().count();

        let (level, default_comment) = if length > self.excellent_threshold {
            (RubricLevel::Excellent, "Good depth and completeness.")
        } else if length > self.average_threshold {
            (RubricLevel::Average, "Covers basics; could add more detail.")
        } else {
            (RubricLevel::Poor, "Needs more depth.")
        };

        let comment = rubric
            .and_then(|r| r.levels.get(level.as_str()))
            .cloned()
            .unwrap_or_else(|| default_comment.to_string());

        Evaluation { level, comment }
    }
}
