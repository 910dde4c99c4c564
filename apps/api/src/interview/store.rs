//! Session store — process-wide registry of active interview sessions.
//!
//! Sessions live in a concurrent map keyed by session id; operations on
//! different sessions never block one another. A session's history is
//! append-only: records are immutable once appended and prior entries keep
//! their relative order.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::evaluator::AnswerEvaluator;
use crate::interview::selector::QuestionPicker;
use crate::knowledge::KnowledgeBase;
use crate::models::knowledge::QuestionItem;
use crate::models::session::{InterviewSession, Level, QaRecord, SessionStatus};

/// Fallback used when a role has no registered feedback template.
const DEFAULT_FEEDBACK_TEMPLATE: &str = "Overall feedback: {assessment}";

struct SessionEntry {
    session: InterviewSession,
    /// Ids handed out by `pick_next_question`, including ones not yet
    /// answered. Guarantees a question is offered at most once per session.
    asked: HashSet<String>,
}

pub struct SessionStore {
    sessions: DashMap<Uuid, SessionEntry>,
    knowledge: Arc<KnowledgeBase>,
    evaluator: Arc<dyn AnswerEvaluator>,
    picker: Arc<dyn QuestionPicker>,
}

impl SessionStore {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        evaluator: Arc<dyn AnswerEvaluator>,
        picker: Arc<dyn QuestionPicker>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            knowledge,
            evaluator,
            picker,
        }
    }

    /// Creates a fresh ACTIVE session with an empty history. Always succeeds.
    pub fn create_session(
        &self,
        role_id: &str,
        level: Level,
        skills: Vec<String>,
    ) -> InterviewSession {
        let session = InterviewSession {
            id: Uuid::new_v4(),
            role_id: role_id.to_string(),
            level,
            skills,
            status: SessionStatus::Active,
            created_at: Utc::now(),
            history: Vec::new(),
        };
        info!(session_id = %session.id, role_id, "Created interview session");
        self.sessions.insert(
            session.id,
            SessionEntry {
                session: session.clone(),
                asked: HashSet::new(),
            },
        );
        session
    }

    pub fn get_session(&self, id: Uuid) -> Option<InterviewSession> {
        self.sessions.get(&id).map(|e| e.session.clone())
    }

    /// Selects an unasked question for the session, uniformly at random among
    /// the remainder. `Ok(None)` means the question pool is exhausted — a
    /// legitimate terminal outcome, not an error.
    pub fn pick_next_question(&self, id: Uuid) -> Result<Option<QuestionItem>, AppError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;

        let remaining: Vec<&QuestionItem> = self
            .knowledge
            .questions(&entry.session.role_id)
            .iter()
            .filter(|q| !entry.asked.contains(&q.id))
            .filter(|q| !entry.session.history.iter().any(|r| r.question_id == q.id))
            .collect();

        if remaining.is_empty() {
            debug!(session_id = %id, "Question pool exhausted");
            return Ok(None);
        }

        let selected = remaining[self.picker.pick(remaining.len())].clone();
        entry.asked.insert(selected.id.clone());
        debug!(session_id = %id, question_id = %selected.id, "Picked next question");
        Ok(Some(selected))
    }

    /// Scores an answer and appends the record to the session's history.
    /// Rejects a question id that already appears in the history.
    pub fn record_answer(
        &self,
        id: Uuid,
        question_id: &str,
        question_text: &str,
        answer_text: &str,
    ) -> Result<QaRecord, AppError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;

        if entry
            .session
            .history
            .iter()
            .any(|r| r.question_id == question_id)
        {
            return Err(AppError::Validation(format!(
                "Question {question_id} was already answered in this session"
            )));
        }

        // The rubric is keyed on the question's first skill tag; answers to
        // questions outside the knowledge base fall back to "general".
        let skill = self
            .knowledge
            .questions(&entry.session.role_id)
            .iter()
            .find(|q| q.id == question_id)
            .map(|q| q.primary_skill().to_string())
            .unwrap_or_else(|| "general".to_string());
        let rubric = self.knowledge.rubric(&entry.session.role_id, &skill);

        let evaluation = self.evaluator.evaluate(answer_text, rubric);
        let record = QaRecord {
            question_id: question_id.to_string(),
            question_text: question_text.to_string(),
            answer_text: answer_text.to_string(),
            rubric_level: evaluation.level,
            eval_comment: evaluation.comment,
        };

        entry.session.history.push(record.clone());
        info!(
            session_id = %id,
            question_id,
            level = record.rubric_level.as_str(),
            "Recorded answer"
        );
        Ok(record)
    }

    /// Renders the session's history through the role's feedback template.
    pub fn build_feedback(&self, id: Uuid) -> Result<String, AppError> {
        let entry = self
            .sessions
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;

        let template = self
            .knowledge
            .feedback_template(&entry.session.role_id)
            .unwrap_or(DEFAULT_FEEDBACK_TEMPLATE);

        let mut assessment = String::new();
        for record in &entry.session.history {
            assessment.push_str("- Q: ");
            assessment.push_str(&record.question_text);
            assessment.push_str(" | Eval: ");
            assessment.push_str(record.rubric_level.as_str());
            assessment.push('\n');
        }

        Ok(template
            .replace("{assessment}", &assessment)
            .replace("{skill}", "overall")
            .replace("{next_steps}", "Focus on weaker areas identified above."))
    }
}
