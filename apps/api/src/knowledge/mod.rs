//! Knowledge base — read-only provider of interview questions, rubrics, and
//! feedback templates keyed by role.
//!
//! Content is embedded at compile time (one JSON document per question set,
//! one for rubrics, one for feedback templates) and parsed once at startup.
//! A document that fails to parse is logged and skipped; the service still
//! starts with whatever loaded cleanly.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{info, warn};

use crate::models::knowledge::{QuestionItem, RubricItem};

const BACKEND_JAVA_MID: &str = include_str!("data/backend_java_mid.json");
const FRONTEND_REACT_MID: &str = include_str!("data/frontend_react_mid.json");
const RUBRICS: &str = include_str!("data/rubrics.json");
const FEEDBACK_TEMPLATES: &str = include_str!("data/feedback_templates.json");

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionSetDoc {
    role_id: String,
    questions: Vec<QuestionItem>,
}

#[derive(Deserialize)]
struct RubricsDoc {
    rubrics: Vec<RubricItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackTemplateDoc {
    role_id: String,
    pattern: String,
}

#[derive(Deserialize)]
struct FeedbackTemplatesDoc {
    templates: Vec<FeedbackTemplateDoc>,
}

/// In-memory knowledge base. Immutable after `load`.
pub struct KnowledgeBase {
    questions_by_role: HashMap<String, Vec<QuestionItem>>,
    rubrics_by_role: HashMap<String, Vec<RubricItem>>,
    feedback_templates_by_role: HashMap<String, String>,
}

impl KnowledgeBase {
    /// Parses all embedded documents. Never fails; bad documents are skipped.
    pub fn load() -> Self {
        let mut kb = KnowledgeBase {
            questions_by_role: HashMap::new(),
            rubrics_by_role: HashMap::new(),
            feedback_templates_by_role: HashMap::new(),
        };

        for (name, doc) in [
            ("backend_java_mid.json", BACKEND_JAVA_MID),
            ("frontend_react_mid.json", FRONTEND_REACT_MID),
        ] {
            match serde_json::from_str::<QuestionSetDoc>(doc) {
                Ok(set) => {
                    info!(
                        role_id = %set.role_id,
                        questions = set.questions.len(),
                        "Loaded question set"
                    );
                    kb.questions_by_role.insert(set.role_id, set.questions);
                }
                Err(e) => warn!("Failed to load questions from {name}: {e}"),
            }
        }

        match serde_json::from_str::<RubricsDoc>(RUBRICS) {
            Ok(doc) => {
                for item in doc.rubrics {
                    kb.rubrics_by_role
                        .entry(item.role_id.clone())
                        .or_default()
                        .push(item);
                }
            }
            Err(e) => warn!("Failed to load rubrics.json: {e}"),
        }

        match serde_json::from_str::<FeedbackTemplatesDoc>(FEEDBACK_TEMPLATES) {
            Ok(doc) => {
                for t in doc.templates {
                    kb.feedback_templates_by_role.insert(t.role_id, t.pattern);
                }
            }
            Err(e) => warn!("Failed to load feedback_templates.json: {e}"),
        }

        kb
    }

    /// All questions registered for a role; empty for unknown roles.
    pub fn questions(&self, role_id: &str) -> &[QuestionItem] {
        self.questions_by_role
            .get(role_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rubric(&self, role_id: &str, skill: &str) -> Option<&RubricItem> {
        self.rubrics_by_role
            .get(role_id)?
            .iter()
            .find(|r| r.skill == skill)
    }

    pub fn feedback_template(&self, role_id: &str) -> Option<&str> {
        self.feedback_templates_by_role
            .get(role_id)
            .map(String::as_str)
    }

    /// Builds a knowledge base holding a single question set, with no rubrics
    /// or templates registered.
    #[cfg(test)]
    pub fn with_questions(role_id: &str, questions: Vec<QuestionItem>) -> Self {
        Self {
            questions_by_role: HashMap::from([(role_id.to_string(), questions)]),
            rubrics_by_role: HashMap::new(),
            feedback_templates_by_role: HashMap::new(),
        }
    }
}
