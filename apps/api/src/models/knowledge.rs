use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A question from the knowledge base. Read-only once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionItem {
    pub id: String,
    pub text: String,
    /// Question category, e.g. "core", "system-design". Serialized as `type`
    /// for compatibility with the knowledge-base document format.
    #[serde(rename = "type")]
    pub category: String,
    pub difficulty: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

impl QuestionItem {
    /// The skill a rubric lookup is keyed on: the first associated skill tag,
    /// or "general" when the question carries none.
    pub fn primary_skill(&self) -> &str {
        self.skills.first().map(String::as_str).unwrap_or("general")
    }
}

/// Per-skill mapping from assessed level to feedback phrasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricItem {
    pub role_id: String,
    pub skill: String,
    /// Level key ("excellent" | "average" | "poor") to feedback phrase.
    pub levels: HashMap<String, String>,
}
