use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::knowledge::QuestionItem;
use crate::models::session::{InterviewSession, Level, QaRecord};
use crate::state::AppState;

fn default_role() -> String {
    "backend_java".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default = "default_role")]
    pub role_id: String,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question_id: String,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub answer_text: String,
}

/// Either the next question, or the exhaustion sentinel. Exhaustion is a
/// normal terminal outcome and serializes as `{"message": "No more questions"}`.
#[derive(Serialize)]
#[serde(untagged)]
pub enum NextQuestionResponse {
    Question(QuestionItem),
    Exhausted { message: String },
}

#[derive(Serialize)]
pub struct FeedbackResponse {
    pub feedback: String,
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Json<InterviewSession> {
    let session = state
        .sessions
        .create_session(&req.role_id, req.level, req.skills);
    Json(session)
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InterviewSession>, AppError> {
    state
        .sessions
        .get_session(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
}

/// POST /api/v1/sessions/:id/next-question
pub async fn handle_next_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NextQuestionResponse>, AppError> {
    let response = match state.sessions.pick_next_question(id)? {
        Some(question) => NextQuestionResponse::Question(question),
        None => NextQuestionResponse::Exhausted {
            message: "No more questions".to_string(),
        },
    };
    Ok(Json(response))
}

/// POST /api/v1/sessions/:id/answer
pub async fn handle_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<QaRecord>, AppError> {
    let record = state.sessions.record_answer(
        id,
        &req.question_id,
        &req.question_text,
        &req.answer_text,
    )?;
    Ok(Json(record))
}

/// POST /api/v1/sessions/:id/feedback
pub async fn handle_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FeedbackResponse>, AppError> {
    let feedback = state.sessions.build_feedback(id)?;
    Ok(Json(FeedbackResponse { feedback }))
}
