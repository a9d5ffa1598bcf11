//! Game session routes.
//!
//! The player picks a game, a difficulty and a problem count; the server
//! generates the problems. Only prompts are returned, and answers stay on the
//! server until the session is closed.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use classbank_core::earnings::{
    Difficulty, GameSession, MAX_PROBLEMS_PER_SESSION, SessionStart, Submission,
    SubmissionOutcome,
};
use classbank_shared::types::GameSessionId;
use serde::Deserialize;
use validator::Validate;

use crate::{AppState, error::ApiError, middleware::CurrentActor};

/// Creates the game routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/games/sessions", post(start_session))
        .route("/games/sessions/{session_id}", get(get_session))
        .route("/games/sessions/{session_id}/submit", post(submit_session))
}

/// Request body for starting a session. Problems are never accepted from
/// the client.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StartSessionRequest {
    /// Game identifier.
    #[validate(length(min = 1, max = 64))]
    pub game: String,
    /// Chosen difficulty.
    pub difficulty: Difficulty,
    /// Problems to generate.
    #[validate(range(min = 1, max = MAX_PROBLEMS_PER_SESSION))]
    pub problem_count: usize,
}

/// Request body for a submission.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    /// One answer per problem, in order.
    #[validate(length(max = 100))]
    pub answers: Vec<String>,
    /// Client's view of which answers were right, one per answer.
    #[validate(length(max = 100))]
    pub claimed_results: Vec<bool>,
    /// Client's score. Ignored by grading.
    #[serde(default)]
    pub claimed_score: Option<u32>,
}

/// POST `/games/sessions`
async fn start_session(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let start: SessionStart = state
        .earnings
        .start_session(&actor, &req.game, req.difficulty, req.problem_count)
        .await?;
    Ok((StatusCode::CREATED, Json(start)))
}

/// GET `/games/sessions/{session_id}` - Answers are hidden while the session is open.
async fn get_session(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(session_id): Path<GameSessionId>,
) -> Result<Json<GameSession>, ApiError> {
    Ok(Json(state.earnings.session(&actor, session_id).await?))
}

/// POST `/games/sessions/{session_id}/submit`
async fn submit_session(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(session_id): Path<GameSessionId>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmissionOutcome>, ApiError> {
    req.validate()?;
    let submission = Submission {
        session_id,
        answers: req.answers,
        claimed_results: req.claimed_results,
        claimed_score: req.claimed_score,
    };
    Ok(Json(state.earnings.submit(&actor, &submission).await?))
}
