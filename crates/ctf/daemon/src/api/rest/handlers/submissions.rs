//! Submission and per-user progress handlers

use super::{caller, event_scope, ScopeQuery};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use ctf_engine::{SubmitReceipt, SubmitRequest};
use ctf_reconciler::ChallengeProgress;
use ctf_types::{ChallengeId, QuestionId, Submission};
use serde::{Deserialize, Serialize};

/// Flag submission body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFlagRequest {
    pub flag: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default)]
    pub question_index: Option<usize>,
}

/// Submit a flag
pub async fn submit_flag(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SubmitFlagRequest>,
) -> ApiResult<(StatusCode, Json<SubmitReceipt>)> {
    let user_id = caller(&headers)?;

    let mut request = SubmitRequest::new(
        ChallengeId::new(challenge_id),
        user_id,
        event_scope(body.event_id.as_deref()),
        body.flag,
    );
    if let Some(question_id) = body.question_id {
        request = request.with_question_id(QuestionId::new(question_id));
    }
    if let Some(index) = body.question_index {
        request = request.with_question_index(index);
    }

    let receipt = state.engine.submit(request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Get the caller's progress on a challenge
pub async fn get_progress(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<ChallengeProgress>> {
    let user_id = caller(&headers)?;
    let progress = state
        .engine
        .progress(&ChallengeId::new(challenge_id), &user_id, &query.event())
        .await?;
    Ok(Json(progress))
}

/// Get the caller's submissions, newest first
pub async fn get_history(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Submission>>> {
    let user_id = caller(&headers)?;
    let history = state
        .engine
        .history(&ChallengeId::new(challenge_id), &user_id, &query.event())
        .await?;
    Ok(Json(history))
}

/// Solver count response
#[derive(Debug, Serialize, Deserialize)]
pub struct SolverCountResponse {
    pub count: usize,
}

/// Distinct correct solvers of a challenge within one event
pub async fn get_solver_count(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Json<SolverCountResponse>> {
    let count = state
        .engine
        .solver_count(&ChallengeId::new(challenge_id), &query.event())
        .await?;
    Ok(Json(SolverCountResponse { count }))
}
