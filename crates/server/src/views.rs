use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
};
use chrono::Utc;
use sqlx::PgPool;

use crate::{
    AppState, auth,
    error::AppError,
    models::{Choice, ChoiceTally, FlashParams, Poll, PollDetail, PollList, PollResults, PollSummary},
    votes::find_vote,
};

pub(crate) async fn fetch_poll(db: &PgPool, id: i64) -> Result<Poll, AppError> {
    sqlx::query_as("SELECT id, question, publish_at, close_at FROM polls WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Poll {id} does not exist")))
}

pub(crate) async fn fetch_choices(db: &PgPool, poll_id: i64) -> Result<Vec<Choice>, AppError> {
    let choices = sqlx::query_as("SELECT id, poll_id, text FROM choices WHERE poll_id = $1 ORDER BY id")
        .bind(poll_id)
        .fetch_all(db)
        .await?;
    Ok(choices)
}

/// Every poll, newest publication first, with eligibility flags evaluated
/// against the current time.
async fn list_polls(
    State(state): State<AppState>,
    Query(params): Query<FlashParams>,
) -> Result<Json<PollList>, AppError> {
    let polls: Vec<Poll> =
        sqlx::query_as("SELECT id, question, publish_at, close_at FROM polls ORDER BY publish_at DESC")
            .fetch_all(&state.db)
            .await?;

    let now = Utc::now();
    Ok(Json(PollList {
        polls: polls.into_iter().map(|p| PollSummary::new(p, now)).collect(),
        message: params.flash,
    }))
}

/// Poll page. Closed or unpublished polls bounce back to the list; the
/// requester's current vote is included when a valid token is presented.
async fn poll_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<PollDetail>, AppError> {
    let poll = fetch_poll(&state.db, id).await?;
    if !poll.can_vote(Utc::now()) {
        return Err(AppError::VotingClosed);
    }

    let choices = fetch_choices(&state.db, poll.id).await?;
    let current_choice = match auth::maybe_claims(&state.jwt, &headers) {
        Some(claims) => find_vote(&state.db, claims.sub, poll.id)
            .await?
            .map(|v| v.choice_id),
        None => None,
    };

    Ok(Json(PollDetail {
        poll,
        choices,
        current_choice,
        error: None,
    }))
}

async fn poll_results(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PollResults>, AppError> {
    let poll = fetch_poll(&state.db, id).await?;

    // Tallies are derived on read; nothing stores a counter.
    let choices: Vec<ChoiceTally> = sqlx::query_as(
        "SELECT c.id, c.text, COUNT(v.id) AS votes
         FROM choices c
         LEFT JOIN votes v ON v.choice_id = c.id
         WHERE c.poll_id = $1
         GROUP BY c.id, c.text
         ORDER BY c.id",
    )
    .bind(poll.id)
    .fetch_all(&state.db)
    .await?;

    let total_votes = choices.iter().map(|t| t.votes).sum();
    Ok(Json(PollResults {
        id: poll.id,
        question: poll.question,
        choices,
        total_votes,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/polls", get(list_polls))
        .route("/polls/:id", get(poll_detail))
        .route("/polls/:id/results", get(poll_results))
}
