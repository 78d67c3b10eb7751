use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    AppState, auth,
    error::AppError,
    models::{Choice, ExportedVote, PollDetail, StatsRow, Vote, VoteForm},
    views::{fetch_choices, fetch_poll},
};

/// The user's existing vote for a poll, if any. At most one row can exist
/// thanks to the (user, poll) uniqueness constraint.
pub async fn find_vote(db: &PgPool, user_id: i64, poll_id: i64) -> Result<Option<Vote>, AppError> {
    let vote = sqlx::query_as(
        "SELECT id, user_id, poll_id, choice_id, created_at
         FROM votes WHERE user_id = $1 AND poll_id = $2",
    )
    .bind(user_id)
    .bind(poll_id)
    .fetch_optional(db)
    .await?;
    Ok(vote)
}

/// Resolve the submitted choice id against the poll's own choices.
pub(crate) fn select_choice<'a>(
    choices: &'a [Choice],
    submitted: Option<i64>,
) -> Result<&'a Choice, AppError> {
    let id = submitted
        .ok_or_else(|| AppError::InvalidChoice("You didn't select a choice".to_string()))?;
    choices
        .iter()
        .find(|choice| choice.id == id)
        .ok_or_else(|| AppError::InvalidChoice("That choice is not part of this poll".to_string()))
}

/// Record a ballot: create the user's vote for this poll, or move an
/// existing one to the newly selected choice. Returns the poll id so the
/// caller can redirect to its results.
pub async fn cast_vote(
    db: &PgPool,
    user_id: i64,
    poll_id: i64,
    submitted: Option<i64>,
    now: DateTime<Utc>,
) -> Result<i64, AppError> {
    let poll = fetch_poll(db, poll_id).await?;
    if !poll.can_vote(now) {
        return Err(AppError::VotingClosed);
    }

    let choices = fetch_choices(db, poll.id).await?;
    let choice = select_choice(&choices, submitted)?;

    // Single-statement upsert; the (user_id, poll_id) constraint serializes
    // concurrent casts by the same user into one row.
    sqlx::query(
        "INSERT INTO votes (user_id, poll_id, choice_id)
         VALUES ($1, $2, $3)
         ON CONFLICT (user_id, poll_id)
         DO UPDATE SET choice_id = EXCLUDED.choice_id, created_at = NOW()",
    )
    .bind(user_id)
    .bind(poll.id)
    .bind(choice.id)
    .execute(db)
    .await?;

    Ok(poll.id)
}

// ===== Handlers =====

/// Voting form: the poll, its choices, and the requester's current selection.
async fn vote_form(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<PollDetail>, AppError> {
    let claims = auth::bearer_claims(&state.jwt, &headers)?;
    let poll = fetch_poll(&state.db, id).await?;
    let choices = fetch_choices(&state.db, poll.id).await?;
    let current_choice = find_vote(&state.db, claims.sub, poll.id)
        .await?
        .map(|v| v.choice_id);

    Ok(Json(PollDetail {
        poll,
        choices,
        current_choice,
        error: None,
    }))
}

async fn submit_vote(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<VoteForm>,
) -> Result<Response, AppError> {
    let claims = auth::bearer_claims(&state.jwt, &headers)?;

    match cast_vote(&state.db, claims.sub, id, form.choice, Utc::now()).await {
        // Redirect after POST so a refresh cannot submit the ballot twice.
        Ok(poll_id) => Ok(Redirect::to(&format!("/polls/{poll_id}/results")).into_response()),
        Err(AppError::InvalidChoice(message)) => {
            // Redisplay the voting form with the rejection instead of redirecting.
            let poll = fetch_poll(&state.db, id).await?;
            let choices = fetch_choices(&state.db, poll.id).await?;
            let current_choice = find_vote(&state.db, claims.sub, poll.id)
                .await?
                .map(|v| v.choice_id);
            Ok(Json(PollDetail {
                poll,
                choices,
                current_choice,
                error: Some(message),
            })
            .into_response())
        }
        Err(err) => Err(err),
    }
}

async fn admin_stats(State(state): State<AppState>) -> Result<Json<Vec<StatsRow>>, AppError> {
    let stats: Vec<StatsRow> = sqlx::query_as(
        "SELECT
            p.id AS poll_id,
            p.question,
            c.id AS choice_id,
            c.text AS choice_text,
            COUNT(v.id) AS votes
         FROM polls p
         JOIN choices c ON c.poll_id = p.id
         LEFT JOIN votes v ON v.choice_id = c.id
         GROUP BY p.id, p.question, c.id, c.text
         ORDER BY p.publish_at DESC, c.id",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(stats))
}

async fn export_votes(State(state): State<AppState>) -> Result<Json<Vec<ExportedVote>>, AppError> {
    let votes: Vec<ExportedVote> = sqlx::query_as(
        "SELECT u.username, v.poll_id, p.question, c.text AS choice_text, v.created_at
         FROM votes v
         JOIN users u ON u.id = v.user_id
         JOIN choices c ON c.id = v.choice_id
         JOIN polls p ON p.id = v.poll_id
         ORDER BY v.created_at DESC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(votes))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/polls/:id/vote", get(vote_form).post(submit_vote))
        // TODO: gate these behind an admin role once accounts grow one.
        .route("/admin/stats", get(admin_stats))
        .route("/admin/export", get(export_votes))
}
