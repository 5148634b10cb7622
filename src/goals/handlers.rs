use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{error, info, instrument};

use super::dto::{GoalsView, RecalculateResponse};
use super::model::GoalPatch;
use crate::state::AppState;
use crate::tracker::{Action, Outcome};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/goals", get(get_goals))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/goals/draft", patch(edit_draft).delete(discard_draft))
        .route("/goals/draft/recalculate", post(recalculate_draft))
        .route("/goals/draft/commit", post(commit_draft))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn get_goals(State(state): State<AppState>) -> Json<GoalsView> {
    Json(current_view(&state).await)
}

#[instrument(skip(state, patch))]
pub async fn edit_draft(
    State(state): State<AppState>,
    Json(patch): Json<GoalPatch>,
) -> Json<GoalsView> {
    state.dispatch(Action::EditDraft(patch)).await;
    Json(current_view(&state).await)
}

#[instrument(skip(state))]
pub async fn recalculate_draft(
    State(state): State<AppState>,
) -> Result<Json<RecalculateResponse>, (StatusCode, String)> {
    match state.dispatch(Action::RecalculateDraft).await {
        Outcome::DraftUpdated(Some(recommendation)) => {
            info!(
                budget = recommendation.daily_calorie_budget,
                "draft budget recalculated"
            );
            let draft = state.tracker.lock().await.draft.clone();
            Ok(Json(RecalculateResponse {
                draft,
                recommendation,
            }))
        }
        other => Err(unexpected(other)),
    }
}

#[instrument(skip(state))]
pub async fn commit_draft(
    State(state): State<AppState>,
) -> Result<Json<GoalsView>, (StatusCode, String)> {
    match state.dispatch(Action::CommitDraft).await {
        Outcome::GoalCommitted => Ok(Json(current_view(&state).await)),
        other => Err(unexpected(other)),
    }
}

#[instrument(skip(state))]
pub async fn discard_draft(State(state): State<AppState>) -> Json<GoalsView> {
    state.dispatch(Action::DiscardDraft).await;
    Json(current_view(&state).await)
}

async fn current_view(state: &AppState) -> GoalsView {
    let tracker = state.tracker.lock().await;
    GoalsView {
        active: tracker.goal.clone(),
        draft: tracker.draft.clone(),
        dirty: tracker.draft_dirty(),
    }
}

fn unexpected(outcome: Outcome) -> (StatusCode, String) {
    error!(outcome = ?outcome, "unexpected outcome");
    (StatusCode::INTERNAL_SERVER_ERROR, "unexpected outcome".into())
}
