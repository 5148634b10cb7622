use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::dto::{AddEntriesRequest, DayView, StreakResponse, WaterRequest, WeightRequest};
use super::extractors::{DayPath, EntryPath, RequestClock, SlotPath};
use super::repo::LedgerError;
use super::repo_types::{DayRecord, EntryPatch, FoodEntry};
use crate::aggregation::{self, DaySummary};
use crate::state::AppState;
use crate::tracker::{Action, Outcome};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/days/:day", get(get_day))
        .route("/days/:day/summary", get(get_summary))
        .route("/streak", get(get_streak))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/days/:day/meals/:slot/entries", post(add_entries))
        .route(
            "/days/:day/meals/:slot/entries/:id",
            patch(update_entry).delete(remove_entry),
        )
        .route("/days/:day/water", put(set_water))
        .route("/days/:day/weight", put(set_weight).delete(clear_weight))
}

// --- handlers ---

#[instrument(skip(state, day))]
pub async fn get_day(State(state): State<AppState>, DayPath(day): DayPath) -> Json<DayView> {
    let tracker = state.tracker.lock().await;
    let record = tracker.ledger.get_or_create(day);
    let totals = aggregation::daily_totals(&record);
    Json(DayView { record, totals })
}

#[instrument(skip(state, clock, day))]
pub async fn get_summary(
    State(state): State<AppState>,
    RequestClock(clock): RequestClock,
    DayPath(day): DayPath,
) -> Json<DaySummary> {
    let today = clock.today;
    let tracker = state.tracker.lock().await;
    Json(aggregation::day_summary(
        &tracker.ledger,
        &tracker.goal,
        day,
        today,
    ))
}

#[instrument(skip(state, clock))]
pub async fn get_streak(
    State(state): State<AppState>,
    RequestClock(clock): RequestClock,
) -> Json<StreakResponse> {
    let today = clock.today;
    let tracker = state.tracker.lock().await;
    Json(StreakResponse {
        today,
        streak: aggregation::streak(&tracker.ledger, today),
    })
}

#[instrument(skip(state, clock, target, body), fields(day = %target.day, slot = %target.slot))]
pub async fn add_entries(
    State(state): State<AppState>,
    RequestClock(clock): RequestClock,
    target: SlotPath,
    Json(body): Json<AddEntriesRequest>,
) -> Result<(StatusCode, Json<Vec<FoodEntry>>), (StatusCode, String)> {
    if body.entries.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "entries must be non-empty".into()));
    }
    let action = Action::AddEntries {
        day: target.day,
        slot: target.slot,
        entries: body.entries,
    };
    match state.dispatch_at(action, &clock).await {
        Outcome::EntriesAdded(added) => {
            info!(count = added.len(), "entries logged");
            Ok((StatusCode::CREATED, Json(added)))
        }
        other => Err(rejection(other)),
    }
}

#[instrument(skip(state, clock, target, patch), fields(day = %target.day, slot = %target.slot, id = %target.id))]
pub async fn update_entry(
    State(state): State<AppState>,
    RequestClock(clock): RequestClock,
    target: EntryPath,
    Json(patch): Json<EntryPatch>,
) -> Result<Json<FoodEntry>, (StatusCode, String)> {
    let action = Action::UpdateEntry {
        day: target.day,
        slot: target.slot,
        id: target.id,
        patch,
    };
    match state.dispatch_at(action, &clock).await {
        Outcome::EntryUpdated(entry) => Ok(Json(entry)),
        other => Err(rejection(other)),
    }
}

#[instrument(skip(state, clock, target), fields(day = %target.day, slot = %target.slot, id = %target.id))]
pub async fn remove_entry(
    State(state): State<AppState>,
    RequestClock(clock): RequestClock,
    target: EntryPath,
) -> Result<StatusCode, (StatusCode, String)> {
    let action = Action::RemoveEntry {
        day: target.day,
        slot: target.slot,
        id: target.id,
    };
    match state.dispatch_at(action, &clock).await {
        Outcome::EntryRemoved(_) => Ok(StatusCode::NO_CONTENT),
        other => Err(rejection(other)),
    }
}

#[instrument(skip(state, clock, day, body))]
pub async fn set_water(
    State(state): State<AppState>,
    RequestClock(clock): RequestClock,
    DayPath(day): DayPath,
    Json(body): Json<WaterRequest>,
) -> Result<Json<DayRecord>, (StatusCode, String)> {
    let count = body
        .count
        .ok_or((StatusCode::BAD_REQUEST, "count is required".into()))?;
    day_result(state.dispatch_at(Action::SetWater { day, count }, &clock).await)
}

#[instrument(skip(state, clock, day, body))]
pub async fn set_weight(
    State(state): State<AppState>,
    RequestClock(clock): RequestClock,
    DayPath(day): DayPath,
    Json(body): Json<WeightRequest>,
) -> Result<Json<DayRecord>, (StatusCode, String)> {
    let weight = body
        .weight
        .ok_or((StatusCode::BAD_REQUEST, "weight is required".into()))?;
    day_result(state.dispatch_at(Action::SetWeight { day, weight }, &clock).await)
}

#[instrument(skip(state, clock, day))]
pub async fn clear_weight(
    State(state): State<AppState>,
    RequestClock(clock): RequestClock,
    DayPath(day): DayPath,
) -> Result<Json<DayRecord>, (StatusCode, String)> {
    day_result(state.dispatch_at(Action::ClearWeight { day }, &clock).await)
}

fn day_result(outcome: Outcome) -> Result<Json<DayRecord>, (StatusCode, String)> {
    match outcome {
        Outcome::DayUpdated(record) => Ok(Json(record)),
        other => Err(rejection(other)),
    }
}

pub(crate) fn rejection(outcome: Outcome) -> (StatusCode, String) {
    match outcome {
        Outcome::Unchanged(err) => {
            warn!(error = %err, "ledger unchanged");
            let status = match err {
                LedgerError::EntryNotFound { .. } => StatusCode::NOT_FOUND,
                LedgerError::DuplicateEntryId(_) => StatusCode::CONFLICT,
                LedgerError::EmptyName => StatusCode::BAD_REQUEST,
            };
            (status, err.to_string())
        }
        other => {
            error!(outcome = ?other, "unexpected outcome");
            (StatusCode::INTERNAL_SERVER_ERROR, "unexpected outcome".into())
        }
    }
}
