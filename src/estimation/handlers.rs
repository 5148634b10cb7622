use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::dto::{AnalysisResponse, AnalyzeImageBase64, AnalyzeTextRequest, OpenSessionRequest};
use super::gateway::{EstimationError, FoodEstimate};
use super::sessions::{AnalysisSession, SessionError, SessionRegistry};
use crate::ledger::extractors::{parse_day, RequestClock};
use crate::ledger::handlers::rejection;
use crate::ledger::repo_types::{MealSlot, NewEntry};
use crate::state::AppState;
use crate::tracker::{Action, Outcome};

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

// --- public routers ---

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/estimates", post(open_session))
        .route("/estimates/:id", get(get_session).delete(close_session))
}

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/estimates/:id/text", post(analyze_text))
        .route("/estimates/:id/image", post(analyze_image_multipart))
        .route("/estimates/:id/image/base64", post(analyze_image_base64))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

// --- handlers ---

#[instrument(skip(state, clock, body))]
pub async fn open_session(
    State(state): State<AppState>,
    RequestClock(clock): RequestClock,
    Json(body): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<AnalysisSession>), (StatusCode, String)> {
    let day = parse_day(&body.day, &clock)?;
    let slot = body
        .slot
        .parse::<MealSlot>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let session = state
        .sessions
        .lock()
        .await
        .open(day, slot, OffsetDateTime::now_utc());
    info!(id = %session.id, %day, %slot, "analysis session opened");
    Ok((StatusCode::CREATED, Json(session)))
}

#[instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisSession>, (StatusCode, String)> {
    state
        .sessions
        .lock()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, SessionError::NotOpen(id).to_string()))
}

#[instrument(skip(state))]
pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.sessions.lock().await.close(id) {
        info!(%id, "analysis session closed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, SessionError::NotOpen(id).to_string()))
    }
}

#[instrument(skip(state, body))]
pub async fn analyze_text(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AnalyzeTextRequest>,
) -> Result<(StatusCode, Json<AnalysisResponse>), (StatusCode, String)> {
    let description = body.description.trim();
    if description.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "description must not be blank".into()));
    }
    let pending = begin(&state, id).await?;
    let result = state.estimator.estimate_from_text(description).await;
    settle(&state, pending, result).await
}

/// POST /estimates/:id/image (multipart)
/// Field: `file` or `image`; content type defaults to image/jpeg.
#[instrument(skip(state, mp))]
pub async fn analyze_image_multipart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<AnalysisResponse>), (StatusCode, String)> {
    let mut upload: Option<(Bytes, String)> = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?
    {
        if matches!(field.name(), Some("file") | Some("image")) {
            let mime = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| DEFAULT_IMAGE_MIME.into());
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
            upload = Some((data, mime));
            break;
        }
    }
    let (image, mime) = upload.ok_or((StatusCode::BAD_REQUEST, "file is required".into()))?;
    analyze_image(&state, id, image, &mime).await
}

/// POST /estimates/:id/image/base64 { image: "...", mimeType?: "image/png" }
#[instrument(skip(state, body))]
pub async fn analyze_image_base64(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AnalyzeImageBase64>,
) -> Result<(StatusCode, Json<AnalysisResponse>), (StatusCode, String)> {
    let image = STANDARD
        .decode(body.image.trim())
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid base64".into()))?;
    let mime = body.mime_type.as_deref().unwrap_or(DEFAULT_IMAGE_MIME);
    analyze_image(&state, id, Bytes::from(image), mime).await
}

async fn analyze_image(
    state: &AppState,
    id: Uuid,
    image: Bytes,
    mime: &str,
) -> Result<(StatusCode, Json<AnalysisResponse>), (StatusCode, String)> {
    if image.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "image is empty".into()));
    }
    let pending = begin(state, id).await?;
    let result = state
        .estimator
        .estimate_from_image(image, mime)
        .await
        .map(|estimate| vec![estimate]);
    settle(state, pending, result).await
}

/// Clears the session's pending flag if the request is dropped before the
/// estimate settles, so an abandoned call never blocks a retry.
struct PendingAnalysis {
    sessions: Arc<Mutex<SessionRegistry>>,
    id: Uuid,
    armed: bool,
}

impl PendingAnalysis {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingAnalysis {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(id = %self.id, "analysis abandoned before it settled");
        if let Ok(mut sessions) = self.sessions.try_lock() {
            sessions.settle_failure(self.id);
            return;
        }
        let (sessions, id) = (self.sessions.clone(), self.id);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    sessions.lock().await.settle_failure(id);
                });
            }
            Err(e) => error!(error = %e, %id, "no runtime to clear pending analysis"),
        }
    }
}

async fn begin(state: &AppState, id: Uuid) -> Result<PendingAnalysis, (StatusCode, String)> {
    match state.sessions.lock().await.begin(id) {
        Ok(_) => Ok(PendingAnalysis {
            sessions: state.sessions.clone(),
            id,
            armed: true,
        }),
        Err(e @ SessionError::NotOpen(_)) => Err((StatusCode::NOT_FOUND, e.to_string())),
        Err(e @ SessionError::AlreadyAnalyzing(_)) => Err((StatusCode::CONFLICT, e.to_string())),
    }
}

/// Applies a finished estimate to its session. Runs after the gateway call,
/// so the session may have been closed in the meantime. The session closes
/// only once its entries are in the ledger.
async fn settle(
    state: &AppState,
    pending: PendingAnalysis,
    result: Result<Vec<FoodEstimate>, EstimationError>,
) -> Result<(StatusCode, Json<AnalysisResponse>), (StatusCode, String)> {
    let id = pending.id;
    let mut sessions = state.sessions.lock().await;

    let estimates = match result {
        Ok(estimates) => estimates,
        Err(e) => {
            error!(error = %e, %id, "estimation failed");
            sessions.settle_failure(id);
            pending.disarm();
            return Err((StatusCode::BAD_GATEWAY, e.to_string()));
        }
    };

    let Some(session) = sessions.get(&id).cloned() else {
        pending.disarm();
        return Err(discarded(id));
    };

    if estimates.is_empty() {
        sessions.settle_failure(id);
        pending.disarm();
        info!(%id, "no food recognized");
        return Ok((
            StatusCode::OK,
            Json(AnalysisResponse {
                recognized: false,
                session: AnalysisSession {
                    analyzing: false,
                    ..session
                },
                entries: Vec::new(),
            }),
        ));
    }

    let action = Action::AddEntries {
        day: session.day,
        slot: session.slot,
        entries: estimates.into_iter().map(NewEntry::from).collect(),
    };
    // sessions stays locked so a close cannot slip in between the add and the close below
    let outcome = state.dispatch(action).await;
    match outcome {
        Outcome::EntriesAdded(entries) => {
            sessions.settle_success(id);
            pending.disarm();
            info!(%id, count = entries.len(), "estimated entries logged");
            Ok((
                StatusCode::CREATED,
                Json(AnalysisResponse {
                    recognized: true,
                    session: AnalysisSession {
                        analyzing: false,
                        ..session
                    },
                    entries,
                }),
            ))
        }
        other => {
            sessions.settle_failure(id);
            pending.disarm();
            Err(rejection(other))
        }
    }
}

fn discarded(id: Uuid) -> (StatusCode, String) {
    warn!(%id, "session closed before the estimate arrived; result discarded");
    (StatusCode::GONE, SessionError::NotOpen(id).to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::sync::Notify;
    use tower::ServiceExt;

    use super::*;
    use crate::app::build_app;
    use crate::estimation::gateway::Estimator;
    use crate::ledger::handlers::ledger_http_tests::call;

    /// Replays queued text results; image calls return a fixed estimate.
    /// When `gate` is set, every call waits for it before answering.
    #[derive(Default)]
    struct ScriptedEstimator {
        text: Mutex<Vec<Result<Vec<FoodEstimate>, EstimationError>>>,
        gate: Option<Arc<Notify>>,
    }

    fn dal() -> FoodEstimate {
        FoodEstimate {
            food_name: "Dal tadka".into(),
            estimated_calories: 240.0,
            protein: 12.0,
            carbs: 30.0,
            fat: 8.0,
            serving_description: "1 bowl".into(),
        }
    }

    #[async_trait]
    impl Estimator for ScriptedEstimator {
        async fn estimate_from_image(
            &self,
            _image: Bytes,
            mime_type: &str,
        ) -> Result<FoodEstimate, EstimationError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(FoodEstimate {
                serving_description: mime_type.to_string(),
                ..dal()
            })
        }

        async fn estimate_from_text(
            &self,
            _description: &str,
        ) -> Result<Vec<FoodEstimate>, EstimationError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.text.lock().unwrap().remove(0)
        }
    }

    async fn open(app: &axum::Router, slot: &str) -> String {
        let (status, session) = call(
            app.clone(),
            "POST",
            "/api/v1/estimates",
            Some(json!({ "day": "2024-06-10", "slot": slot })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        session["id"].as_str().unwrap().to_string()
    }

    fn scripted(results: Vec<Result<Vec<FoodEstimate>, EstimationError>>) -> Arc<ScriptedEstimator> {
        Arc::new(ScriptedEstimator {
            text: Mutex::new(results),
            gate: None,
        })
    }

    #[tokio::test]
    async fn failure_then_empty_then_success() {
        let estimator = scripted(vec![
            Err(EstimationError::Parse("not json".into())),
            Ok(vec![]),
            Ok(vec![dal(), FoodEstimate { food_name: "Roti".into(), ..dal() }]),
        ]);
        let state = AppState::fake_with(estimator).await;
        let app = build_app(state.clone());
        let id = open(&app, "lunch").await;
        let uri = format!("/api/v1/estimates/{id}/text");

        let (status, _) = call(app.clone(), "POST", &uri, Some(json!({ "description": "dal and two rotis" }))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, body) = call(app.clone(), "POST", &uri, Some(json!({ "description": "dal and two rotis" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recognized"], false);
        assert_eq!(body["session"]["analyzing"], false);

        let (status, body) = call(app.clone(), "POST", &uri, Some(json!({ "description": "dal and two rotis" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["entries"].as_array().unwrap().len(), 2);
        assert_eq!(body["entries"][0]["name"], "Dal tadka");

        let (status, _) = call(app.clone(), "GET", &format!("/api/v1/estimates/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let tracker = state.tracker.lock().await;
        let day = crate::day_key::DayKey::parse("2024-06-10").unwrap();
        assert_eq!(tracker.ledger.get(&day).unwrap().meals.lunch.len(), 2);
    }

    #[tokio::test]
    async fn blank_description_never_reaches_the_gateway() {
        let state = AppState::fake_with(scripted(vec![])).await;
        let app = build_app(state);
        let id = open(&app, "Snacks").await;
        let (status, _) = call(
            app,
            "POST",
            &format!("/api/v1/estimates/{id}/text"),
            Some(json!({ "description": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn second_call_conflicts_and_late_result_is_discarded() {
        let gate = Arc::new(Notify::new());
        let estimator = Arc::new(ScriptedEstimator {
            text: Mutex::new(vec![Ok(vec![dal()])]),
            gate: Some(gate.clone()),
        });
        let state = AppState::fake_with(estimator).await;
        let app = build_app(state.clone());
        let id = open(&app, "Dinner").await;
        let uri = format!("/api/v1/estimates/{id}/text");

        let pending = {
            let (app, uri) = (app.clone(), uri.clone());
            tokio::spawn(async move {
                call(app, "POST", &uri, Some(json!({ "description": "dal" }))).await
            })
        };
        while !state
            .sessions
            .lock()
            .await
            .get(&id.parse().unwrap())
            .map(|s| s.analyzing)
            .unwrap_or(false)
        {
            tokio::task::yield_now().await;
        }

        let (status, _) = call(app.clone(), "POST", &uri, Some(json!({ "description": "dal" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(app.clone(), "DELETE", &format!("/api/v1/estimates/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        gate.notify_one();
        let (status, _) = pending.await.unwrap();
        assert_eq!(status, StatusCode::GONE);
        assert!(state.tracker.lock().await.ledger.is_empty());
    }

    #[tokio::test]
    async fn abandoned_request_clears_the_pending_flag() {
        let gate = Arc::new(Notify::new());
        let estimator = Arc::new(ScriptedEstimator {
            text: Mutex::new(vec![Ok(vec![dal()])]),
            gate: Some(gate.clone()),
        });
        let state = AppState::fake_with(estimator).await;
        let app = build_app(state.clone());
        let id = open(&app, "Lunch").await;
        let session_id: Uuid = id.parse().unwrap();
        let uri = format!("/api/v1/estimates/{id}/text");

        let abandoned = {
            let (app, uri) = (app.clone(), uri.clone());
            tokio::spawn(async move {
                call(app, "POST", &uri, Some(json!({ "description": "dal" }))).await
            })
        };
        while !state
            .sessions
            .lock()
            .await
            .get(&session_id)
            .map(|s| s.analyzing)
            .unwrap_or(false)
        {
            tokio::task::yield_now().await;
        }
        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());
        tokio::task::yield_now().await;

        assert!(!state.sessions.lock().await.get(&session_id).unwrap().analyzing);

        gate.notify_one();
        let (status, body) = call(app, "POST", &uri, Some(json!({ "description": "dal" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["entries"][0]["name"], "Dal tadka");
    }

    #[tokio::test]
    async fn rejected_estimates_keep_the_session_open() {
        let nameless = FoodEstimate {
            food_name: "  ".into(),
            ..dal()
        };
        let state = AppState::fake_with(scripted(vec![Ok(vec![nameless]), Ok(vec![dal()])])).await;
        let app = build_app(state.clone());
        let id = open(&app, "Dinner").await;
        let uri = format!("/api/v1/estimates/{id}/text");

        let (status, _) = call(app.clone(), "POST", &uri, Some(json!({ "description": "dal" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, session) = call(app.clone(), "GET", &format!("/api/v1/estimates/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["analyzing"], false);
        assert!(state.tracker.lock().await.ledger.is_empty());

        let (status, _) = call(app, "POST", &uri, Some(json!({ "description": "dal" }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn multipart_photo_is_logged_to_the_session_slot() {
        let state = AppState::fake_with(scripted(vec![])).await;
        let app = build_app(state.clone());
        let id = open(&app, "breakfast").await;

        let boundary = "X-FITFOCUS-BOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"plate.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/estimates/{id}/image"))
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["entries"][0]["servingDescription"], "image/png");
        assert_eq!(body["session"]["slot"], "Breakfast");
    }

    #[tokio::test]
    async fn base64_photo_rejects_garbage() {
        let state = AppState::fake_with(scripted(vec![])).await;
        let app = build_app(state);
        let id = open(&app, "Lunch").await;
        let (status, _) = call(
            app,
            "POST",
            &format!("/api/v1/estimates/{id}/image/base64"),
            Some(json!({ "image": "!!not base64!!" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let app = build_app(AppState::fake_with(scripted(vec![])).await);
        let (status, _) = call(
            app,
            "POST",
            &format!("/api/v1/estimates/{}/text", Uuid::new_v4()),
            Some(json!({ "description": "idli" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
