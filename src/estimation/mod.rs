pub mod dto;
pub mod gateway;
pub mod gemini;
pub mod handlers;
pub mod sessions;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::session_routes())
        .merge(handlers::analysis_routes())
}
