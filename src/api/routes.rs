use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::handlers::{job_status, submit_email, submit_whatsapp};
use super::health::{health, metrics, stats};

pub fn api_routes(state: AppState) -> Router<AppState> {
    // Admission and status require the API key when one is configured
    let notifications = Router::new()
        .route("/notifications/email", post(submit_email))
        .route("/notifications/whatsapp", post(submit_whatsapp))
        .route("/notifications/{channel}/jobs/{id}", get(job_status))
        .route_layer(middleware::from_fn_with_state(state, api_key_auth));

    Router::new()
        // Health & observability
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))
        // Notification endpoints
        .nest("/api/v1", notifications)
}
