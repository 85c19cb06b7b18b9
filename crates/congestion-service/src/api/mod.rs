pub mod routes;

use crate::state::CongestionServiceState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn router(state: CongestionServiceState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Session endpoints
        .route(
            "/v1/sessions",
            get(routes::list_sessions).post(routes::start_session),
        )
        .route(
            "/v1/sessions/:id",
            get(routes::get_session).delete(routes::stop_session),
        )
        .route("/v1/sessions/:id/frames", post(routes::submit_frame))
        .route("/v1/sessions/:id/reset", post(routes::reset_session))
        // Lane endpoints
        .route("/v1/sessions/:id/lanes", get(routes::lane_states))
        .route(
            "/v1/sessions/:id/lanes/:lane/trend",
            get(routes::lane_trend),
        )
        .route(
            "/v1/sessions/:id/lanes/:lane/forecast",
            get(routes::lane_forecast),
        )
        .route(
            "/v1/sessions/:id/lanes/:lane/peak-hours",
            get(routes::lane_peak_hours),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
