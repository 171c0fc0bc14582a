//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Submissions and per-user views
        .route(
            "/challenges/:challenge_id/submissions",
            post(handlers::submit_flag),
        )
        .route(
            "/challenges/:challenge_id/progress",
            get(handlers::get_progress),
        )
        .route(
            "/challenges/:challenge_id/history",
            get(handlers::get_history),
        )
        // Event-wide views
        .route(
            "/challenges/:challenge_id/solvers",
            get(handlers::get_solver_count),
        )
        // Live streams
        .route(
            "/challenges/:challenge_id/progress/stream",
            get(handlers::stream_progress),
        )
        .route(
            "/challenges/:challenge_id/solvers/stream",
            get(handlers::stream_solvers),
        )
        // Users
        .route("/users/:user_id/aggregate", get(handlers::get_user_aggregate));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
