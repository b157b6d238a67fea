//! HTTP handlers for the migration control plane API.
//!
//! Route handlers organized by domain, plus [`router`] assembling them.

pub mod batches;
pub mod database;
pub mod health;
pub mod jobs;
pub mod migration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use health::{api_health, health_check};

/// Build the application router with all routes.
pub fn router(state: AppState) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Health check routes
    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(api_health))
        .with_state(state.clone());

    // Instance and definition migration routes
    let migration_routes = Router::new()
        .route(
            "/api/migration/instances/{instance_id}/validate",
            post(migration::validate_instance),
        )
        .route(
            "/api/migration/instances/{instance_id}/migrate",
            post(migration::migrate_instance),
        )
        .route(
            "/api/migration/definitions/{definition_id}/validate",
            post(migration::validate_definition),
        )
        .route(
            "/api/migration/definitions/{definition_id}/migrate",
            post(migration::migrate_definition),
        )
        .route(
            "/api/migration/definitions/{definition_id}/batch",
            post(migration::batch_migrate),
        )
        .route(
            "/api/migration/batches/{batch_id}",
            get(batches::get).delete(batches::delete),
        )
        .with_state(state.service.clone());

    // Worker entry points
    let job_routes = Router::new()
        .route("/api/jobs/execute", post(jobs::execute))
        .route("/api/jobs/dead-letter", post(jobs::dead_letter))
        .with_state(state.service.clone());

    // Database routes
    let database_routes = Router::new()
        .route("/api/db/init", post(database::init_database))
        .route("/api/db/validate", get(database::validate_database))
        .with_state(state);

    Router::new()
        .merge(health_routes)
        .merge(migration_routes)
        .merge(job_routes)
        .merge(database_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
