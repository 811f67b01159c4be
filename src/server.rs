//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth_register))
        .route("/login", post(handlers::auth_login))
        .route("/logout", post(handlers::auth_logout))
        .route(
            "/profile",
            get(handlers::auth_profile).put(handlers::auth_update_profile),
        );

    let book_routes = Router::new()
        .route("/", get(handlers::books_list).post(handlers::books_create))
        .route("/search", get(handlers::books_search))
        .route("/details/{work_id}", get(handlers::books_details))
        .route(
            "/{id}",
            get(handlers::books_get)
                .put(handlers::books_update)
                .delete(handlers::books_delete),
        );

    let favorite_routes = Router::new()
        .route(
            "/",
            get(handlers::favorites_list).post(handlers::favorites_create),
        )
        .route("/statistics", get(handlers::favorites_statistics))
        .route(
            "/{id}",
            get(handlers::favorites_get)
                .put(handlers::favorites_update)
                .delete(handlers::favorites_delete),
        )
        .route("/{id}/progress", patch(handlers::favorites_progress));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/recommendations", get(handlers::recommendations))
        .nest("/api/auth", auth_routes)
        .nest("/api/books", book_routes)
        .nest("/api/favorites", favorite_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
