//! HTTP request handlers.

use crate::catalog::{
    BookDetails, EntryChanges, EntryQuery, ExternalBook, NewEntry, Paged, SearchQuery,
};
use crate::db::{self, CatalogEntry, FavoriteWithBook, Preferences};
use crate::error::{AppError, Result};
use crate::favorites::{FavoriteChanges, NewFavorite, ProgressUpdate};
use crate::progress::ReadingStatus;
use crate::recommend::Recommendation;
use crate::server::AppState;
use crate::stats::Statistics;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
};
use serde::{Deserialize, Serialize};

// ============================================================================
// HEALTH
// ============================================================================

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    catalog_entries: i64,
}

/// Liveness check.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        catalog_entries: state.db.count_entries()?,
    }))
}

// ============================================================================
// AUTH API
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    token: String,
    user: db::User,
}

/// Register request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

/// Profile update request.
#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    #[serde(alias = "favoriteGenres")]
    favorite_genres: Option<Vec<String>>,
    #[serde(alias = "favoriteAuthors")]
    favorite_authors: Option<Vec<String>>,
}

/// Auth login.
pub async fn auth_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (user, token) = state.auth.login(&req.email, &req.password)?;
    Ok(Json(LoginResponse { token, user }))
}

/// Auth register.
pub async fn auth_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>)> {
    state
        .auth
        .register(&req.username, &req.email, &req.password)?;
    let (user, token) = state.auth.login(&req.email, &req.password)?;

    Ok((StatusCode::CREATED, Json(LoginResponse { token, user })))
}

/// Auth logout.
pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(token) = extract_token(&headers) {
        state.auth.logout(&token)?;
    }
    Ok(StatusCode::OK)
}

/// Get current user profile.
pub async fn auth_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<db::User>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(user))
}

/// Update reading preferences.
pub async fn auth_update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<db::User>> {
    let user = get_authenticated_user(&state, &headers).await?;

    let prefs = Preferences {
        favorite_genres: req
            .favorite_genres
            .unwrap_or(user.preferences.favorite_genres),
        favorite_authors: req
            .favorite_authors
            .unwrap_or(user.preferences.favorite_authors),
    };

    Ok(Json(state.auth.update_preferences(&user.id, &prefs)?))
}

// ============================================================================
// BOOKS API
// ============================================================================

/// List local catalog entries.
pub async fn books_list(
    State(state): State<AppState>,
    Query(query): Query<EntryQuery>,
) -> Result<Json<Paged<CatalogEntry>>> {
    Ok(Json(state.catalog.list_entries(&query)?))
}

/// Search the external source.
pub async fn books_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Paged<ExternalBook>>> {
    Ok(Json(state.catalog.search(&query).await?))
}

/// External work detail.
pub async fn books_details(
    State(state): State<AppState>,
    Path(work_id): Path<String>,
) -> Result<Json<BookDetails>> {
    Ok(Json(state.catalog.details(&work_id).await?))
}

/// Get one local catalog entry.
pub async fn books_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CatalogEntry>> {
    Ok(Json(state.catalog.get_entry(&id)?))
}

/// Create a catalog entry (admin).
pub async fn books_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewEntry>,
) -> Result<(StatusCode, Json<CatalogEntry>)> {
    require_admin(&state, &headers).await?;
    let entry = state.catalog.create_entry(req)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Update a catalog entry (admin).
pub async fn books_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<EntryChanges>,
) -> Result<Json<CatalogEntry>> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.catalog.update_entry(&id, req)?))
}

/// Delete a catalog entry (admin).
pub async fn books_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    require_admin(&state, &headers).await?;

    if state.catalog.delete_entry(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Book {}", id)))
    }
}

// ============================================================================
// FAVORITES API
// ============================================================================

/// Favorites list query.
#[derive(Debug, Deserialize)]
pub struct FavoritesQuery {
    status: Option<String>,
}

/// List the caller's favorites.
pub async fn favorites_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FavoritesQuery>,
) -> Result<Json<Vec<FavoriteWithBook>>> {
    let user = get_authenticated_user(&state, &headers).await?;

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<ReadingStatus>)
        .transpose()?;

    Ok(Json(state.favorites.list(&user.id, status).await?))
}

/// Add a favorite.
pub async fn favorites_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewFavorite>,
) -> Result<(StatusCode, Json<FavoriteWithBook>)> {
    let user = get_authenticated_user(&state, &headers).await?;
    let favorite = state.favorites.create(&user.id, req).await?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

/// Reading statistics for the caller.
pub async fn favorites_statistics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Statistics>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.favorites.statistics(&user.id)?))
}

/// Get one favorite.
pub async fn favorites_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FavoriteWithBook>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.favorites.get(&id, &user.id)?))
}

/// Update a favorite.
pub async fn favorites_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<FavoriteChanges>,
) -> Result<Json<FavoriteWithBook>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.favorites.update(&id, &user.id, req)?))
}

/// Record reading progress.
pub async fn favorites_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ProgressUpdate>,
) -> Result<Json<FavoriteWithBook>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.favorites.update_progress(
        &id,
        &user.id,
        req.current_page,
    )?))
}

/// Delete a favorite.
pub async fn favorites_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;

    if state.favorites.delete(&id, &user.id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Favorite {}", id)))
    }
}

// ============================================================================
// RECOMMENDATIONS API
// ============================================================================

/// Recommendations for the caller.
pub async fn recommendations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Recommendation>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    let favorites = state.favorites.snapshot(&user.id)?;
    Ok(Json(state.recommender.recommend(&user, &favorites).await))
}

// ============================================================================
// HELPERS
// ============================================================================

/// Extract token from Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Get authenticated user from token.
async fn get_authenticated_user(state: &AppState, headers: &HeaderMap) -> Result<db::User> {
    let token = extract_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    state
        .auth
        .validate_token(&token)?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
}

/// Get authenticated user and require the admin role.
async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<db::User> {
    let user = get_authenticated_user(state, headers).await?;
    if !state.auth.is_admin(&user) {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }
    Ok(user)
}
