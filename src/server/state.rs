//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::catalog::{Catalog, CatalogResolver};
use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::favorites::FavoriteService;
use crate::recommend::{RecommendationStrategy, Recommender};
use crate::source::{BookSource, OpenLibraryClient};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Catalog administration and external browsing.
    pub catalog: Catalog,
    /// Favorite reconciliation engine.
    pub favorites: FavoriteService,
    /// Recommendation service.
    pub recommender: Arc<Recommender>,
}

impl AppState {
    /// Build state backed by the Open Library client from configuration.
    pub fn from_config(config: Config, db: Database) -> Result<Self> {
        let client = OpenLibraryClient::new(&config.source)
            .map_err(|e| AppError::Config(format!("Failed to create source client: {}", e)))?;
        Self::new(config, db, Arc::new(client))
    }

    /// Build state around an explicit book source.
    pub fn new(config: Config, db: Database, source: Arc<dyn BookSource>) -> Result<Self> {
        let auth = AuthService::new(
            db.clone(),
            config.auth.session_days,
            config.auth.registration_enabled(),
        );

        let resolver = CatalogResolver::new(db.clone(), source.clone(), &config.source);
        let catalog = Catalog::new(db.clone(), resolver.clone());
        let favorites = FavoriteService::new(db.clone(), resolver);

        let strategy = RecommendationStrategy::from_config(&config.recommendations);
        tracing::info!(
            provider = %config.recommendations.provider,
            "Recommendation provider selected"
        );
        let recommender = Recommender::new(
            strategy,
            source,
            config.recommendations.limit,
            Duration::from_secs(config.source.timeout_seconds.max(30)),
        )?;

        Ok(Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            catalog,
            favorites,
            recommender: Arc::new(recommender),
        })
    }
}
