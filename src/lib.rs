pub mod auth;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;

use actix_web::HttpResponse;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AccessClaims, AuthService};
pub use db::{Account, AccountSummary, DbOperations, LoginEvent, RefreshSession, Role};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
///
/// Owns the process-wide store handle: the pool is opened once in
/// `new`, shared behind `Arc`, injected into every component, and never
/// closed while the process lives.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub db: DbOperations,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let pool = db::connect(&config.database).await?;
        db::run_migrations(&pool).await?;

        let pool = Arc::new(pool);
        let db = DbOperations::new(pool.clone());
        let auth_service = Arc::new(AuthService::new(db.clone(), &config.auth)?);

        Ok(Self {
            config: Arc::new(config),
            db,
            auth_service,
        })
    }
}
