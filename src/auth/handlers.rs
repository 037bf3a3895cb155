use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::db::models::{AccountSummary, LoginOrigin};
use crate::error::{AppError, AuthError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub account: AccountSummary,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for username: {}", req.username);
    match state
        .auth_service
        .register(&req.username, &req.email, &req.password)
        .await
    {
        Ok(account) => {
            info!("Registration successful for username: {}", req.username);
            Ok(HttpResponse::Created().json(account.summary()))
        }
        Err(e) => {
            error!("Registration failed for username: {}: {}", req.username, e);
            Err(e)
        }
    }
}

pub async fn login(
    req: HttpRequest,
    body: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for identifier: {}", body.identifier);
    let origin = request_origin(&req);

    match state
        .auth_service
        .login(&body.identifier, &body.password, origin)
        .await
    {
        Ok(outcome) => {
            info!("Login successful for identifier: {}", body.identifier);
            Ok(HttpResponse::Ok().json(LoginResponse {
                access_token: outcome.access_token,
                refresh_token: outcome.refresh_token,
                account: outcome.account.summary(),
            }))
        }
        Err(e) => {
            error!("Login failed for identifier: {}: {}", body.identifier, e);
            Err(e)
        }
    }
}

pub async fn refresh(
    body: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    match state.auth_service.refresh(&body.refresh_token).await {
        Ok(pair) => Ok(HttpResponse::Ok().json(TokenPairResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })),
        Err(e) => {
            error!("Token refresh failed: {}", e);
            Err(e)
        }
    }
}

pub async fn logout(
    body: web::Json<LogoutRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth_service.logout(&body.refresh_token).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}

/// Resolve the bearer access token to the caller's own profile.
pub async fn me(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::AuthError(AuthError::InvalidToken))?;

    let account = state.auth_service.current_user(token).await?;
    Ok(HttpResponse::Ok().json(account.summary()))
}

fn request_origin(req: &HttpRequest) -> LoginOrigin {
    let ip_address = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = req
        .headers()
        .get(actix_web::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    LoginOrigin {
        ip_address,
        user_agent,
    }
}
