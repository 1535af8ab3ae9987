use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{Role, User};
use crate::types::{CredentialsRequest, LoginResponse, MeResponse, RegisterResponse};
use crate::{AppConfig, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    /// Browser session key.
    pub sid: String,
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

#[post("/register")]
async fn register(
    app_state: web::Data<Arc<AppState>>,
    web::Json(req): web::Json<CredentialsRequest>,
) -> Result<web::Json<RegisterResponse>, AppError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }

    if !app_state.credentials.register(username, &req.password).await? {
        return Err(AppError::DuplicateUser("Username already exists".to_string()));
    }

    Ok(web::Json(RegisterResponse {
        username: username.to_string(),
        message: "Registration successful! Please login.".to_string(),
    }))
}

#[post("/login")]
async fn login(
    app_state: web::Data<Arc<AppState>>,
    web::Json(req): web::Json<CredentialsRequest>,
) -> Result<web::Json<LoginResponse>, AppError> {
    let user = app_state
        .credentials
        .authenticate(req.username.trim(), &req.password)
        .await?
        .ok_or_else(|| AppError::Auth("Invalid credentials".to_string()))?;

    let ctx = app_state.sessions.start(&user).await?;
    let token = match sign_jwt(&user, ctx.key(), &app_state.config) {
        Ok(token) => token,
        Err(e) => {
            app_state.sessions.end(ctx.key()).await;
            return Err(token_error(e));
        }
    };

    info!("{} logged in", user.username);
    Ok(web::Json(LoginResponse {
        token,
        username: user.username,
        role: user.role,
        session_id: ctx.session_id().await,
    }))
}

#[post("/logout")]
async fn logout(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    app_state.sessions.end(&authenticated_user.session_key).await;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/me")]
async fn me(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<MeResponse>, AppError> {
    let ctx = app_state.session(&authenticated_user).await?;
    Ok(web::Json(MeResponse {
        username: ctx.username().to_string(),
        role: ctx.role(),
        session_id: ctx.session_id().await,
        phase: ctx.phase(),
    }))
}

fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    error!("Failed to sign JWT: {:?}", e);
    AppError::Internal(format!("could not sign session token: {}", e))
}

fn sign_jwt(
    user: &User,
    session_key: &str,
    app_config: &AppConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user.username.clone(),
        sid: session_key.to_string(),
        role: user.role,
        exp: now + 3600 * 24 * 7, // Token expires after 1 week
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(app_config.jwt_secret.as_bytes()),
    )
}
