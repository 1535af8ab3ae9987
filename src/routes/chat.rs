use actix_web::{get, post, put, web};
use std::sync::Arc;
use tracing::info;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::Message;
use crate::types::{ConversationResponse, SendMessageRequest, SessionListResponse};
use crate::AppState;

/// The active conversation of this browser session.
#[get("/messages")]
async fn get_messages(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<ConversationResponse>, AppError> {
    let ctx = app_state.session(&authenticated_user).await?;
    Ok(web::Json(ConversationResponse {
        session_id: ctx.session_id().await,
        messages: ctx.messages().await,
    }))
}

#[post("/messages")]
async fn send_message(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    web::Json(req): web::Json<SendMessageRequest>,
) -> Result<web::Json<Message>, AppError> {
    let ctx = app_state.session(&authenticated_user).await?;
    info!("{} sent a chat message", ctx.username());
    let reply = app_state.sessions.submit(&ctx, &req.message).await?;
    Ok(web::Json(reply))
}

#[post("/sessions")]
async fn new_session(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<ConversationResponse>, AppError> {
    let ctx = app_state.session(&authenticated_user).await?;
    let session_id = app_state.sessions.start_new_session(&ctx).await?;
    Ok(web::Json(ConversationResponse {
        session_id,
        messages: Vec::new(),
    }))
}

#[get("/sessions")]
async fn list_sessions(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<SessionListResponse>, AppError> {
    let ctx = app_state.session(&authenticated_user).await?;
    let sessions = app_state
        .sessions
        .store()
        .list_sessions(ctx.username())
        .await?;
    Ok(web::Json(SessionListResponse {
        active_session_id: ctx.session_id().await,
        sessions,
    }))
}

#[put("/sessions/{session_id}")]
async fn resume_session(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    session_id: web::Path<String>,
) -> Result<web::Json<ConversationResponse>, AppError> {
    let ctx = app_state.session(&authenticated_user).await?;
    let session_id = session_id.into_inner();
    let messages = app_state.sessions.resume_session(&ctx, &session_id).await?;
    Ok(web::Json(ConversationResponse {
        session_id,
        messages,
    }))
}
