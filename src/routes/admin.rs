use actix_web::{get, web};
use std::sync::Arc;

use crate::admin;
use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::types::{ConversationDetail, ConversationSummary};
use crate::AppState;

#[get("/conversations")]
async fn list_conversations(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<Vec<ConversationSummary>>, AppError> {
    let ctx = app_state.session(&authenticated_user).await?;
    let summaries = admin::list_conversations(&ctx, app_state.sessions.store()).await?;
    Ok(web::Json(summaries))
}

#[get("/conversations/{number}")]
async fn conversation_by_number(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    number: web::Path<String>,
) -> Result<web::Json<ConversationDetail>, AppError> {
    let ctx = app_state.session(&authenticated_user).await?;
    admin::require_admin(&ctx)?;
    let number: usize = number
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid conversation number.".to_string()))?;
    let detail = admin::conversation_by_number(&ctx, app_state.sessions.store(), number).await?;
    Ok(web::Json(detail))
}

#[get("/users/{user_id}/conversation")]
async fn conversation_for_user(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    user_id: web::Path<String>,
) -> Result<web::Json<ConversationDetail>, AppError> {
    let ctx = app_state.session(&authenticated_user).await?;
    let detail =
        admin::conversation_for_user(&ctx, app_state.sessions.store(), &user_id).await?;
    Ok(web::Json(detail))
}
