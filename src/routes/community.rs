use actix_web::{get, post, web};
use std::sync::Arc;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{BoardStats, Post};
use crate::types::{CreatePostRequest, ListPostsQuery};
use crate::AppState;

#[get("/posts")]
async fn list_posts(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    query: web::Query<ListPostsQuery>,
) -> Result<web::Json<Vec<Post>>, AppError> {
    app_state.session(&authenticated_user).await?;
    let posts = app_state.board.list_posts(query.category).await?;
    Ok(web::Json(posts))
}

#[post("/posts")]
async fn create_post(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    web::Json(req): web::Json<CreatePostRequest>,
) -> Result<web::Json<Post>, AppError> {
    let ctx = app_state.session(&authenticated_user).await?;
    if req.title.trim().is_empty() || req.content.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Please fill in both title and content.".to_string(),
        ));
    }
    let post = app_state
        .board
        .create_post(ctx.username(), &req.title, &req.content, req.category)
        .await?;
    Ok(web::Json(post))
}

#[get("/stats")]
async fn stats(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<BoardStats>, AppError> {
    app_state.session(&authenticated_user).await?;
    Ok(web::Json(app_state.board.stats().await?))
}
