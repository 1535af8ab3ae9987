use actix_web::{get, web};
use utoipa::OpenApi;

pub mod admin;
pub mod auth;
pub mod chat;
pub mod community;

use crate::models::{BoardStats, Category, Message, MessageRole, Post, Role, SessionSummary};
use crate::session::SessionPhase;
use crate::types::{
    ConversationDetail, ConversationResponse, ConversationStats, ConversationSummary,
    CreatePostRequest, CredentialsRequest, LoginResponse, MeResponse, RegisterResponse,
    SendMessageRequest, SessionListResponse,
};

#[derive(OpenApi)]
#[openapi(components(schemas(
    BoardStats,
    Category,
    ConversationDetail,
    ConversationResponse,
    ConversationStats,
    ConversationSummary,
    CreatePostRequest,
    CredentialsRequest,
    LoginResponse,
    MeResponse,
    Message,
    MessageRole,
    Post,
    RegisterResponse,
    Role,
    SendMessageRequest,
    SessionListResponse,
    SessionPhase,
    SessionSummary,
)))]
pub struct ApiDoc;

#[get("/")]
async fn index() -> &'static str {
    "Welcome to Silicon Valley Visit Planner"
}

/// Registers every route. Shared by the server and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(
            web::scope("/auth")
                .service(auth::register)
                .service(auth::login)
                .service(auth::logout)
                .service(auth::me),
        )
        .service(
            web::scope("/chat")
                .service(chat::get_messages)
                .service(chat::send_message)
                .service(chat::new_session)
                .service(chat::list_sessions)
                .service(chat::resume_session),
        )
        .service(
            web::scope("/community")
                .service(community::list_posts)
                .service(community::create_post)
                .service(community::stats),
        )
        .service(
            web::scope("/admin")
                .service(admin::list_conversations)
                .service(admin::conversation_by_number)
                .service(admin::conversation_for_user),
        );
}
