use std::sync::Arc;

pub mod admin;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod relay;
pub mod routes;
pub mod session;
pub mod types;

pub use config::AppConfig;

use error::{AppError, StoreError};
use middleware::auth::AuthenticatedUser;
use models::{CommunityBoard, ConversationStore, CredentialStore};
use relay::ChatRelay;
use session::{SessionContext, SessionController};

/// Shared state handed to every handler as `web::Data<Arc<AppState>>`.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub credentials: CredentialStore,
    pub sessions: SessionController,
    pub board: CommunityBoard,
}

impl AppState {
    /// Opens every store named in `config`; chat turns go through `relay`.
    pub async fn new(config: Arc<AppConfig>, relay: Arc<dyn ChatRelay>) -> Result<Self, StoreError> {
        let conversations = ConversationStore::connect(&config.database_url).await?;
        Ok(AppState {
            credentials: CredentialStore::new(&config.users_file, &config.admin_username)
                .with_rounds(config.password_hash_rounds),
            sessions: SessionController::new(conversations, relay, config.session_idle),
            board: CommunityBoard::new(&config.community_file),
            config,
        })
    }

    /// Resolves the live browser session behind a bearer token.
    pub async fn session(&self, user: &AuthenticatedUser) -> Result<SessionContext, AppError> {
        match self.sessions.get(&user.session_key).await {
            Some(ctx) if ctx.username() == user.username => Ok(ctx),
            _ => Err(AppError::Unauthenticated(
                "Your session has ended. Please login again.".to_string(),
            )),
        }
    }
}
