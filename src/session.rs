//! Per-browser-session state and its synchronisation with the conversation store.
//!
//! A browser session exists only after a successful login; until then the
//! caller is unauthenticated. While a [`SessionContext`] is alive it is either
//! idle or awaiting a relay reply. Anything that changes the active
//! conversation (a chat turn, starting a new session, resuming an old one)
//! must hold the context's turn lock, and only one holder is admitted at a
//! time; a second caller is refused instead of queued.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, StoreError};
use crate::models::{ConversationStore, Message, MessageRole, Role, User};
use crate::relay::{ChatRelay, RelayRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    AwaitingReply,
}

#[derive(Debug)]
struct ActiveConversation {
    session_id: String,
    messages: Vec<Message>,
}

#[derive(Debug)]
struct SessionInner {
    key: String,
    username: String,
    role: Role,
    turn: Arc<Mutex<()>>,
    conversation: Mutex<ActiveConversation>,
}

/// Handle to one logged-in browser session. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    fn new(key: String, user: &User, session_id: String, messages: Vec<Message>) -> Self {
        SessionContext {
            inner: Arc::new(SessionInner {
                key,
                username: user.username.clone(),
                role: user.role,
                turn: Arc::new(Mutex::new(())),
                conversation: Mutex::new(ActiveConversation {
                    session_id,
                    messages,
                }),
            }),
        }
    }

    /// Identifier of the browser session, carried in the auth token.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn is_admin(&self) -> bool {
        self.inner.role == Role::Admin
    }

    pub fn phase(&self) -> SessionPhase {
        match self.inner.turn.try_lock() {
            Ok(_) => SessionPhase::Idle,
            Err(_) => SessionPhase::AwaitingReply,
        }
    }

    pub async fn session_id(&self) -> String {
        self.inner.conversation.lock().await.session_id.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.inner.conversation.lock().await.messages.clone()
    }

    fn begin_turn(&self) -> Result<OwnedMutexGuard<()>, AppError> {
        self.inner.turn.clone().try_lock_owned().map_err(|_| {
            AppError::Conflict("A reply is still pending for this session".to_string())
        })
    }
}

/// Owns every live [`SessionContext`] and mediates between them, the
/// conversation store and the chat relay.
pub struct SessionController {
    sessions: Cache<String, SessionContext>,
    store: ConversationStore,
    relay: Arc<dyn ChatRelay>,
}

impl SessionController {
    pub fn new(store: ConversationStore, relay: Arc<dyn ChatRelay>, idle: Duration) -> Self {
        SessionController {
            sessions: Cache::builder().time_to_idle(idle).build(),
            store,
            relay,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Opens a browser session for an authenticated user with a fresh
    /// conversation id, seeded from whatever the store holds for it.
    pub async fn start(&self, user: &User) -> Result<SessionContext, StoreError> {
        let key = Uuid::new_v4().to_string();
        let session_id = Uuid::new_v4().to_string();
        let messages = self.store.load(&user.username, &session_id).await?;

        let ctx = SessionContext::new(key.clone(), user, session_id, messages);
        self.sessions.insert(key, ctx.clone()).await;

        info!("Opened browser session for {}", user.username);
        Ok(ctx)
    }

    pub async fn get(&self, key: &str) -> Option<SessionContext> {
        self.sessions.get(key).await
    }

    pub async fn end(&self, key: &str) {
        if let Some(ctx) = self.sessions.remove(key).await {
            info!("Closed browser session for {}", ctx.username());
        }
    }

    /// Appends to the in-memory transcript and immediately persists all of it.
    /// On a failed write the message is dropped again so memory matches storage.
    pub async fn append_message(
        &self,
        ctx: &SessionContext,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, StoreError> {
        let author = match role {
            MessageRole::User => Some(ctx.username()),
            MessageRole::Assistant => None,
        };
        let message = Message::new(role, content, author);

        let mut conversation = ctx.inner.conversation.lock().await;
        conversation.messages.push(message.clone());
        if let Err(e) = self
            .store
            .save(ctx.username(), &conversation.session_id, &conversation.messages)
            .await
        {
            conversation.messages.pop();
            return Err(e);
        }
        Ok(message)
    }

    /// Runs one chat turn: persist the user's message, ask the relay, persist
    /// the reply. When the relay fails the user's message stays stored and no
    /// reply is added.
    pub async fn submit(&self, ctx: &SessionContext, text: &str) -> Result<Message, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::BadRequest("Please enter a message".to_string()));
        }
        let _turn = ctx.begin_turn()?;

        self.append_message(ctx, MessageRole::User, text).await?;

        let (session_id, history) = {
            let conversation = ctx.inner.conversation.lock().await;
            let prior = conversation.messages.len().saturating_sub(1);
            (
                conversation.session_id.clone(),
                conversation.messages[..prior].to_vec(),
            )
        };

        let reply = self
            .relay
            .send(RelayRequest {
                message: text,
                history: &history,
                user: ctx.username(),
                session_id: &session_id,
            })
            .await
            .map_err(|e| {
                warn!("Relay failed for {} (session {}): {}", ctx.username(), session_id, e);
                e
            })?;

        Ok(self
            .append_message(ctx, MessageRole::Assistant, &reply)
            .await?)
    }

    /// Drops the in-memory transcript and switches to a new, empty conversation.
    /// The previous conversation stays in the store untouched.
    pub async fn start_new_session(&self, ctx: &SessionContext) -> Result<String, AppError> {
        let _turn = ctx.begin_turn()?;
        let session_id = Uuid::new_v4().to_string();

        let mut conversation = ctx.inner.conversation.lock().await;
        conversation.session_id = session_id.clone();
        conversation.messages.clear();

        debug!("{} started session {}", ctx.username(), session_id);
        Ok(session_id)
    }

    /// Makes one of the user's stored conversations the active one.
    pub async fn resume_session(
        &self,
        ctx: &SessionContext,
        session_id: &str,
    ) -> Result<Vec<Message>, AppError> {
        let _turn = ctx.begin_turn()?;

        if !self.store.exists(ctx.username(), session_id).await? {
            return Err(AppError::NotFound(format!(
                "No conversation {} for this user",
                session_id
            )));
        }
        let messages = self.store.load(ctx.username(), session_id).await?;

        let mut conversation = ctx.inner.conversation.lock().await;
        conversation.session_id = session_id.to_string();
        conversation.messages = messages.clone();

        debug!("{} resumed session {}", ctx.username(), session_id);
        Ok(messages)
    }
}
