//! Read-only views over every stored conversation, restricted to admins.
//!
//! Each entry point checks the caller's role before issuing any query.

use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{ConversationRecord, ConversationStore, MessageRole};
use crate::session::SessionContext;
use crate::types::{ConversationDetail, ConversationStats, ConversationSummary};

const PREVIEW_CHARS: usize = 100;

pub fn require_admin(ctx: &SessionContext) -> Result<(), AppError> {
    if ctx.is_admin() {
        Ok(())
    } else {
        warn!("{} was refused access to the admin views", ctx.username());
        Err(AppError::Authorization(
            "Access denied. This page is only available for administrators.".to_string(),
        ))
    }
}

pub async fn list_conversations(
    ctx: &SessionContext,
    store: &ConversationStore,
) -> Result<Vec<ConversationSummary>, AppError> {
    require_admin(ctx)?;
    let records = store.list_all().await?;
    info!("{} listed {} conversations", ctx.username(), records.len());
    Ok(summarize(&records))
}

/// Looks up a conversation by its 1-based position in the summary list.
pub async fn conversation_by_number(
    ctx: &SessionContext,
    store: &ConversationStore,
    number: usize,
) -> Result<ConversationDetail, AppError> {
    require_admin(ctx)?;
    let records = store.list_all().await?;
    number
        .checked_sub(1)
        .and_then(|index| records.get(index))
        .map(|record| detail(number, record))
        .ok_or_else(|| AppError::NotFound("Conversation not found.".to_string()))
}

/// The most recently updated conversation of `user_id`.
pub async fn conversation_for_user(
    ctx: &SessionContext,
    store: &ConversationStore,
    user_id: &str,
) -> Result<ConversationDetail, AppError> {
    require_admin(ctx)?;
    let records = store.list_all().await?;
    records
        .iter()
        .enumerate()
        .find(|(_, record)| record.user_id == user_id)
        .map(|(index, record)| detail(index + 1, record))
        .ok_or_else(|| AppError::NotFound("Conversation not found.".to_string()))
}

pub fn summarize(records: &[ConversationRecord]) -> Vec<ConversationSummary> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| ConversationSummary {
            number: index + 1,
            user_id: record.user_id.clone(),
            session_id: record.session_id.clone(),
            message_count: record.conversation_data.len(),
            last_updated: record.last_updated,
            last_message: record
                .conversation_data
                .last()
                .map(|m| preview(&m.content))
                .unwrap_or_else(|| "No messages".to_string()),
        })
        .collect()
}

pub fn detail(number: usize, record: &ConversationRecord) -> ConversationDetail {
    let count = |role: MessageRole| {
        record
            .conversation_data
            .iter()
            .filter(|m| m.role == role)
            .count()
    };
    ConversationDetail {
        number,
        user_id: record.user_id.clone(),
        session_id: record.session_id.clone(),
        last_updated: record.last_updated,
        stats: ConversationStats {
            total_messages: record.conversation_data.len(),
            user_messages: count(MessageRole::User),
            assistant_messages: count(MessageRole::Assistant),
        },
        messages: record.conversation_data.clone(),
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let cut: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        content.to_string()
    }
}
