use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Message;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    /// 1-based position, most recently updated first.
    pub number: usize,
    pub user_id: String,
    pub session_id: String,
    pub message_count: usize,
    pub last_updated: DateTime<Utc>,
    pub last_message: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ConversationStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ConversationDetail {
    pub number: usize,
    pub user_id: String,
    pub session_id: String,
    pub last_updated: DateTime<Utc>,
    pub stats: ConversationStats,
    pub messages: Vec<Message>,
}
