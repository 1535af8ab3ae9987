use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Message, SessionSummary};

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ConversationResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SessionListResponse {
    pub active_session_id: String,
    pub sessions: Vec<SessionSummary>,
}
