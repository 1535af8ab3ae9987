use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Role;
use crate::session::SessionPhase;

#[derive(Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct RegisterResponse {
    pub username: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub session_id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct MeResponse {
    pub username: String,
    pub role: Role,
    pub session_id: String,
    pub phase: SessionPhase,
}
