use std::time::Duration;

use anyhow::{bail, Context};
use rand::RngCore;
use tracing::warn;

use crate::models::DEFAULT_PBKDF2_ROUNDS;

/// Username that is granted the `admin` role when it registers.
pub const DEFAULT_ADMIN_USERNAME: &str = "jazo";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_address: String,
    pub database_url: String,
    pub users_file: String,
    pub community_file: String,
    pub flow_base_url: String,
    pub flow_endpoint: String,
    pub flow_api_token: Option<String>,
    pub relay_timeout: Duration,
    pub admin_username: String,
    pub jwt_secret: String,
    pub session_idle: Duration,
    pub password_hash_rounds: u32,
}

impl AppConfig {
    /// Reads the environment, falling back to defaults for everything but secrets.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let relay_timeout = relay_timeout(parse_env("RELAY_TIMEOUT_SECS", 60)?)?;
        let session_idle = session_idle(parse_env("SESSION_IDLE_MINUTES", 240)?)?;
        let password_hash_rounds: u32 =
            parse_env("PASSWORD_HASH_ROUNDS", DEFAULT_PBKDF2_ROUNDS)?;
        if password_hash_rounds == 0 {
            bail!("PASSWORD_HASH_ROUNDS must be at least 1");
        }

        let jwt_secret = match non_empty_env("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set, generating a per-process secret");
                random_secret()
            }
        };

        let flow_api_token = non_empty_env("FLOW_API_TOKEN");
        if flow_api_token.is_none() {
            warn!("FLOW_API_TOKEN not set, chat relay calls will be rejected");
        }

        Ok(AppConfig {
            bind_address: env_or("BIND_ADDRESS", "0.0.0.0:8000"),
            database_url: env_or("DATABASE_URL", "sqlite://conversations.db?mode=rwc"),
            users_file: env_or("USERS_FILE", "users.json"),
            community_file: env_or("COMMUNITY_FILE", "community_posts.json"),
            flow_base_url: env_or("FLOW_BASE_URL", "http://localhost:7860"),
            flow_endpoint: env_or("FLOW_ENDPOINT", "visit-planner"),
            flow_api_token,
            relay_timeout,
            admin_username: env_or("ADMIN_USERNAME", DEFAULT_ADMIN_USERNAME),
            jwt_secret,
            session_idle,
            password_hash_rounds,
        })
    }

    /// Full URL of the flow run endpoint.
    pub fn flow_url(&self) -> String {
        format!(
            "{}/api/v1/run/{}",
            self.flow_base_url.trim_end_matches('/'),
            self.flow_endpoint
        )
    }
}

/// Whether `LOG_JSON` asks for JSON log lines. Read before logging is set up.
pub fn log_json_enabled() -> bool {
    std::env::var("LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn relay_timeout(secs: u64) -> Result<Duration, anyhow::Error> {
    if secs == 0 {
        bail!("RELAY_TIMEOUT_SECS must be at least 1");
    }
    Ok(Duration::from_secs(secs))
}

fn session_idle(minutes: u64) -> Result<Duration, anyhow::Error> {
    if minutes == 0 {
        bail!("SESSION_IDLE_MINUTES must be at least 1");
    }
    let secs = minutes
        .checked_mul(60)
        .with_context(|| format!("SESSION_IDLE_MINUTES is too large: {}", minutes))?;
    Ok(Duration::from_secs(secs))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    non_empty_env(key).unwrap_or_else(|| default.to_owned())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_env(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
