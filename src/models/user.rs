use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::json_file::JsonFile;
use crate::error::StoreError;

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// PBKDF2-HMAC-SHA256 work factor for newly written hashes.
pub const DEFAULT_PBKDF2_ROUNDS: u32 = 600_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// An account as seen by the rest of the application. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub username: String,
    pub role: Role,
}

/// On-disk entry, keyed by username in the credentials file.
///
/// Files written by the earlier deployment hold `{"password": "..."}` in
/// plaintext; those entries still load and are rewritten hashed on the
/// owner's next successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Credential {
    Hashed {
        password_hash: String,
        salt: String,
        rounds: u32,
        #[serde(default)]
        role: Role,
    },
    Plaintext {
        password: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },
}

type Credentials = BTreeMap<String, Credential>;

/// Username → credential mapping persisted as one JSON file.
#[derive(Debug)]
pub struct CredentialStore {
    file: JsonFile,
    admin_username: String,
    rounds: u32,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, admin_username: &str) -> Self {
        CredentialStore {
            file: JsonFile::new(path),
            admin_username: admin_username.to_string(),
            rounds: DEFAULT_PBKDF2_ROUNDS,
        }
    }

    /// Overrides the PBKDF2 work factor used for new hashes.
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    fn bootstrap_role(&self, username: &str) -> Role {
        if username == self.admin_username {
            Role::Admin
        } else {
            Role::User
        }
    }

    fn role_of(&self, username: &str, credential: &Credential) -> Role {
        match credential {
            Credential::Hashed { role, .. } => *role,
            Credential::Plaintext { role, .. } => {
                role.unwrap_or_else(|| self.bootstrap_role(username))
            }
        }
    }

    async fn hashed(&self, password: &str, role: Role) -> Result<Credential, StoreError> {
        let salt = new_salt();
        let key = derive_key(password, &salt, self.rounds).await?;
        Ok(Credential::Hashed {
            password_hash: hex::encode(key),
            salt: hex::encode(salt),
            rounds: self.rounds,
            role,
        })
    }

    /// Registers a new account. Returns `false` when the username is taken,
    /// in which case the stored entry is left untouched.
    pub async fn register(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let _guard = self.file.lock().await;
        let mut credentials: Credentials = self.file.read().await?;

        if credentials.contains_key(username) {
            debug!("Registration refused, {} already exists", username);
            return Ok(false);
        }

        let role = self.bootstrap_role(username);
        let credential = self.hashed(password, role).await?;
        credentials.insert(username.to_string(), credential);
        self.file.write(&credentials).await?;

        info!("Registered user {} with role {}", username, role.as_str());
        Ok(true)
    }

    /// Returns the user when `password` matches the stored credential.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let _guard = self.file.lock().await;
        let mut credentials: Credentials = self.file.read().await?;

        let Some(credential) = credentials.get(username) else {
            debug!("Login failed, unknown user {}", username);
            return Ok(None);
        };
        let role = self.role_of(username, credential);

        match credential {
            Credential::Hashed {
                password_hash,
                salt,
                rounds,
                ..
            } => {
                if !verify_password(password, password_hash, salt, *rounds).await? {
                    warn!("Login failed for {}: wrong password", username);
                    return Ok(None);
                }
            }
            Credential::Plaintext { password: stored, .. } => {
                if !bool::from(stored.as_bytes().ct_eq(password.as_bytes())) {
                    warn!("Login failed for {}: wrong password", username);
                    return Ok(None);
                }
                let upgraded = self.hashed(password, role).await?;
                credentials.insert(username.to_string(), upgraded);
                self.file.write(&credentials).await?;
                info!("Rehashed legacy plaintext credential for {}", username);
            }
        }

        info!("User {} authenticated", username);
        Ok(Some(User {
            username: username.to_string(),
            role,
        }))
    }

    pub async fn get(&self, username: &str) -> Result<Option<User>, StoreError> {
        let _guard = self.file.lock().await;
        let credentials: Credentials = self.file.read().await?;
        Ok(credentials.get(username).map(|c| User {
            username: username.to_string(),
            role: self.role_of(username, c),
        }))
    }
}

fn new_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Runs PBKDF2 off the async workers.
async fn derive_key(
    password: &str,
    salt: &[u8],
    rounds: u32,
) -> Result<[u8; KEY_LEN], StoreError> {
    let password = password.to_owned();
    let salt = salt.to_vec();
    tokio::task::spawn_blocking(move || {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, rounds, &mut key);
        key
    })
    .await
    .map_err(|e| StoreError::Corrupt(format!("password hashing task failed: {}", e)))
}

async fn verify_password(
    password: &str,
    password_hash: &str,
    salt: &str,
    rounds: u32,
) -> Result<bool, StoreError> {
    let salt =
        hex::decode(salt).map_err(|e| StoreError::Corrupt(format!("salt is not hex: {}", e)))?;
    let expected = hex::decode(password_hash)
        .map_err(|e| StoreError::Corrupt(format!("password hash is not hex: {}", e)))?;
    let key = derive_key(password, &salt, rounds).await?;
    Ok(bool::from(key.as_slice().ct_eq(&expected)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("users.json"), "jazo").with_rounds(1_000)
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert!(store.register("alice", "pw1").await.unwrap());
        assert!(!store.register("alice", "pw2").await.unwrap());

        let user = store.authenticate("alice", "pw1").await.unwrap().unwrap();
        assert_eq!(user.role, Role::User);
        assert!(store.authenticate("alice", "pw2").await.unwrap().is_none());
        assert!(store.authenticate("nobody", "pw1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_original_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.register("jazo", "first").await.unwrap();
        let before = std::fs::read_to_string(dir.path().join("users.json")).unwrap();

        assert!(!store.register("jazo", "second").await.unwrap());

        let after = std::fs::read_to_string(dir.path().join("users.json")).unwrap();
        assert_eq!(before, after);
        let user = store.authenticate("jazo", "first").await.unwrap().unwrap();
        assert_eq!(user.role, Role::Admin);
    }

    #[tokio::test]
    async fn only_bootstrap_username_becomes_admin() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        for name in ["bob", "Jazo", "jazo2", "admin", "jazo"] {
            store.register(name, "pw").await.unwrap();
        }

        for name in ["bob", "Jazo", "jazo2", "admin"] {
            assert_eq!(store.get(name).await.unwrap().unwrap().role, Role::User);
        }
        assert_eq!(store.get("jazo").await.unwrap().unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn passwords_are_not_stored_in_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.register("carol", "hunter2").await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("users.json")).unwrap();
        assert!(!raw.contains("hunter2"));
        assert!(raw.contains("password_hash"));
    }

    #[tokio::test]
    async fn concurrent_registrations_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(store_in(&dir));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.register(&format!("user{}", i), "pw").await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        for i in 0..16 {
            assert!(store.get(&format!("user{}", i)).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn legacy_plaintext_entries_still_log_in_and_are_rehashed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(
            &path,
            r#"{"alice": {"password": "pw1"}, "jazo": {"password": "boss"}}"#,
        )
        .unwrap();
        let store = store_in(&dir);

        assert!(store.authenticate("alice", "wrong").await.unwrap().is_none());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("pw1"));

        let user = store.authenticate("alice", "pw1").await.unwrap().unwrap();
        assert_eq!(user.role, Role::User);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("pw1"));
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(doc["alice"]["password_hash"].is_string());
        assert_eq!(doc["alice"]["role"], "user");
        assert_eq!(doc["jazo"]["password"], "boss");

        assert!(store.authenticate("alice", "pw1").await.unwrap().is_some());
        assert!(store.register("bob", "pw").await.unwrap());
        assert!(store.authenticate("bob", "pw").await.unwrap().is_some());
        assert!(!store.register("alice", "other").await.unwrap());
    }

    #[tokio::test]
    async fn legacy_bootstrap_user_is_admin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("users.json"),
            r#"{"jazo": {"password": "boss"}}"#,
        )
        .unwrap();
        let store = store_in(&dir);

        assert_eq!(store.get("jazo").await.unwrap().unwrap().role, Role::Admin);
        let user = store.authenticate("jazo", "boss").await.unwrap().unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(store.get("jazo").await.unwrap().unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn hashes_record_their_work_factor() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.register("dave", "pw").await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("users.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["dave"]["rounds"], 1_000);
        assert_eq!(doc["dave"]["password_hash"].as_str().unwrap().len(), KEY_LEN * 2);

        let slower =
            CredentialStore::new(dir.path().join("users.json"), "jazo").with_rounds(2_000);
        assert!(slower.authenticate("dave", "pw").await.unwrap().is_some());
    }
}
