pub mod conversation;
pub mod json_file;
pub mod post;
pub mod user;

pub use conversation::{ConversationRecord, ConversationStore, Message, MessageRole, SessionSummary};
pub use post::{BoardStats, Category, CommunityBoard, Post};
pub use user::{CredentialStore, Role, User, DEFAULT_PBKDF2_ROUNDS};
