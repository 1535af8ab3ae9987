mod admin;
mod auth;
mod chat;
mod community;

pub use admin::*;
pub use auth::*;
pub use chat::*;
pub use community::*;
