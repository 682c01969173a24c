/// Groupwarden - moderation backend for chat-group networks
///
/// Admins authenticate through a signed mini-app session; bans, mutes and
/// warnings are recorded locally and fanned out to every registered group.

pub mod admin;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod platform;
pub mod rate_limit;
pub mod server;

pub use context::AppContext;
pub use error::{WardenError, WardenResult};
