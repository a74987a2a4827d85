pub mod accounts;
pub mod auth;
pub mod claims;
pub mod config;
pub mod refresh_tokens;
pub mod tokens;
