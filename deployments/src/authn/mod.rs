//! Webhook and GitHub App authentication

pub mod app_jwt;
pub mod signature;
pub mod token_mngr;
