//! Deployments Library
//!
//! Core modules for the deployments GitHub App.

pub mod app;
pub mod authn;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod github;
pub mod http;
pub mod logs;
pub mod server;
pub mod utils;
pub mod webhooks;
