//! GitHub REST client

pub mod apps;
pub mod client;
pub mod github;
