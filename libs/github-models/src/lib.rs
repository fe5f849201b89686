//! GitHub wire models
//!
//! Request and response shapes for the REST endpoints and webhook payloads the
//! deployments app talks to. Fields the app never reads are left out; serde
//! ignores them on input.

pub mod models;

pub use models::apps::*;
pub use models::checks::*;
pub use models::contents::*;
pub use models::deployments::*;
pub use models::events::*;
