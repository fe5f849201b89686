//! API models

pub mod apps;
pub mod checks;
pub mod contents;
pub mod deployments;
pub mod events;
